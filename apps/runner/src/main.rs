//! Querylens command-line runner: validates and executes one query over a JSON data file.

#![forbid(unsafe_code)]

mod model_file;

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use querylens_application::executor::InMemoryExecutor;
use querylens_application::options::{QueryOptionContext, QueryOptions};
use querylens_application::resolver::ModelRestrictionResolver;
use querylens_application::validators::QueryValidatorRegistry;
use querylens_application::wrappers::IdentityPropertyMapper;
use querylens_core::{AppError, AppResult};
use querylens_domain::{DefaultQuerySettings, NullPropagation, QuerySettings, ValidationSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const COUNT_SEGMENT: &str = "/$count";

#[derive(Debug, Clone)]
struct RunnerConfig {
    model_path: PathBuf,
    data_path: PathBuf,
    entity_type: String,
    validation: ValidationSettings,
    query: QuerySettings,
    defaults: DefaultQuerySettings,
}

/// Raw request: `$name=value` arguments and an optional `/$count` segment.
#[derive(Debug, Default)]
struct Request {
    options: Vec<(String, String)>,
    count_request: bool,
}

fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = RunnerConfig::load()?;
    let request = Request::from_args(env::args().skip(1))?;

    match run(&config, request) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{output}")
                .map_err(|error| AppError::Internal(format!("failed to write result: {error}")))
        }
        Err(error) => {
            warn!(error = %error, user_error = error.is_user_error(), "query failed");
            Err(error)
        }
    }
}

fn run(config: &RunnerConfig, request: Request) -> AppResult<String> {
    let model = model_file::load_model(&config.model_path)?;
    let rows = model_file::load_rows(&config.data_path)?;
    let resolver = Arc::new(ModelRestrictionResolver::new(Arc::new(model)));

    info!(
        entity_type = %config.entity_type,
        records = rows.len(),
        options = request.options.len(),
        count_request = request.count_request,
        "querylens-runner started"
    );

    let context =
        QueryOptionContext::new(resolver, config.query.clone(), config.entity_type.as_str())?
            .with_defaults(config.defaults)
            .with_count_request(request.count_request);
    let options = QueryOptions::new(context, request.options)?;
    options.validate(&config.validation, &QueryValidatorRegistry::new())?;

    let executor = InMemoryExecutor::new(&config.query);
    let result = options.execute(&executor, rows, &IdentityPropertyMapper)?;
    info!(
        rows = result.rows.len(),
        count = ?result.count,
        has_next_page = result.next_skip_token.is_some(),
        "query executed"
    );

    if request.count_request {
        return Ok(result.count.unwrap_or(result.rows.len()).to_string());
    }
    serde_json::to_string_pretty(&result)
        .map_err(|error| AppError::Internal(format!("failed to serialize result: {error}")))
}

impl Request {
    fn from_args(args: impl IntoIterator<Item = String>) -> AppResult<Self> {
        let mut request = Self::default();
        for arg in args {
            if arg == COUNT_SEGMENT {
                request.count_request = true;
                continue;
            }

            let (name, value) = arg.split_once('=').ok_or_else(|| {
                AppError::Configuration(format!(
                    "argument '{arg}' must be '$option=value' or '{COUNT_SEGMENT}'"
                ))
            })?;
            request.options.push((name.to_owned(), value.to_owned()));
        }

        Ok(request)
    }
}

impl RunnerConfig {
    fn load() -> AppResult<Self> {
        let model_path = PathBuf::from(required_env("QUERYLENS_MODEL_PATH")?);
        let data_path = PathBuf::from(required_env("QUERYLENS_DATA_PATH")?);
        let entity_type = required_env("QUERYLENS_ENTITY_TYPE")?.trim().to_owned();

        let defaults_validation = ValidationSettings::default();
        let validation = ValidationSettings {
            max_top: parse_optional_env("QUERYLENS_MAX_TOP")?,
            max_skip: parse_optional_env("QUERYLENS_MAX_SKIP")?,
            max_expansion_depth: parse_optional_env("QUERYLENS_MAX_EXPANSION_DEPTH")?
                .unwrap_or(defaults_validation.max_expansion_depth),
            ..defaults_validation
        };

        let query = QuerySettings {
            null_propagation: parse_optional_env::<NullPropagation>("QUERYLENS_NULL_PROPAGATION")?
                .unwrap_or_default(),
            enable_case_insensitive: parse_optional_env("QUERYLENS_CASE_INSENSITIVE")?
                .unwrap_or(false),
            page_size: parse_optional_env("QUERYLENS_PAGE_SIZE")?,
            ..QuerySettings::default()
        };

        let defaults = if parse_optional_env("QUERYLENS_ENABLE_ALL")?.unwrap_or(false) {
            DefaultQuerySettings::enable_all()
        } else {
            DefaultQuerySettings::default()
        };

        Ok(Self {
            model_path,
            data_path,
            entity_type,
            validation,
            query,
            defaults,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{name} is required")))
}

fn parse_optional_env<T>(name: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse::<T>().map(Some).map_err(|error| {
                AppError::Configuration(format!("invalid {name} value '{value}': {error}"))
            })
        }
        _ => Ok(None),
    }
}
