//! Request-scoped query option objects and their orchestration.

use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use querylens_core::{AppError, AppResult, ValidationError};
use querylens_domain::{
    DefaultQuerySettings, ElementId, QueryOptionKind, QuerySettings, ValidationSettings,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::binders::{
    QueryBinderContext, ResultShape, SearchBinder, SelectExpandBinder, stable_ordering_keys,
};
use crate::query::{Projection, Query, QueryExecutor, QueryOperator, SortKey};
use crate::resolver::ModelRestrictionResolver;
use crate::validators::{QueryOptionValidator, QueryValidatorRegistry, ValidationContext};
use crate::wrappers::{PropertyMapper, Row};

mod parsed;
mod parser;
mod skip_token;

pub use parsed::{
    ApplyQueryOption, ComputeQueryOption, CountQueryOption, FilterQueryOption,
    OrderByQueryOption, PagingQueryOption, QueryOption, SearchQueryOption,
    SelectExpandQueryOption, SkipTokenQueryOption,
};
pub use parser::{ClauseParser, JsonClauseParser, parse_bool_value, parse_count_value};
pub use skip_token::{DefaultSkipTokenHandler, SkipToken, SkipTokenHandler};

/// Everything option objects need besides their raw text.
#[derive(Clone)]
pub struct QueryOptionContext {
    resolver: Arc<ModelRestrictionResolver>,
    binder: QueryBinderContext,
    defaults: DefaultQuerySettings,
    navigation: Option<ElementId>,
    count_request: bool,
    parser: Arc<dyn ClauseParser>,
    search_binder: Option<Arc<dyn SearchBinder>>,
    skip_token_handler: Arc<dyn SkipTokenHandler>,
}

impl QueryOptionContext {
    /// Creates a context for a query over the entity set of `element_type`.
    pub fn new(
        resolver: Arc<ModelRestrictionResolver>,
        settings: QuerySettings,
        element_type: impl Into<String>,
    ) -> AppResult<Self> {
        let binder = QueryBinderContext::new(resolver.model_handle(), settings, element_type)?;

        Ok(Self {
            resolver,
            binder,
            defaults: DefaultQuerySettings::default(),
            navigation: None,
            count_request: false,
            parser: Arc::new(JsonClauseParser),
            search_binder: None,
            skip_token_handler: Arc::new(DefaultSkipTokenHandler),
        })
    }

    /// Sets the request capability defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: DefaultQuerySettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Marks the collection as reached through a navigation property.
    #[must_use]
    pub fn with_navigation(mut self, navigation: ElementId) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Marks the request path as ending in `/$count`.
    #[must_use]
    pub fn with_count_request(mut self, count_request: bool) -> Self {
        self.count_request = count_request;
        self
    }

    /// Replaces the clause parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn ClauseParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Sets the binder for `$search` terms.
    #[must_use]
    pub fn with_search_binder(mut self, binder: Arc<dyn SearchBinder>) -> Self {
        self.search_binder = Some(binder);
        self
    }

    /// Replaces the `$skiptoken` handler.
    #[must_use]
    pub fn with_skip_token_handler(mut self, handler: Arc<dyn SkipTokenHandler>) -> Self {
        self.skip_token_handler = handler;
        self
    }

    /// Returns the restriction resolver.
    #[must_use]
    pub fn resolver(&self) -> &ModelRestrictionResolver {
        self.resolver.as_ref()
    }

    /// Returns the binding context of the queried collection.
    #[must_use]
    pub fn binder(&self) -> &QueryBinderContext {
        &self.binder
    }

    /// Returns the request capability defaults.
    #[must_use]
    pub fn defaults(&self) -> &DefaultQuerySettings {
        &self.defaults
    }

    /// Returns the navigation property the collection was reached through.
    #[must_use]
    pub fn navigation(&self) -> Option<&ElementId> {
        self.navigation.as_ref()
    }

    /// Returns whether the request path ends in `/$count`.
    #[must_use]
    pub fn is_count_request(&self) -> bool {
        self.count_request
    }

    /// Returns the skip token handler.
    #[must_use]
    pub fn skip_token_handler(&self) -> &dyn SkipTokenHandler {
        self.skip_token_handler.as_ref()
    }

    fn search_binder(&self) -> AppResult<&dyn SearchBinder> {
        self.search_binder
            .as_deref()
            .ok_or_else(|| AppError::NotSupported("no $search binder is configured".to_owned()))
    }
}

impl Debug for QueryOptionContext {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("QueryOptionContext")
            .field("binder", &self.binder)
            .field("defaults", &self.defaults)
            .field("navigation", &self.navigation)
            .field("count_request", &self.count_request)
            .finish_non_exhaustive()
    }
}

/// Bound operator pipeline of a request, split where results are observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    filtering: Query,
    paging: Query,
    projection: Projection,
    page_size: Option<usize>,
    variable: String,
    keys: Vec<SortKey>,
    count: bool,
}

impl QueryPlan {
    /// Returns `$apply`, `$compute`, `$filter` and `$search`; the count is taken after these.
    #[must_use]
    pub fn filtering(&self) -> &Query {
        &self.filtering
    }

    /// Returns the ordering, `$skiptoken`, `$skip` and `$top` operators.
    #[must_use]
    pub fn paging(&self) -> &Query {
        &self.paging
    }

    /// Returns the projection of the result rows.
    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Returns the server page size, if any.
    #[must_use]
    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    /// Returns the effective ordering used for paging.
    #[must_use]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Returns whether the total count was requested.
    #[must_use]
    pub fn is_count_requested(&self) -> bool {
        self.count
    }

    /// Returns the whole pipeline as one composable query.
    #[must_use]
    pub fn query(&self) -> Query {
        let query = self.filtering.clone().chain(self.paging.clone());
        let query = match self.page_size {
            Some(count) => query.then(QueryOperator::Take { count }),
            None => query,
        };
        query.then(QueryOperator::Project {
            projection: self.projection.clone(),
        })
    }
}

/// Materialized page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Rows as ordered output mappings.
    pub rows: Vec<Map<String, Value>>,
    /// Number of rows matching the filters, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Token of the next page when the page size cut the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_skip_token: Option<String>,
}

/// Every query option of one request.
///
/// Options are parsed lazily; validation and binding follow the fixed order
/// `$apply`, `$compute`, `$filter`, `$search`, count, `$orderby`,
/// `$skiptoken`, `$skip`, `$top`, page size, `$select`/`$expand`.
#[derive(Debug)]
pub struct QueryOptions {
    context: QueryOptionContext,
    present: BTreeSet<QueryOptionKind>,
    filter: Option<FilterQueryOption>,
    order_by: Option<OrderByQueryOption>,
    top: Option<PagingQueryOption>,
    skip: Option<PagingQueryOption>,
    skip_token: Option<SkipTokenQueryOption>,
    count: Option<CountQueryOption>,
    search: Option<SearchQueryOption>,
    compute: Option<ComputeQueryOption>,
    apply: Option<ApplyQueryOption>,
    select_expand: Option<SelectExpandQueryOption>,
    format: Option<String>,
    delta_token: Option<String>,
}

impl QueryOptions {
    /// Collects the `$`-prefixed options of a request.
    ///
    /// Names without `$` are custom options and ignored. Unknown system
    /// options and repeated options are rejected.
    pub fn new<K, V>(
        context: QueryOptionContext,
        raw: impl IntoIterator<Item = (K, V)>,
    ) -> AppResult<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut options = Self {
            context,
            present: BTreeSet::new(),
            filter: None,
            order_by: None,
            top: None,
            skip: None,
            skip_token: None,
            count: None,
            search: None,
            compute: None,
            apply: None,
            select_expand: None,
            format: None,
            delta_token: None,
        };

        let mut select = None;
        let mut expand = None;
        for (name, value) in raw {
            let name = name.as_ref().trim();
            if !name.starts_with('$') {
                debug!(name, "ignoring custom query option");
                continue;
            }

            let kind: QueryOptionKind = name.parse()?;
            if !options.present.insert(kind) {
                return Err(ValidationError::invalid(format!(
                    "the query option '{kind}' was specified more than once"
                ))
                .into());
            }
            options.insert(kind, value.into(), &mut select, &mut expand);
        }

        if select.is_some() || expand.is_some() {
            options.select_expand = Some(SelectExpandQueryOption::new(
                select,
                expand,
                Arc::clone(&options.context.parser),
            ));
        }

        Ok(options)
    }

    fn insert(
        &mut self,
        kind: QueryOptionKind,
        raw: String,
        select: &mut Option<String>,
        expand: &mut Option<String>,
    ) {
        let parser = &self.context.parser;
        match kind {
            QueryOptionKind::Filter => {
                self.filter = Some(QueryOption::with_parser(kind, raw, parser, |parser, raw| {
                    parser.parse_filter(raw)
                }));
            }
            QueryOptionKind::OrderBy => {
                self.order_by = Some(QueryOption::with_parser(kind, raw, parser, |parser, raw| {
                    parser.parse_order_by(raw)
                }));
            }
            QueryOptionKind::Search => {
                self.search = Some(QueryOption::with_parser(kind, raw, parser, |parser, raw| {
                    parser.parse_search(raw)
                }));
            }
            QueryOptionKind::Compute => {
                self.compute = Some(QueryOption::with_parser(kind, raw, parser, |parser, raw| {
                    parser.parse_compute(raw)
                }));
            }
            QueryOptionKind::Apply => {
                self.apply = Some(QueryOption::with_parser(kind, raw, parser, |parser, raw| {
                    parser.parse_apply(raw)
                }));
            }
            QueryOptionKind::Top => {
                self.top = Some(QueryOption::new(kind, raw, move |raw| {
                    parse_count_value(kind, raw)
                }));
            }
            QueryOptionKind::Skip => {
                self.skip = Some(QueryOption::new(kind, raw, move |raw| {
                    parse_count_value(kind, raw)
                }));
            }
            QueryOptionKind::Count => {
                self.count = Some(QueryOption::new(kind, raw, move |raw| {
                    parse_bool_value(kind, raw)
                }));
            }
            QueryOptionKind::SkipToken => {
                let handler = Arc::clone(&self.context.skip_token_handler);
                self.skip_token = Some(QueryOption::new(kind, raw, move |raw| handler.parse(raw)));
            }
            QueryOptionKind::Select => *select = Some(raw),
            QueryOptionKind::Expand => *expand = Some(raw),
            QueryOptionKind::Format => self.format = Some(raw),
            QueryOptionKind::DeltaToken => self.delta_token = Some(raw),
        }
    }

    /// Returns the request context.
    #[must_use]
    pub fn context(&self) -> &QueryOptionContext {
        &self.context
    }

    /// Iterates the options present, in validation order.
    pub fn present(&self) -> impl Iterator<Item = QueryOptionKind> + '_ {
        QueryOptionKind::all()
            .iter()
            .copied()
            .filter(|kind| self.present.contains(kind))
    }

    /// Returns whether the option was given.
    #[must_use]
    pub fn is_present(&self, kind: QueryOptionKind) -> bool {
        self.present.contains(&kind)
    }

    /// Returns `$filter`.
    #[must_use]
    pub fn filter(&self) -> Option<&FilterQueryOption> {
        self.filter.as_ref()
    }

    /// Returns `$orderby`.
    #[must_use]
    pub fn order_by(&self) -> Option<&OrderByQueryOption> {
        self.order_by.as_ref()
    }

    /// Returns `$top`.
    #[must_use]
    pub fn top(&self) -> Option<&PagingQueryOption> {
        self.top.as_ref()
    }

    /// Returns `$skip`.
    #[must_use]
    pub fn skip(&self) -> Option<&PagingQueryOption> {
        self.skip.as_ref()
    }

    /// Returns `$skiptoken`.
    #[must_use]
    pub fn skip_token(&self) -> Option<&SkipTokenQueryOption> {
        self.skip_token.as_ref()
    }

    /// Returns `$count`.
    #[must_use]
    pub fn count(&self) -> Option<&CountQueryOption> {
        self.count.as_ref()
    }

    /// Returns `$search`.
    #[must_use]
    pub fn search(&self) -> Option<&SearchQueryOption> {
        self.search.as_ref()
    }

    /// Returns `$compute`.
    #[must_use]
    pub fn compute(&self) -> Option<&ComputeQueryOption> {
        self.compute.as_ref()
    }

    /// Returns `$apply`.
    #[must_use]
    pub fn apply(&self) -> Option<&ApplyQueryOption> {
        self.apply.as_ref()
    }

    /// Returns `$select`/`$expand`.
    #[must_use]
    pub fn select_expand(&self) -> Option<&SelectExpandQueryOption> {
        self.select_expand.as_ref()
    }

    /// Returns `$format` as received.
    #[must_use]
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Returns `$deltatoken` as received.
    #[must_use]
    pub fn delta_token(&self) -> Option<&str> {
        self.delta_token.as_deref()
    }

    /// Returns whether the total count must be computed.
    pub fn is_count_requested(&self) -> AppResult<bool> {
        if self.context.count_request {
            return Ok(true);
        }
        match &self.count {
            Some(count) => count.value().copied(),
            None => Ok(false),
        }
    }

    fn validation_context<'a>(
        &'a self,
        settings: &'a ValidationSettings,
        registry: &'a QueryValidatorRegistry,
    ) -> ValidationContext<'a> {
        ValidationContext::new(
            self.context.binder(),
            self.context.resolver(),
            settings,
            self.context.defaults(),
            registry,
        )
        .with_navigation(self.context.navigation())
    }

    /// Validates every option with the registry's top-level validator.
    pub fn validate(
        &self,
        settings: &ValidationSettings,
        registry: &QueryValidatorRegistry,
    ) -> AppResult<()> {
        let context = self.validation_context(settings, registry);
        registry
            .options()
            .validate(self, &context)
            .inspect_err(|error| warn!(error = %error, "rejected query options"))
    }

    /// Non-failing variant of [`QueryOptions::validate`].
    pub fn try_validate(
        &self,
        settings: &ValidationSettings,
        registry: &QueryValidatorRegistry,
    ) -> (bool, Vec<AppError>) {
        let context = self.validation_context(settings, registry);
        registry.options().try_validate(self, &context)
    }

    fn page_size(&self, context: &QueryBinderContext) -> Option<usize> {
        let model_page_size = match context.shape() {
            ResultShape::Entity { type_name } => self
                .context
                .resolver()
                .page_size(self.context.navigation(), type_name),
            ResultShape::Dynamic { .. } => None,
        };

        model_page_size
            .or(context.settings().page_size)
            .filter(|size| *size > 0)
            .and_then(|size| usize::try_from(size).ok())
    }

    /// Binds every option into a plan. Options are assumed validated.
    pub fn apply_to(&self) -> AppResult<QueryPlan> {
        let mut current = self.context.binder().clone();
        let mut filtering = Query::new();

        if let Some(apply) = &self.apply {
            if let Some(navigation) = self.context.navigation() {
                return Err(AppError::NotSupported(format!(
                    "$apply is only supported on entity sets, not on '{}'",
                    navigation.property_name().unwrap_or_default()
                )));
            }
            let (query, next) = apply.apply_to(filtering, &current)?;
            filtering = query;
            current = next;
        }
        if let Some(compute) = &self.compute {
            let (query, next) = compute.apply_to(filtering, &current)?;
            filtering = query;
            current = next;
        }
        if let Some(filter) = &self.filter {
            filtering = filter.apply_to(filtering, &current)?;
        }
        if let Some(search) = &self.search {
            filtering = search.apply_to(filtering, self.context.search_binder()?, &current)?;
        }

        let (variable, mut keys) = match &self.order_by {
            Some(order_by) => (
                order_by.value()?.range_variable.clone(),
                order_by.sort_keys(&current)?,
            ),
            None => (current.range_variable().to_owned(), Vec::new()),
        };
        let page_size = self.page_size(&current);
        let pages = self.top.is_some()
            || self.skip.is_some()
            || self.skip_token.is_some()
            || page_size.is_some();
        if pages && current.settings().ensure_stable_ordering {
            keys = stable_ordering_keys(&current, &variable, keys)?;
        }

        let mut paging = Query::new();
        if !keys.is_empty() {
            paging = paging.then(QueryOperator::OrderBy {
                variable: variable.clone(),
                keys: keys.clone(),
            });
        }
        if let Some(skip_token) = &self.skip_token {
            paging = skip_token.apply_to(
                paging,
                self.context.skip_token_handler(),
                &variable,
                &keys,
            )?;
        }
        if let Some(skip) = &self.skip {
            paging = skip.apply_to(paging)?;
        }
        if let Some(top) = &self.top {
            paging = top.apply_to(paging)?;
        }

        let projection = match &self.select_expand {
            Some(select_expand) => {
                select_expand.projection(&current, self.context.resolver(), self.context.defaults)?
            }
            None => SelectExpandBinder::new(&current, self.context.resolver(), self.context.defaults)
                .bind(None)?,
        };

        let plan = QueryPlan {
            filtering,
            paging,
            projection,
            page_size,
            variable,
            keys,
            count: self.is_count_requested()?,
        };
        debug!(query = %plan.query(), page_size = ?plan.page_size, "bound query options");
        Ok(plan)
    }

    /// Binds and runs the options over `source`, returning mapped rows.
    pub fn execute(
        &self,
        executor: &dyn QueryExecutor,
        source: Vec<Value>,
        mapper: &dyn PropertyMapper,
    ) -> AppResult<QueryResult> {
        let plan = self.apply_to()?;
        let rows = source.into_iter().map(Row::Instance).collect();

        let filtered = executor.execute(&plan.filtering, rows)?;
        let count = plan.count.then_some(filtered.len());

        let mut paged = executor.execute(&plan.paging, filtered)?;
        let mut next_skip_token = None;
        if let Some(size) = plan.page_size
            && paged.len() > size
        {
            paged.truncate(size);
            if let Some(last) = paged.last() {
                next_skip_token = self.context.skip_token_handler().next_token(
                    last,
                    &plan.variable,
                    &plan.keys,
                )?;
            }
        }

        let projection = Query::new().then(QueryOperator::Project {
            projection: plan.projection,
        });
        let rows = executor
            .execute(&projection, paged)?
            .iter()
            .map(|row| row.to_dictionary(mapper, false))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(QueryResult {
            rows,
            count,
            next_skip_token,
        })
    }
}
