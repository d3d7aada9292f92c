use querylens_core::{AppResult, ValidationError};

use super::{QueryOptionValidator, ValidationContext};
use crate::binders::{ResultShape, ShapeProperty};
use crate::options::SkipToken;

fn limit_exceeded(option: &str, limit: u64, value: u64) -> ValidationError {
    ValidationError::LimitExceeded {
        option: option.to_owned(),
        limit,
        value,
    }
}

/// Default `$top` validator.
///
/// The request `max_top` is checked first, then a positive model-bound
/// `max_top` on the queried type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopQueryValidator;

impl QueryOptionValidator<u64> for TopQueryValidator {
    fn validate(&self, option: &u64, context: &ValidationContext<'_>) -> AppResult<()> {
        if let Some(limit) = context.settings().max_top
            && *option > limit
        {
            return Err(limit_exceeded("$top", limit, *option).into());
        }

        let binder = context.binder();
        let model_limit = match binder.shape() {
            ResultShape::Entity { type_name } => context
                .resolver()
                .max_top(context.navigation(), type_name, context.defaults())
                .filter(|max_top| *max_top > 0)
                .map(u64::from),
            ResultShape::Dynamic { .. } => None,
        };

        match model_limit {
            Some(limit) if *option > limit => Err(limit_exceeded("$top", limit, *option).into()),
            _ => Ok(()),
        }
    }
}

/// Default `$skip` validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipQueryValidator;

impl QueryOptionValidator<u64> for SkipQueryValidator {
    fn validate(&self, option: &u64, context: &ValidationContext<'_>) -> AppResult<()> {
        match context.settings().max_skip {
            Some(limit) if *option > limit => Err(limit_exceeded("$skip", limit, *option).into()),
            _ => Ok(()),
        }
    }
}

/// Default `$skiptoken` validator.
///
/// Paging by token must be enabled, and every token entry must name a
/// property of the current rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipTokenQueryValidator;

impl QueryOptionValidator<SkipToken> for SkipTokenQueryValidator {
    fn validate(&self, option: &SkipToken, context: &ValidationContext<'_>) -> AppResult<()> {
        if !context.defaults().enable_skip_token {
            return Err(ValidationError::QueryOptionNotAllowed {
                option: "$skiptoken".to_owned(),
            }
            .into());
        }

        let binder = context.binder();
        let case_insensitive = binder.settings().enable_case_insensitive;
        for (name, _) in option.values() {
            let known = match binder.shape() {
                ResultShape::Entity { type_name } => {
                    binder
                        .model()
                        .property(type_name, name, case_insensitive)
                        .is_some()
                        || binder.is_computed(name)
                }
                ResultShape::Dynamic { properties } => {
                    ShapeProperty::find(properties, name, case_insensitive).is_some()
                }
            };
            if !known {
                return Err(ValidationError::invalid(format!(
                    "skip token entry '{name}' does not name a property of the result"
                ))
                .into());
            }
        }

        Ok(())
    }
}
