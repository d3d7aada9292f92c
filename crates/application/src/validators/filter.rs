use querylens_core::{AppResult, ValidationError};
use querylens_domain::FilterClause;

use super::walk::{ClauseWalker, Usage};
use super::{QueryOptionValidator, ValidationContext};

/// Default `$filter` validator.
///
/// Enforces the node-count and lambda-depth limits, the function and
/// operator allow-lists, and the model's filter, navigation and count
/// restrictions on every property the predicate touches.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterQueryValidator;

impl QueryOptionValidator<FilterClause> for FilterQueryValidator {
    fn validate(&self, option: &FilterClause, context: &ValidationContext<'_>) -> AppResult<()> {
        let limit = context.settings().max_node_count;
        let node_count = option.expression.node_count();
        if node_count > limit as usize {
            return Err(ValidationError::LimitExceeded {
                option: "MaxNodeCount".to_owned(),
                limit: u64::from(limit),
                value: node_count as u64,
            }
            .into());
        }

        ClauseWalker::new(*context, Usage::Filter, &option.range_variable).walk(&option.expression)
    }
}
