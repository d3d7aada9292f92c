use querylens_core::{AppResult, ValidationError};
use querylens_domain::{OrderByClause, QueryNode};

use super::walk::{ClauseWalker, Usage};
use super::{QueryOptionValidator, ValidationContext};

/// Default `$orderby` validator.
///
/// Without an explicit allow-list the first key touching a property the
/// model marks as not sortable fails the whole clause.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderByQueryValidator;

fn property_path(node: &QueryNode) -> Option<String> {
    match node {
        QueryNode::RangeVariable { .. } => Some(String::new()),
        QueryNode::Property { source, name } | QueryNode::Navigation { source, name } => {
            let prefix = property_path(source)?;
            Some(if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            })
        }
        _ => None,
    }
}

impl QueryOptionValidator<OrderByClause> for OrderByQueryValidator {
    fn validate(&self, option: &OrderByClause, context: &ValidationContext<'_>) -> AppResult<()> {
        let settings = context.settings();
        let limit = settings.max_order_by_node_count;
        if option.items.len() > limit as usize {
            return Err(ValidationError::LimitExceeded {
                option: "MaxOrderByNodeCount".to_owned(),
                limit: u64::from(limit),
                value: option.items.len() as u64,
            }
            .into());
        }

        for (index, item) in option.items.iter().enumerate() {
            if option.items[..index]
                .iter()
                .any(|earlier| earlier.expression == item.expression)
            {
                let name = property_path(&item.expression).unwrap_or_else(|| "expression".to_owned());
                return Err(ValidationError::invalid(format!(
                    "duplicate property named '{name}' is not supported in $orderby"
                ))
                .into());
            }
        }

        if !settings.allowed_order_by_properties.is_empty() {
            for item in &option.items {
                let Some(path) = property_path(&item.expression) else {
                    return Err(ValidationError::invalid(
                        "only properties may be ordered by when an order-by allow-list is configured",
                    )
                    .into());
                };
                if !path.is_empty() && !settings.allowed_order_by_properties.contains(&path) {
                    return Err(ValidationError::invalid(format!(
                        "order by '{path}' is not allowed; add it to the allowed order-by properties"
                    ))
                    .into());
                }
            }
            return Ok(());
        }

        let mut walker = ClauseWalker::new(*context, Usage::OrderBy, &option.range_variable);
        for item in &option.items {
            walker.walk(&item.expression)?;
        }

        Ok(())
    }
}
