use querylens_core::AppResult;
use querylens_domain::{OrderByClause, OrderByDirection};
use tracing::debug;

use super::{ExpressionBinder, QueryBinderContext, ResultShape};
use crate::expression::Expr;
use crate::query::SortKey;

/// Binds `$orderby` keys, most significant first.
pub fn bind_order_by(clause: &OrderByClause, context: &QueryBinderContext) -> AppResult<Vec<SortKey>> {
    let mut binder = ExpressionBinder::for_variable(context, &clause.range_variable);
    clause
        .items
        .iter()
        .map(|item| -> AppResult<SortKey> {
            let expression = binder.bind(&item.expression)?;
            debug!(key = %expression, direction = ?item.direction, "bound order-by key");
            Ok(SortKey {
                expression,
                descending: item.direction == OrderByDirection::Descending,
            })
        })
        .collect()
}

/// Appends the keys that make an ordering total.
///
/// Entity rows are completed with the key properties, reshaped rows with
/// every scalar property of the shape.
pub fn stable_ordering_keys(
    context: &QueryBinderContext,
    variable: &str,
    mut keys: Vec<SortKey>,
) -> AppResult<Vec<SortKey>> {
    let names: Vec<String> = match context.shape() {
        ResultShape::Entity { type_name } => context.model().require_type(type_name)?.key().to_vec(),
        ResultShape::Dynamic { properties } => properties
            .iter()
            .filter(|property| property.children.is_empty())
            .map(|property| property.name.clone())
            .collect(),
    };

    for name in names {
        let expression = Expr::member(Expr::parameter(variable), name);
        if keys.iter().all(|key| key.expression != expression) {
            keys.push(SortKey {
                expression,
                descending: false,
            });
        }
    }

    Ok(keys)
}
