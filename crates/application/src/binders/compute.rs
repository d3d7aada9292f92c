use querylens_core::AppResult;
use querylens_domain::ComputeClause;
use tracing::debug;

use super::{ExpressionBinder, QueryBinderContext};
use crate::query::{ComputedValue, QueryOperator};

/// Binds `$compute` and returns the context in which the aliases are visible.
pub fn bind_compute(
    clause: &ComputeClause,
    context: &QueryBinderContext,
) -> AppResult<(QueryOperator, QueryBinderContext)> {
    let mut binder = ExpressionBinder::new(context);
    let mut values = Vec::with_capacity(clause.items.len());
    for item in &clause.items {
        let expression = binder.bind(&item.expression)?;
        debug!(alias = %item.alias, expression = %expression, "bound computed value");
        values.push(ComputedValue {
            alias: item.alias.clone(),
            expression,
        });
    }

    let next = clause
        .items
        .iter()
        .fold(context.clone(), |next, item| next.with_computed(item.alias.clone()));

    Ok((
        QueryOperator::Compute {
            variable: context.range_variable().to_owned(),
            values,
        },
        next,
    ))
}
