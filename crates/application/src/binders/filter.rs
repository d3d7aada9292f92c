use querylens_core::AppResult;
use querylens_domain::FilterClause;
use tracing::debug;

use super::{ExpressionBinder, QueryBinderContext};
use crate::query::QueryOperator;

/// Binds `$filter` to a `where` operator over the context's rows.
pub fn bind_filter(clause: &FilterClause, context: &QueryBinderContext) -> AppResult<QueryOperator> {
    let predicate = ExpressionBinder::for_variable(context, &clause.range_variable)
        .bind(&clause.expression)?;
    debug!(predicate = %predicate, "bound filter");

    Ok(QueryOperator::Where {
        variable: clause.range_variable.clone(),
        predicate,
    })
}
