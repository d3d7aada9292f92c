//! In-memory query execution over JSON rows.

use std::cmp::Ordering;

use querylens_core::AppResult;
use querylens_domain::QuerySettings;
use serde_json::Value;
use tracing::debug;

use crate::expression::Expr;
use crate::query::{ComputedValue, Query, QueryExecutor, QueryOperator, SortKey};
use crate::wrappers::{
    ComputeWrapper, FlatteningWrapper, NamedValue, PropertyContainer, ResultWrapper, Row,
};

mod evaluate;
mod functions;
mod grouping;
mod projection;
mod values;

use self::evaluate::Evaluator;
use self::values::order_values;

fn filter_rows(
    evaluator: &Evaluator,
    variable: &str,
    predicate: &Expr,
    rows: Vec<Row>,
) -> AppResult<Vec<Row>> {
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if evaluator.test_row(predicate, variable, &row)? {
            kept.push(row);
        }
    }

    Ok(kept)
}

/// Stable sort of rows by keys; nulls order first.
fn order_rows(
    evaluator: &Evaluator,
    variable: &str,
    keys: &[SortKey],
    rows: Vec<Row>,
) -> AppResult<Vec<Row>> {
    let mut keyed = rows
        .into_iter()
        .map(|row| -> AppResult<(Vec<Value>, Row)> {
            let values = keys
                .iter()
                .map(|key| evaluator.evaluate_row(&key.expression, variable, &row))
                .collect::<AppResult<Vec<Value>>>()?;
            Ok((values, row))
        })
        .collect::<AppResult<Vec<_>>>()?;

    keyed.sort_by(|(left, _), (right, _)| {
        keys.iter()
            .zip(left.iter().zip(right))
            .map(|(key, (left, right))| {
                let ordering = order_values(left, right);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

fn computed_entries(
    evaluator: &Evaluator,
    variable: &str,
    values: &[ComputedValue],
    row: &Row,
) -> AppResult<Vec<NamedValue>> {
    values
        .iter()
        .map(|computed| {
            evaluator
                .evaluate_row(&computed.expression, variable, row)
                .map(|value| NamedValue::leaf(computed.alias.clone(), value))
        })
        .collect()
}

/// Executes query pipelines against rows held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryExecutor {
    evaluator: Evaluator,
}

impl InMemoryExecutor {
    /// Creates an executor evaluating temporal functions in the settings' time zone.
    #[must_use]
    pub fn new(settings: &QuerySettings) -> Self {
        Self {
            evaluator: Evaluator::new(settings.time_zone()),
        }
    }

    fn apply(&self, operator: &QueryOperator, rows: Vec<Row>) -> AppResult<Vec<Row>> {
        let evaluator = &self.evaluator;
        match operator {
            QueryOperator::Where {
                variable,
                predicate,
            } => filter_rows(evaluator, variable, predicate, rows),
            QueryOperator::OrderBy { variable, keys } => order_rows(evaluator, variable, keys, rows),
            QueryOperator::Skip { count } => Ok(rows.into_iter().skip(*count).collect()),
            QueryOperator::Take { count } => Ok(rows.into_iter().take(*count).collect()),
            QueryOperator::Compute { variable, values } => rows
                .into_iter()
                .map(|row| -> AppResult<Row> {
                    let entries = computed_entries(evaluator, variable, values, &row)?;
                    Ok(Row::Wrapper(ResultWrapper::Compute(ComputeWrapper::new(
                        row,
                        PropertyContainer::from_entries(entries),
                    ))))
                })
                .collect(),
            QueryOperator::Flatten { variable, values } => rows
                .into_iter()
                .map(|row| -> AppResult<Row> {
                    let entries = computed_entries(evaluator, variable, values, &row)?
                        .into_iter()
                        .map(NamedValue::auto_selected);
                    Ok(Row::Wrapper(ResultWrapper::Flattening(FlatteningWrapper::new(
                        row,
                        PropertyContainer::from_entries(entries),
                    ))))
                })
                .collect(),
            QueryOperator::GroupBy {
                variable,
                keys,
                aggregates,
            } => grouping::group_rows(evaluator, variable, keys, aggregates.as_deref(), rows),
            QueryOperator::Aggregate {
                variable,
                aggregates,
            } => Ok(vec![grouping::aggregate_rows(
                evaluator, variable, aggregates, &rows,
            )?]),
            QueryOperator::Project { projection } => rows
                .into_iter()
                .map(|row| projection::project_row(evaluator, projection, row).map(Row::Wrapper))
                .collect(),
        }
    }
}

impl Default for InMemoryExecutor {
    fn default() -> Self {
        Self::new(&QuerySettings::default())
    }
}

impl QueryExecutor for InMemoryExecutor {
    fn execute(&self, query: &Query, source: Vec<Row>) -> AppResult<Vec<Row>> {
        let mut rows = source;
        for operator in query.operators() {
            let before = rows.len();
            rows = self.apply(operator, rows)?;
            debug!(
                operator = operator.name(),
                rows_in = before,
                rows_out = rows.len(),
                "applied query operator"
            );
        }

        Ok(rows)
    }
}
