use querylens_core::AppResult;
use serde_json::Value;

use super::evaluate::Evaluator;
use super::order_rows;
use super::values::collection;
use crate::query::{ProjectedExpansion, Projection};
use crate::wrappers::{
    ContainerValue, NamedValue, PropertyContainer, ResultWrapper, Row, SelectExpandWrapper,
};

fn expand_collection(
    evaluator: &Evaluator,
    expansion: &ProjectedExpansion,
    related: Value,
    entries: &mut Vec<NamedValue>,
) -> AppResult<()> {
    let nested = &expansion.projection;
    let mut rows: Vec<Row> = collection(related)?.into_iter().map(Row::Instance).collect();

    if let Some(filter) = &expansion.filter {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if evaluator.test_row(filter, &nested.variable, &row)? {
                kept.push(row);
            }
        }
        rows = kept;
    }
    let count = rows.len();

    if !expansion.order_by.is_empty() {
        rows = order_rows(evaluator, &nested.variable, &expansion.order_by, rows)?;
    }
    let rows = rows
        .into_iter()
        .skip(expansion.skip.unwrap_or(0))
        .take(expansion.top.unwrap_or(usize::MAX));

    let wrappers = rows
        .map(|row| project_row(evaluator, nested, row))
        .collect::<AppResult<Vec<_>>>()?;

    entries.push(NamedValue::new(
        expansion.name.clone(),
        ContainerValue::WrappedCollection(wrappers),
    ));
    if expansion.count {
        entries.push(NamedValue::leaf(
            format!("{}@odata.count", expansion.name),
            Value::from(count),
        ));
    }

    Ok(())
}

fn expand_single(
    evaluator: &Evaluator,
    expansion: &ProjectedExpansion,
    related: Value,
) -> AppResult<NamedValue> {
    if related.is_null() {
        return Ok(NamedValue::leaf(expansion.name.clone(), Value::Null));
    }

    let nested = &expansion.projection;
    let row = Row::Instance(related);
    if let Some(filter) = &expansion.filter
        && !evaluator.test_row(filter, &nested.variable, &row)?
    {
        return Ok(NamedValue::leaf(expansion.name.clone(), Value::Null));
    }

    let wrapper = project_row(evaluator, nested, row)?;
    Ok(NamedValue::new(
        expansion.name.clone(),
        ContainerValue::Wrapped(Box::new(wrapper)),
    ))
}

/// Shapes one row into a select/expand wrapper.
pub(super) fn project_row(
    evaluator: &Evaluator,
    projection: &Projection,
    row: Row,
) -> AppResult<ResultWrapper> {
    let mut entries = Vec::with_capacity(projection.properties.len() + projection.expansions.len());

    for property in &projection.properties {
        let value = evaluator.evaluate_row(&property.expression, &projection.variable, &row)?;
        let entry = NamedValue::leaf(property.name.clone(), value);
        entries.push(if property.auto_selected {
            entry.auto_selected()
        } else {
            entry
        });
    }

    for expansion in &projection.expansions {
        let related = evaluator.evaluate_row(&expansion.source, &projection.variable, &row)?;
        if expansion.is_collection {
            expand_collection(evaluator, expansion, related, &mut entries)?;
        } else {
            entries.push(expand_single(evaluator, expansion, related)?);
        }
    }

    let container = PropertyContainer::from_entries(entries);
    let wrapper = if projection.select_all {
        SelectExpandWrapper::select_all(
            projection.type_name.clone(),
            row,
            projection.structural.clone(),
            container,
        )
    } else {
        SelectExpandWrapper::select_some(projection.type_name.clone(), container)
    };

    Ok(ResultWrapper::SelectExpand(wrapper))
}
