use std::collections::HashMap;

use querylens_core::AppResult;
use serde_json::Value;

use super::evaluate::{Binding, Evaluator, Scope};
use super::values::{aggregate, collection};
use crate::query::{AggregateKind, AggregateSpec, GroupKey};
use crate::wrappers::{
    AggregationWrapper, ContainerValue, GroupByWrapper, NamedValue, NoGroupByAggregationWrapper,
    PropertyContainer, ResultWrapper, Row,
};

enum KeyNode {
    Leaf(Value),
    Branch(Vec<(String, KeyNode)>),
}

fn insert_path(nodes: &mut Vec<(String, KeyNode)>, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        nodes.push((head.clone(), KeyNode::Leaf(value)));
        return;
    }

    let position = nodes
        .iter()
        .position(|(name, node)| name == head && matches!(node, KeyNode::Branch(_)));
    let position = position.unwrap_or_else(|| {
        nodes.push((head.clone(), KeyNode::Branch(Vec::new())));
        nodes.len() - 1
    });
    if let Some((_, KeyNode::Branch(children))) = nodes.get_mut(position) {
        insert_path(children, rest, value);
    }
}

fn key_chain(nodes: Vec<(String, KeyNode)>) -> Option<PropertyContainer> {
    PropertyContainer::from_entries(nodes.into_iter().map(|(name, node)| match node {
        KeyNode::Leaf(value) => NamedValue::leaf(name, value),
        KeyNode::Branch(children) => match key_chain(children) {
            Some(chain) => NamedValue::new(name, ContainerValue::Nested(Box::new(chain))),
            None => NamedValue::leaf(name, Value::Null),
        },
    }))
}

fn group_container(keys: &[GroupKey], values: Vec<Value>) -> Option<PropertyContainer> {
    let mut nodes = Vec::new();
    for (key, value) in keys.iter().zip(values) {
        insert_path(&mut nodes, &key.path, value);
    }
    key_chain(nodes)
}

/// Computes every aggregate over `elements`, in declaration order.
pub(super) fn aggregate_entries(
    evaluator: &Evaluator,
    variable: &str,
    specs: &[AggregateSpec],
    elements: &[Binding<'_>],
) -> AppResult<Vec<NamedValue>> {
    let mut entries = Vec::with_capacity(specs.len());
    for spec in specs {
        let entry = match &spec.kind {
            AggregateKind::Count => NamedValue::leaf(spec.alias.clone(), Value::from(elements.len())),
            AggregateKind::Property {
                expression,
                function,
            } => {
                let values = elements
                    .iter()
                    .map(|element| evaluator.evaluate(expression, &Scope::root(variable, *element)))
                    .collect::<AppResult<Vec<_>>>()?;
                NamedValue::leaf(spec.alias.clone(), aggregate(*function, values))
            }
            AggregateKind::Entity {
                navigation,
                variable: target_variable,
                children,
            } => {
                let mut targets = Vec::new();
                for element in elements {
                    let related = evaluator.evaluate(navigation, &Scope::root(variable, *element))?;
                    targets.extend(collection(related)?);
                }
                let bindings: Vec<Binding<'_>> = targets.iter().map(Binding::Value).collect();
                let nested = aggregate_entries(evaluator, target_variable, children, &bindings)?;
                match PropertyContainer::from_entries(nested) {
                    Some(chain) => {
                        NamedValue::new(spec.alias.clone(), ContainerValue::Nested(Box::new(chain)))
                    }
                    None => NamedValue::leaf(spec.alias.clone(), Value::Null),
                }
            }
        };
        entries.push(entry);
    }

    Ok(entries)
}

/// Groups rows by key values, keeping groups in first-seen order.
pub(super) fn group_rows(
    evaluator: &Evaluator,
    variable: &str,
    keys: &[GroupKey],
    aggregates: Option<&[AggregateSpec]>,
    rows: Vec<Row>,
) -> AppResult<Vec<Row>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();

    for row in rows {
        let key_values = keys
            .iter()
            .map(|key| evaluator.evaluate_row(&key.expression, variable, &row))
            .collect::<AppResult<Vec<_>>>()?;
        let fingerprint = Value::Array(key_values.clone()).to_string();

        match positions.get(&fingerprint) {
            Some(&position) => groups[position].1.push(row),
            None => {
                positions.insert(fingerprint, groups.len());
                groups.push((key_values, vec![row]));
            }
        }
    }

    let mut grouped = Vec::with_capacity(groups.len());
    for (key_values, members) in groups {
        let group_by = group_container(keys, key_values);
        let wrapper = match aggregates {
            None => ResultWrapper::GroupBy(GroupByWrapper::new(group_by)),
            Some(specs) => {
                let bindings: Vec<Binding<'_>> = members.iter().map(Binding::Row).collect();
                let entries = aggregate_entries(evaluator, variable, specs, &bindings)?;
                ResultWrapper::Aggregation(AggregationWrapper::new(
                    group_by,
                    PropertyContainer::from_entries(entries),
                ))
            }
        };
        grouped.push(Row::Wrapper(wrapper));
    }

    Ok(grouped)
}

/// Aggregates every row into a single row.
pub(super) fn aggregate_rows(
    evaluator: &Evaluator,
    variable: &str,
    specs: &[AggregateSpec],
    rows: &[Row],
) -> AppResult<Row> {
    let bindings: Vec<Binding<'_>> = rows.iter().map(Binding::Row).collect();
    let entries = aggregate_entries(evaluator, variable, specs, &bindings)?;

    Ok(Row::Wrapper(ResultWrapper::NoGroupByAggregation(
        NoGroupByAggregationWrapper::new(PropertyContainer::from_entries(entries)),
    )))
}
