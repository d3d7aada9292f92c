use querylens_core::{AppError, AppResult};
use querylens_domain::{
    AggregateExpression, AggregateExpressionKind, AggregationMethod, ApplyClause,
    GroupByPropertyNode, TransformationNode,
};
use tracing::debug;

use super::expression::NodeType;
use super::{
    ExpressionBinder, QueryBinderContext, ResultShape, ShapeProperty, bind_compute, bind_filter,
};
use crate::expression::{AggregateFunction, Expr};
use crate::query::{AggregateKind, AggregateSpec, ComputedValue, GroupKey, Query, QueryOperator};

fn aggregate_function(method: &AggregationMethod) -> AppResult<AggregateFunction> {
    match method {
        AggregationMethod::Sum => Ok(AggregateFunction::Sum),
        AggregationMethod::Min => Ok(AggregateFunction::Min),
        AggregationMethod::Max => Ok(AggregateFunction::Max),
        AggregationMethod::Average => Ok(AggregateFunction::Average),
        AggregationMethod::CountDistinct => Ok(AggregateFunction::CountDistinct),
        AggregationMethod::Custom(name) => Err(AppError::NotSupported(format!(
            "custom aggregation method '{name}' is not supported"
        ))),
    }
}

fn bind_aggregates(
    expressions: &[AggregateExpression],
    binder: &mut ExpressionBinder<'_>,
    context: &QueryBinderContext,
) -> AppResult<Vec<AggregateSpec>> {
    let mut specs = Vec::with_capacity(expressions.len());
    for aggregate in expressions {
        let kind = match &aggregate.kind {
            AggregateExpressionKind::Count => AggregateKind::Count,
            AggregateExpressionKind::Property { expression, method } => AggregateKind::Property {
                expression: binder.bind(expression)?,
                function: aggregate_function(method)?,
            },
            AggregateExpressionKind::Entity {
                navigation,
                children,
            } => {
                let path = binder.bind_path(std::slice::from_ref(navigation))?;
                let NodeType::Structured(target) = path.node_type.element("entity aggregation")?
                else {
                    return Err(AppError::Internal(format!(
                        "'{navigation}' does not lead to an entity collection"
                    )));
                };
                let variable = binder.root_variable().to_owned();
                let mut target_binder = ExpressionBinder::over_type(context, &variable, &target);
                AggregateKind::Entity {
                    navigation: path.expression,
                    children: bind_aggregates(children, &mut target_binder, context)?,
                    variable,
                }
            }
        };
        specs.push(AggregateSpec {
            alias: aggregate.alias.clone(),
            kind,
        });
    }

    Ok(specs)
}

fn leaf_paths(nodes: &[GroupByPropertyNode], prefix: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
    for node in nodes {
        prefix.push(node.name.clone());
        if node.is_leaf() {
            paths.push(prefix.clone());
        } else {
            leaf_paths(&node.children, prefix, paths);
        }
        prefix.pop();
    }
}

fn insert_shape_path(properties: &mut Vec<ShapeProperty>, path: &[String]) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let position = match properties.iter().position(|property| &property.name == head) {
        Some(position) => position,
        None => {
            properties.push(ShapeProperty::leaf(head.clone()));
            properties.len() - 1
        }
    };
    if let Some(property) = properties.get_mut(position) {
        insert_shape_path(&mut property.children, rest);
    }
}

fn aggregate_shape(aggregates: &[AggregateExpression]) -> Vec<ShapeProperty> {
    aggregates
        .iter()
        .map(|aggregate| ShapeProperty {
            name: aggregate.alias.clone(),
            children: match &aggregate.kind {
                AggregateExpressionKind::Entity { children, .. } => aggregate_shape(children),
                _ => Vec::new(),
            },
        })
        .collect()
}

fn group_by_shape(paths: &[Vec<String>], aggregates: Option<&[AggregateExpression]>) -> ResultShape {
    let mut properties = Vec::new();
    for path in paths {
        insert_shape_path(&mut properties, path);
    }
    properties.extend(aggregate_shape(aggregates.unwrap_or_default()));

    ResultShape::Dynamic { properties }
}

fn bind_group_by(
    properties: &[GroupByPropertyNode],
    aggregate: Option<&[AggregateExpression]>,
    context: &QueryBinderContext,
) -> AppResult<(Query, QueryBinderContext)> {
    let variable = context.range_variable().to_owned();
    let mut binder = ExpressionBinder::new(context);

    let mut paths = Vec::new();
    leaf_paths(properties, &mut Vec::new(), &mut paths);

    let mut flattened = Vec::new();
    let mut keys = Vec::with_capacity(paths.len());
    let mut canonical_paths = Vec::with_capacity(paths.len());
    for path in &paths {
        let bound = binder.bind_path(path)?;
        let expression = if bound.crosses_navigation {
            let alias = format!("Property{}", flattened.len());
            flattened.push(ComputedValue {
                alias: alias.clone(),
                expression: bound.expression,
            });
            Expr::member(Expr::parameter(variable.as_str()), alias)
        } else {
            bound.expression
        };
        keys.push(GroupKey {
            path: bound.canonical.clone(),
            expression,
        });
        canonical_paths.push(bound.canonical);
    }

    let aggregates = aggregate
        .map(|expressions| bind_aggregates(expressions, &mut binder, context))
        .transpose()?;

    let mut query = Query::new();
    if !flattened.is_empty() {
        query = query.then(QueryOperator::Flatten {
            variable: variable.clone(),
            values: flattened,
        });
    }
    query = query.then(QueryOperator::GroupBy {
        variable,
        keys,
        aggregates,
    });

    let shape = group_by_shape(&canonical_paths, aggregate);
    Ok((query, context.clone().with_shape(shape)))
}

fn bind_transformation(
    transformation: &TransformationNode,
    context: &QueryBinderContext,
) -> AppResult<(Query, QueryBinderContext)> {
    match transformation {
        TransformationNode::Aggregate { expressions } => {
            let mut binder = ExpressionBinder::new(context);
            let aggregates = bind_aggregates(expressions, &mut binder, context)?;
            let shape = ResultShape::Dynamic {
                properties: aggregate_shape(expressions),
            };
            Ok((
                Query::new().then(QueryOperator::Aggregate {
                    variable: context.range_variable().to_owned(),
                    aggregates,
                }),
                context.clone().with_shape(shape),
            ))
        }
        TransformationNode::GroupBy {
            properties,
            aggregate,
        } => bind_group_by(properties, aggregate.as_deref(), context),
        TransformationNode::Filter { clause } => {
            Ok((Query::new().then(bind_filter(clause, context)?), context.clone()))
        }
        TransformationNode::Compute { clause } => {
            let (operator, next) = bind_compute(clause, context)?;
            Ok((Query::new().then(operator), next))
        }
    }
}

/// Binds an `$apply` pipeline stage by stage.
///
/// Every stage binds against the shape produced by the stage before it; the
/// returned context carries the final shape.
pub fn bind_apply(
    clause: &ApplyClause,
    context: &QueryBinderContext,
) -> AppResult<(Query, QueryBinderContext)> {
    let mut query = Query::new();
    let mut current = context.clone();
    for (index, transformation) in clause.transformations.iter().enumerate() {
        let (stage, next) = bind_transformation(transformation, &current)?;
        debug!(
            index,
            transformation = transformation.name(),
            operators = stage.operators().len(),
            "bound apply stage"
        );
        query = query.chain(stage);
        current = next;
    }

    Ok((query, current))
}

/// Computes the context one `$apply` stage leaves rows in, without binding.
pub(crate) fn stage_result_context(
    transformation: &TransformationNode,
    context: QueryBinderContext,
) -> QueryBinderContext {
    match transformation {
        TransformationNode::Aggregate { expressions } => context.with_shape(ResultShape::Dynamic {
            properties: aggregate_shape(expressions),
        }),
        TransformationNode::GroupBy {
            properties,
            aggregate,
        } => {
            let mut paths = Vec::new();
            leaf_paths(properties, &mut Vec::new(), &mut paths);
            context.with_shape(group_by_shape(&paths, aggregate.as_deref()))
        }
        TransformationNode::Filter { .. } => context,
        TransformationNode::Compute { clause } => clause
            .items
            .iter()
            .fold(context, |next, item| next.with_computed(item.alias.clone())),
    }
}

/// Computes the context an `$apply` pipeline leaves rows in, without binding.
///
/// Names are taken as written; unknown names are left for validation to report.
#[must_use]
pub fn apply_result_context(
    clause: &ApplyClause,
    context: &QueryBinderContext,
) -> QueryBinderContext {
    clause
        .transformations
        .iter()
        .fold(context.clone(), |current, transformation| {
            stage_result_context(transformation, current)
        })
}
