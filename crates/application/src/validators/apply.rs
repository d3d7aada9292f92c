use querylens_core::{AppResult, ValidationError};
use querylens_domain::{
    AggregateExpression, AggregateExpressionKind, ApplyClause, GroupByPropertyNode,
    TransformationNode,
};

use super::walk::{ClauseWalker, Usage, Walked};
use super::{QueryOptionValidator, ValidationContext};
use crate::binders::{QueryBinderContext, stage_result_context};

/// Default `$apply` validator.
///
/// Stages are checked in order, each against the shape the previous stage
/// leaves behind, so names that disappear in a `groupby` are rejected in
/// every later stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyQueryValidator;

fn group_paths(nodes: &[GroupByPropertyNode], prefix: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
    for node in nodes {
        prefix.push(node.name.clone());
        if node.is_leaf() {
            paths.push(prefix.clone());
        } else {
            group_paths(&node.children, prefix, paths);
        }
        prefix.pop();
    }
}

fn validate_aggregates(
    expressions: &[AggregateExpression],
    context: &ValidationContext<'_>,
) -> AppResult<()> {
    let binder = context.binder();
    let mut walker = ClauseWalker::new(*context, Usage::Apply, binder.range_variable());

    for aggregate in expressions {
        match &aggregate.kind {
            AggregateExpressionKind::Count => {}
            AggregateExpressionKind::Property { expression, .. } => walker.walk(expression)?,
            AggregateExpressionKind::Entity {
                navigation,
                children,
            } => {
                let walked = walker.walk_path(std::slice::from_ref(navigation))?;
                let Walked::Collection { element, .. } = walked else {
                    return Err(ValidationError::invalid(format!(
                        "'{navigation}' is not a collection navigation property"
                    ))
                    .into());
                };
                let Walked::Structured { type_name, hop } = *element else {
                    return Err(ValidationError::invalid(format!(
                        "'{navigation}' is not a collection navigation property"
                    ))
                    .into());
                };

                let target = QueryBinderContext::new(
                    binder.model_handle(),
                    binder.settings().clone(),
                    type_name,
                )?;
                let nested = context.for_binder(&target).with_navigation(hop.as_ref());
                validate_aggregates(children, &nested)?;
            }
        }
    }

    Ok(())
}

fn validate_stage(
    transformation: &TransformationNode,
    context: &ValidationContext<'_>,
) -> AppResult<()> {
    match transformation {
        TransformationNode::Aggregate { expressions } => validate_aggregates(expressions, context),
        TransformationNode::GroupBy {
            properties,
            aggregate,
        } => {
            let mut paths = Vec::new();
            group_paths(properties, &mut Vec::new(), &mut paths);
            let mut walker =
                ClauseWalker::new(*context, Usage::Apply, context.binder().range_variable());
            for path in &paths {
                if !matches!(walker.walk_path(path)?, Walked::Scalar) {
                    return Err(ValidationError::invalid(format!(
                        "groupby property '{}' must end at a primitive or enum property",
                        path.join("/")
                    ))
                    .into());
                }
            }
            match aggregate {
                Some(expressions) => validate_aggregates(expressions, context),
                None => Ok(()),
            }
        }
        TransformationNode::Filter { clause } => context.registry().filter().validate(clause, context),
        TransformationNode::Compute { clause } => {
            let mut walker =
                ClauseWalker::new(*context, Usage::Apply, context.binder().range_variable());
            for item in &clause.items {
                walker.walk(&item.expression)?;
            }
            Ok(())
        }
    }
}

impl QueryOptionValidator<ApplyClause> for ApplyQueryValidator {
    fn validate(&self, option: &ApplyClause, context: &ValidationContext<'_>) -> AppResult<()> {
        let mut current = context.binder().clone();
        for transformation in &option.transformations {
            validate_stage(transformation, &context.for_binder(&current))?;
            current = stage_result_context(transformation, current);
        }

        Ok(())
    }
}
