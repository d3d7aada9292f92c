use querylens_core::{AppError, AppResult, ValidationError};
use querylens_domain::{ElementId, QueryNode, THIS};

use super::ValidationContext;
use crate::binders::{ResultShape, ShapeProperty};
use crate::expression::BuiltinFunction;
use crate::resolver::PropertyPosition;

const APPLY_RESULT: &str = "$apply result";

/// Which capability a property reference must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Usage {
    Filter,
    OrderBy,
    Apply,
}

impl Usage {
    fn option(self) -> &'static str {
        match self {
            Self::Filter => "$filter",
            Self::OrderBy => "$orderby",
            Self::Apply => "$apply",
        }
    }
}

/// What the walk knows about the value of a node.
#[derive(Debug, Clone)]
pub(super) enum Walked {
    Scalar,
    Structured {
        type_name: String,
        hop: Option<ElementId>,
    },
    Dynamic(Vec<ShapeProperty>),
    Collection {
        element: Box<Walked>,
        navigation: Option<ElementId>,
    },
}

fn restricted(property: &str, option: &str) -> AppError {
    ValidationError::PropertyRestricted {
        property: property.to_owned(),
        option: option.to_owned(),
    }
    .into()
}

/// Walks a clause and rejects the first property reference the model forbids.
pub(super) struct ClauseWalker<'c> {
    context: ValidationContext<'c>,
    usage: Usage,
    variables: Vec<(String, Walked)>,
    lambda_depth: u32,
}

impl<'c> ClauseWalker<'c> {
    pub(super) fn new(context: ValidationContext<'c>, usage: Usage, variable: &str) -> Self {
        let root = match context.binder().shape() {
            ResultShape::Entity { type_name } => Walked::Structured {
                type_name: type_name.clone(),
                hop: context.navigation().cloned(),
            },
            ResultShape::Dynamic { properties } => Walked::Dynamic(properties.clone()),
        };

        Self {
            context,
            usage,
            variables: vec![(variable.to_owned(), root)],
            lambda_depth: 0,
        }
    }

    pub(super) fn walk(&mut self, node: &QueryNode) -> AppResult<()> {
        self.visit(node).map(|_| ())
    }

    /// Resolves a property path from the root variable.
    pub(super) fn walk_path(&mut self, path: &[String]) -> AppResult<Walked> {
        let root = self
            .variables
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        let node = path
            .iter()
            .fold(QueryNode::range_variable(root), |source, segment| {
                source.property(segment.as_str())
            });
        self.visit(&node)
    }

    fn lookup(&self, name: &str) -> AppResult<Walked> {
        let found = if name == THIS {
            self.variables.last()
        } else {
            self.variables
                .iter()
                .rev()
                .find(|(variable, _)| variable == name)
        };

        found.map(|(_, walked)| walked.clone()).ok_or_else(|| {
            ValidationError::invalid(format!("range variable '{name}' is not in scope")).into()
        })
    }

    fn is_root(&self, node: &QueryNode) -> bool {
        let QueryNode::RangeVariable { name } = node else {
            return false;
        };
        let position = if name == THIS {
            self.variables.len().checked_sub(1)
        } else {
            self.variables
                .iter()
                .rposition(|(variable, _)| variable == name)
        };

        position == Some(0)
    }

    fn check_capability(&self, element: &ElementId, position: PropertyPosition<'_>) -> bool {
        let resolver = self.context.resolver();
        let defaults = self.context.defaults();
        match self.usage {
            Usage::Filter => resolver.is_not_filterable(element, position, defaults.enable_filter),
            Usage::OrderBy => {
                resolver.is_not_sortable(element, position, defaults.enable_order_by)
            }
            Usage::Apply => false,
        }
    }

    fn structured_member(
        &self,
        type_name: &str,
        hop: Option<&ElementId>,
        name: &str,
        from_root: bool,
    ) -> AppResult<Walked> {
        let binder = self.context.binder();
        let Some(definition) =
            binder
                .model()
                .property(type_name, name, binder.settings().enable_case_insensitive)
        else {
            if from_root && binder.is_computed(name) {
                return Ok(Walked::Scalar);
            }
            return Err(ValidationError::UnknownProperty {
                property: name.to_owned(),
                type_name: type_name.to_owned(),
            }
            .into());
        };

        let element = ElementId::of_property(type_name, definition.name());
        let position = match hop {
            Some(hop) => PropertyPosition::behind(hop, type_name),
            None => PropertyPosition::direct(type_name),
        };
        if definition.is_navigation() && self.context.resolver().is_not_navigable(&element) {
            return Err(restricted(definition.name(), self.usage.option()));
        }
        if self.check_capability(&element, position) {
            return Err(restricted(definition.name(), self.usage.option()));
        }

        let single = match definition.structured_target() {
            Some(target) => Walked::Structured {
                type_name: target.to_owned(),
                hop: Some(element.clone()),
            },
            None => Walked::Scalar,
        };
        if definition.is_collection() {
            Ok(Walked::Collection {
                element: Box::new(single),
                navigation: definition.is_navigation().then_some(element),
            })
        } else {
            Ok(single)
        }
    }

    fn member(&self, source: Walked, name: &str, from_root: bool) -> AppResult<Walked> {
        match source {
            Walked::Structured { type_name, hop } => {
                self.structured_member(&type_name, hop.as_ref(), name, from_root)
            }
            Walked::Dynamic(properties) => {
                let case_insensitive = self.context.binder().settings().enable_case_insensitive;
                let property = ShapeProperty::find(&properties, name, case_insensitive)
                    .ok_or_else(|| ValidationError::UnknownProperty {
                        property: name.to_owned(),
                        type_name: APPLY_RESULT.to_owned(),
                    })?;
                Ok(if property.children.is_empty() {
                    Walked::Scalar
                } else {
                    Walked::Dynamic(property.children.clone())
                })
            }
            Walked::Scalar | Walked::Collection { .. } => Err(ValidationError::invalid(format!(
                "property '{name}' cannot be read from a value that is not structured"
            ))
            .into()),
        }
    }

    fn enter_lambda(&mut self) -> AppResult<()> {
        self.lambda_depth += 1;
        let limit = self.context.settings().max_any_all_expression_depth;
        if self.lambda_depth > limit {
            return Err(ValidationError::LimitExceeded {
                option: "MaxAnyAllExpressionDepth".to_owned(),
                limit: u64::from(limit),
                value: u64::from(self.lambda_depth),
            }
            .into());
        }

        Ok(())
    }

    fn visit_lambda(
        &mut self,
        source: &QueryNode,
        variable: &str,
        body: Option<&QueryNode>,
        operator: &str,
    ) -> AppResult<Walked> {
        self.enter_lambda()?;
        let Walked::Collection { element, .. } = self.visit(source)? else {
            return Err(
                ValidationError::invalid(format!("'{operator}' requires a collection")).into(),
            );
        };

        if let Some(body) = body {
            self.variables.push((variable.to_owned(), *element));
            let walked = self.visit(body);
            self.variables.pop();
            walked?;
        }
        self.lambda_depth -= 1;

        Ok(Walked::Scalar)
    }

    fn check_function(&self, name: &str) -> AppResult<()> {
        let Some(function) = BuiltinFunction::from_name(name) else {
            return Err(ValidationError::invalid(format!("unknown function '{name}'")).into());
        };
        let allowed = self.context.settings().allowed_functions.as_ref();
        if allowed.is_some_and(|allowed| !allowed.contains(function.as_str())) {
            return Err(ValidationError::invalid(format!(
                "function '{}' is not allowed",
                function.as_str()
            ))
            .into());
        }

        Ok(())
    }

    fn check_count(&self, source: Walked) -> AppResult<()> {
        let Walked::Collection {
            element,
            navigation: Some(navigation),
        } = source
        else {
            return Ok(());
        };
        let Walked::Structured { type_name, .. } = *element else {
            return Ok(());
        };

        if self.context.resolver().is_not_countable(
            Some(&navigation),
            &type_name,
            self.context.defaults().enable_count,
        ) {
            return Err(restricted(
                navigation.property_name().unwrap_or_default(),
                "$count",
            ));
        }

        Ok(())
    }

    fn visit(&mut self, node: &QueryNode) -> AppResult<Walked> {
        match node {
            QueryNode::Constant { .. } => Ok(Walked::Scalar),
            QueryNode::RangeVariable { name } => self.lookup(name),
            QueryNode::Property { source, name } | QueryNode::Navigation { source, name } => {
                let from_root = self.is_root(source);
                let source = self.visit(source)?;
                self.member(source, name, from_root)
            }
            QueryNode::BinaryOperator {
                operator,
                left,
                right,
            } => {
                let allowed = self.context.settings().allowed_binary_operators.as_ref();
                if allowed.is_some_and(|allowed| !allowed.contains(operator)) {
                    return Err(ValidationError::invalid(format!(
                        "binary operator '{}' is not allowed",
                        operator.as_str()
                    ))
                    .into());
                }
                self.visit(left)?;
                self.visit(right)?;
                Ok(Walked::Scalar)
            }
            QueryNode::UnaryOperator { operator, operand } => {
                let allowed = self.context.settings().allowed_unary_operators.as_ref();
                if allowed.is_some_and(|allowed| !allowed.contains(operator)) {
                    return Err(ValidationError::invalid(format!(
                        "unary operator '{}' is not allowed",
                        operator.as_str()
                    ))
                    .into());
                }
                self.visit(operand)?;
                Ok(Walked::Scalar)
            }
            QueryNode::FunctionCall { name, arguments } => {
                self.check_function(name)?;
                for argument in arguments {
                    self.visit(argument)?;
                }
                Ok(Walked::Scalar)
            }
            QueryNode::Any {
                source,
                variable,
                body,
            } => self.visit_lambda(source, variable, body.as_deref(), "any"),
            QueryNode::All {
                source,
                variable,
                body,
            } => self.visit_lambda(source, variable, Some(body), "all"),
            QueryNode::In { item, collection } => {
                self.visit(item)?;
                self.visit(collection)?;
                Ok(Walked::Scalar)
            }
            QueryNode::Count { source } => {
                let source = self.visit(source)?;
                self.check_count(source)?;
                Ok(Walked::Scalar)
            }
            QueryNode::SearchTerm { text } => Err(ValidationError::invalid(format!(
                "search term '{text}' is only valid in $search"
            ))
            .into()),
        }
    }
}
