use querylens_core::{AppError, AppResult};
use querylens_domain::{
    NullPropagation, PrimitiveKind, PropertyDefinition, PropertyKind, QueryNode, THIS,
    UnaryOperatorKind,
};
use serde_json::Value;

use super::{QueryBinderContext, ResultShape, ShapeProperty};
use crate::expression::{BuiltinFunction, Expr};

/// What binding knows about the value of a bound node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum NodeType {
    Scalar(Option<PrimitiveKind>),
    Enum(String),
    Structured(String),
    Dynamic(Vec<ShapeProperty>),
    Collection(Box<NodeType>),
}

impl NodeType {
    fn of_property(definition: &PropertyDefinition) -> Self {
        let single = match definition.kind() {
            PropertyKind::Primitive { primitive } => Self::Scalar(Some(*primitive)),
            PropertyKind::Enum { enum_type } => Self::Enum(enum_type.clone()),
            PropertyKind::Complex { complex_type } => Self::Structured(complex_type.clone()),
            PropertyKind::Navigation { target_type } => Self::Structured(target_type.clone()),
        };
        if definition.is_collection() {
            Self::Collection(Box::new(single))
        } else {
            single
        }
    }

    pub(super) fn element(self, operation: &str) -> AppResult<Self> {
        match self {
            Self::Collection(element) => Ok(*element),
            other => Err(AppError::Internal(format!(
                "{operation} applied to a non-collection value of type {other:?}"
            ))),
        }
    }
}

/// A property path bound from the range variable.
#[derive(Debug, Clone)]
pub(super) struct BoundPath {
    pub(super) expression: Expr,
    pub(super) node_type: NodeType,
    pub(super) canonical: Vec<String>,
    pub(super) crosses_navigation: bool,
}

fn function_type(function: BuiltinFunction) -> NodeType {
    let primitive = match function {
        BuiltinFunction::Contains | BuiltinFunction::StartsWith | BuiltinFunction::EndsWith => {
            PrimitiveKind::Boolean
        }
        BuiltinFunction::Length
        | BuiltinFunction::IndexOf
        | BuiltinFunction::Year
        | BuiltinFunction::Month
        | BuiltinFunction::Day
        | BuiltinFunction::Hour
        | BuiltinFunction::Minute
        | BuiltinFunction::Second => PrimitiveKind::Int32,
        BuiltinFunction::Substring
        | BuiltinFunction::ToLower
        | BuiltinFunction::ToUpper
        | BuiltinFunction::Trim
        | BuiltinFunction::Concat => PrimitiveKind::String,
        BuiltinFunction::Date => PrimitiveKind::Date,
        BuiltinFunction::Now => PrimitiveKind::DateTimeOffset,
        BuiltinFunction::Round | BuiltinFunction::Floor | BuiltinFunction::Ceiling => {
            PrimitiveKind::Double
        }
    };
    NodeType::Scalar(Some(primitive))
}

/// Binds query nodes to expressions over the rows of a binder context.
///
/// Lambda variables are kept on a stack; the root entry is the range variable.
#[derive(Debug)]
pub struct ExpressionBinder<'a> {
    context: &'a QueryBinderContext,
    variables: Vec<(String, NodeType)>,
}

impl<'a> ExpressionBinder<'a> {
    /// Creates a binder rooted at the context's range variable.
    #[must_use]
    pub fn new(context: &'a QueryBinderContext) -> Self {
        Self::for_variable(context, context.range_variable())
    }

    /// Creates a binder whose root variable has a clause-specific name.
    #[must_use]
    pub fn for_variable(context: &'a QueryBinderContext, variable: &str) -> Self {
        let root = match context.shape() {
            ResultShape::Entity { type_name } => NodeType::Structured(type_name.clone()),
            ResultShape::Dynamic { properties } => NodeType::Dynamic(properties.clone()),
        };
        Self {
            context,
            variables: vec![(variable.to_owned(), root)],
        }
    }

    /// Creates a binder over instances of `type_name`, e.g. navigation targets.
    pub(super) fn over_type(
        context: &'a QueryBinderContext,
        variable: &str,
        type_name: &str,
    ) -> Self {
        Self {
            context,
            variables: vec![(variable.to_owned(), NodeType::Structured(type_name.to_owned()))],
        }
    }

    /// Returns the root variable name.
    #[must_use]
    pub fn root_variable(&self) -> &str {
        self.variables
            .first()
            .map_or(self.context.range_variable(), |(name, _)| name.as_str())
    }

    /// Binds a node to an expression.
    pub fn bind(&mut self, node: &QueryNode) -> AppResult<Expr> {
        self.bind_node(node).map(|(expression, _)| expression)
    }

    fn case_insensitive(&self) -> bool {
        self.context.settings().enable_case_insensitive
    }

    fn propagates_nulls(&self) -> bool {
        self.context.settings().null_propagation == NullPropagation::Always
    }

    fn access(&self, source: Expr, name: &str) -> Expr {
        if !self.propagates_nulls() || matches!(source, Expr::Parameter { .. }) {
            return Expr::member(source, name);
        }

        Expr::conditional(
            Expr::is_null(source.clone()),
            Expr::constant(Value::Null),
            Expr::member(source, name),
        )
    }

    fn lookup(&self, name: &str) -> AppResult<(String, NodeType)> {
        let found = if name == THIS {
            self.variables.last()
        } else {
            self.variables
                .iter()
                .rev()
                .find(|(variable, _)| variable == name)
        };

        found
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("range variable '{name}' is not in scope")))
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

    fn resolve_member(
        &self,
        source: Expr,
        source_type: NodeType,
        name: &str,
        from_root: bool,
    ) -> AppResult<(Expr, NodeType, String, bool)> {
        match source_type {
            NodeType::Structured(type_name) => {
                let definition =
                    self.context
                        .model()
                        .property(&type_name, name, self.case_insensitive());
                match definition {
                    Some(definition) => Ok((
                        self.access(source, definition.name()),
                        NodeType::of_property(definition),
                        definition.name().to_owned(),
                        definition.is_navigation(),
                    )),
                    None if from_root && self.context.is_computed(name) => Ok((
                        self.access(source, name),
                        NodeType::Scalar(None),
                        name.to_owned(),
                        false,
                    )),
                    None => Err(AppError::Internal(format!(
                        "property '{name}' is not declared on '{type_name}'"
                    ))),
                }
            }
            NodeType::Dynamic(properties) => {
                let Some(property) =
                    ShapeProperty::find(&properties, name, self.case_insensitive())
                else {
                    return Err(AppError::Internal(format!(
                        "property '{name}' is not part of the aggregated result"
                    )));
                };
                let node_type = if property.children.is_empty() {
                    NodeType::Scalar(None)
                } else {
                    NodeType::Dynamic(property.children.clone())
                };
                Ok((
                    self.access(source, &property.name),
                    node_type,
                    property.name.clone(),
                    false,
                ))
            }
            other => Err(AppError::Internal(format!(
                "property '{name}' read from a value of type {other:?}"
            ))),
        }
    }

    /// Binds a property path starting at the root variable.
    pub(super) fn bind_path(&mut self, path: &[String]) -> AppResult<BoundPath> {
        let (root, root_type) = self.lookup(self.root_variable())?;
        let mut bound = BoundPath {
            expression: Expr::parameter(root),
            node_type: root_type,
            canonical: Vec::with_capacity(path.len()),
            crosses_navigation: false,
        };

        for (index, segment) in path.iter().enumerate() {
            let (expression, node_type, name, is_navigation) =
                self.resolve_member(bound.expression, bound.node_type, segment, index == 0)?;
            bound.expression = expression;
            bound.node_type = node_type;
            bound.canonical.push(name);
            bound.crosses_navigation |= is_navigation;
        }

        Ok(bound)
    }

    fn canonical_enum(&self, expression: Expr, other: &NodeType) -> Expr {
        let NodeType::Enum(enum_type) = other else {
            return expression;
        };
        let Some(definition) = self.context.model().enum_type(enum_type) else {
            return expression;
        };

        match expression {
            Expr::Constant {
                value: Value::String(text),
            } => {
                let members: Option<Vec<&str>> = text
                    .split(',')
                    .map(|member| definition.member(member.trim()).map(|found| found.name.as_str()))
                    .collect();
                let canonical = members.map_or(text, |members| members.join(", "));
                Expr::constant(Value::String(canonical))
            }
            Expr::Constant {
                value: Value::Array(items),
            } => Expr::constant(Value::Array(
                items
                    .into_iter()
                    .map(|item| match self.canonical_enum(Expr::constant(item), other) {
                        Expr::Constant { value } => value,
                        _ => Value::Null,
                    })
                    .collect(),
            )),
            expression => expression,
        }
    }

    fn bind_lambda(
        &mut self,
        variable: &str,
        element: NodeType,
        body: &QueryNode,
    ) -> AppResult<Expr> {
        self.variables.push((variable.to_owned(), element));
        let bound = self.bind_node(body);
        self.variables.pop();
        bound.map(|(expression, _)| expression)
    }

    pub(super) fn bind_node(&mut self, node: &QueryNode) -> AppResult<(Expr, NodeType)> {
        match node {
            QueryNode::Constant { value } => Ok((Expr::constant(value.clone()), NodeType::Scalar(None))),
            QueryNode::RangeVariable { name } => {
                let (variable, node_type) = self.lookup(name)?;
                Ok((Expr::parameter(variable), node_type))
            }
            QueryNode::Property { source, name } | QueryNode::Navigation { source, name } => {
                let from_root = self.is_root(source);
                let (source_expression, source_type) = self.bind_node(source)?;
                let (expression, node_type, _, _) =
                    self.resolve_member(source_expression, source_type, name, from_root)?;
                Ok((expression, node_type))
            }
            QueryNode::BinaryOperator {
                operator,
                left,
                right,
            } => {
                let (left, left_type) = self.bind_node(left)?;
                let (right, right_type) = self.bind_node(right)?;
                let left = self.canonical_enum(left, &right_type);
                let right = self.canonical_enum(right, &left_type);
                let lifted = operator.is_arithmetic() && self.propagates_nulls();
                let node_type = if operator.is_arithmetic() {
                    match left_type {
                        NodeType::Scalar(kind) => NodeType::Scalar(kind),
                        _ => NodeType::Scalar(None),
                    }
                } else {
                    NodeType::Scalar(Some(PrimitiveKind::Boolean))
                };
                Ok((Expr::binary(*operator, left, right, lifted), node_type))
            }
            QueryNode::UnaryOperator { operator, operand } => {
                let (operand, operand_type) = self.bind_node(operand)?;
                Ok(match operator {
                    UnaryOperatorKind::Not => (
                        Expr::not(operand),
                        NodeType::Scalar(Some(PrimitiveKind::Boolean)),
                    ),
                    UnaryOperatorKind::Negate => (
                        Expr::Negate {
                            operand: Box::new(operand),
                        },
                        operand_type,
                    ),
                })
            }
            QueryNode::FunctionCall { name, arguments } => {
                let function = BuiltinFunction::from_name(name).ok_or_else(|| {
                    AppError::NotSupported(format!("function '{name}' is not supported"))
                })?;
                let (minimum, maximum) = function.arity();
                if arguments.len() < minimum || arguments.len() > maximum {
                    return Err(AppError::Internal(format!(
                        "function '{}' called with {} arguments",
                        function.as_str(),
                        arguments.len()
                    )));
                }
                let arguments = arguments
                    .iter()
                    .map(|argument| self.bind(argument))
                    .collect::<AppResult<Vec<_>>>()?;
                Ok((
                    Expr::Call {
                        function,
                        arguments,
                    },
                    function_type(function),
                ))
            }
            QueryNode::Any {
                source,
                variable,
                body,
            } => {
                let (source, source_type) = self.bind_node(source)?;
                let element = source_type.element("any")?;
                let body = match body {
                    Some(body) => Some(Box::new(self.bind_lambda(variable, element, body)?)),
                    None => None,
                };
                Ok((
                    Expr::Any {
                        source: Box::new(source),
                        variable: variable.clone(),
                        body,
                    },
                    NodeType::Scalar(Some(PrimitiveKind::Boolean)),
                ))
            }
            QueryNode::All {
                source,
                variable,
                body,
            } => {
                let (source, source_type) = self.bind_node(source)?;
                let element = source_type.element("all")?;
                let body = self.bind_lambda(variable, element, body)?;
                Ok((
                    Expr::All {
                        source: Box::new(source),
                        variable: variable.clone(),
                        body: Box::new(body),
                    },
                    NodeType::Scalar(Some(PrimitiveKind::Boolean)),
                ))
            }
            QueryNode::In { item, collection } => {
                let (item, item_type) = self.bind_node(item)?;
                let (collection, _) = self.bind_node(collection)?;
                let collection = self.canonical_enum(collection, &item_type);
                Ok((
                    Expr::In {
                        item: Box::new(item),
                        collection: Box::new(collection),
                    },
                    NodeType::Scalar(Some(PrimitiveKind::Boolean)),
                ))
            }
            QueryNode::Count { source } => {
                let (source, source_type) = self.bind_node(source)?;
                source_type.element("$count")?;
                Ok((
                    Expr::CollectionCount {
                        source: Box::new(source),
                    },
                    NodeType::Scalar(Some(PrimitiveKind::Int64)),
                ))
            }
            QueryNode::SearchTerm { text } => Err(AppError::Internal(format!(
                "search term '{text}' outside of $search"
            ))),
        }
    }
}
