//! Parsed query clauses handed over by the external parser.
//!
//! Nodes are already resolved against the model by name but carry no type
//! information; binders and validators look types up in the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the implicit range variable.
pub const IT: &str = "$it";

/// Alias of the implicit range variable.
pub const THIS: &str = "$this";

/// Binary operators in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperatorKind {
    /// `or`
    Or,
    /// `and`
    And,
    /// `eq`
    Equal,
    /// `ne`
    NotEqual,
    /// `gt`
    GreaterThan,
    /// `ge`
    GreaterThanOrEqual,
    /// `lt`
    LessThan,
    /// `le`
    LessThanOrEqual,
    /// `add`
    Add,
    /// `sub`
    Subtract,
    /// `mul`
    Multiply,
    /// `div`
    Divide,
    /// `mod`
    Modulo,
    /// `has`
    Has,
}

impl BinaryOperatorKind {
    /// Returns the wire token.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "ge",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "le",
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Modulo => "mod",
            Self::Has => "has",
        }
    }

    /// Returns whether the operator is arithmetic.
    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo
        )
    }

    /// Returns whether the operator is `and`/`or`.
    #[must_use]
    pub fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// Unary operators in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperatorKind {
    /// `not`
    Not,
    /// `-`
    Negate,
}

impl UnaryOperatorKind {
    /// Returns the wire token.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::Negate => "-",
        }
    }
}

/// One node of a parsed expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum QueryNode {
    /// Literal value.
    Constant {
        /// JSON literal, `null` included.
        value: Value,
    },
    /// Reference to `$it`, `$this` or a lambda variable.
    RangeVariable {
        /// Variable name.
        name: String,
    },
    /// Access to a primitive, enum, complex or computed property.
    Property {
        /// Instance the property is read from.
        source: Box<QueryNode>,
        /// Property name.
        name: String,
    },
    /// Access to a navigation property.
    Navigation {
        /// Instance the navigation starts from.
        source: Box<QueryNode>,
        /// Navigation property name.
        name: String,
    },
    /// Binary operator application.
    BinaryOperator {
        /// Operator.
        operator: BinaryOperatorKind,
        /// Left operand.
        left: Box<QueryNode>,
        /// Right operand.
        right: Box<QueryNode>,
    },
    /// Unary operator application.
    UnaryOperator {
        /// Operator.
        operator: UnaryOperatorKind,
        /// Operand.
        operand: Box<QueryNode>,
    },
    /// Built-in function call.
    FunctionCall {
        /// Function name.
        name: String,
        /// Arguments in call order.
        #[serde(default)]
        arguments: Vec<QueryNode>,
    },
    /// `source/any(variable: body)`; a missing body tests for non-emptiness.
    Any {
        /// Collection being tested.
        source: Box<QueryNode>,
        /// Lambda variable name.
        variable: String,
        /// Lambda predicate.
        #[serde(default)]
        body: Option<Box<QueryNode>>,
    },
    /// `source/all(variable: body)`.
    All {
        /// Collection being tested.
        source: Box<QueryNode>,
        /// Lambda variable name.
        variable: String,
        /// Lambda predicate.
        body: Box<QueryNode>,
    },
    /// `item in collection`.
    In {
        /// Tested value.
        item: Box<QueryNode>,
        /// Candidate values.
        collection: Box<QueryNode>,
    },
    /// `source/$count`.
    Count {
        /// Counted collection.
        source: Box<QueryNode>,
    },
    /// Free-text `$search` term.
    SearchTerm {
        /// Term text.
        text: String,
    },
}

impl QueryNode {
    /// Returns a reference to `$it`.
    #[must_use]
    pub fn it() -> Self {
        Self::range_variable(IT)
    }

    /// Returns a reference to a named range variable.
    #[must_use]
    pub fn range_variable(name: impl Into<String>) -> Self {
        Self::RangeVariable { name: name.into() }
    }

    /// Returns a literal node.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self::Constant { value }
    }

    /// Returns `$it/<name>`.
    #[must_use]
    pub fn property_of_it(name: impl Into<String>) -> Self {
        Self::it().property(name)
    }

    /// Returns `self/<name>` for a non-navigation property.
    #[must_use]
    pub fn property(self, name: impl Into<String>) -> Self {
        Self::Property {
            source: Box::new(self),
            name: name.into(),
        }
    }

    /// Returns `self/<name>` for a navigation property.
    #[must_use]
    pub fn navigation(self, name: impl Into<String>) -> Self {
        Self::Navigation {
            source: Box::new(self),
            name: name.into(),
        }
    }

    /// Returns `self <operator> right`.
    #[must_use]
    pub fn binary(self, operator: BinaryOperatorKind, right: QueryNode) -> Self {
        Self::BinaryOperator {
            operator,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    /// Returns `self eq value`.
    #[must_use]
    pub fn equals(self, value: Value) -> Self {
        self.binary(BinaryOperatorKind::Equal, Self::constant(value))
    }

    /// Returns `self and right`.
    #[must_use]
    pub fn and(self, right: QueryNode) -> Self {
        self.binary(BinaryOperatorKind::And, right)
    }

    /// Returns `self or right`.
    #[must_use]
    pub fn or(self, right: QueryNode) -> Self {
        self.binary(BinaryOperatorKind::Or, right)
    }

    /// Returns `not self`.
    #[must_use]
    pub fn not(self) -> Self {
        Self::UnaryOperator {
            operator: UnaryOperatorKind::Not,
            operand: Box::new(self),
        }
    }

    /// Returns a function call node.
    #[must_use]
    pub fn call(name: impl Into<String>, arguments: Vec<QueryNode>) -> Self {
        Self::FunctionCall {
            name: name.into(),
            arguments,
        }
    }

    /// Returns a search term node.
    #[must_use]
    pub fn search_term(text: impl Into<String>) -> Self {
        Self::SearchTerm { text: text.into() }
    }

    /// Returns the child nodes in evaluation order.
    #[must_use]
    pub fn children(&self) -> Vec<&QueryNode> {
        match self {
            Self::Constant { .. } | Self::RangeVariable { .. } | Self::SearchTerm { .. } => {
                Vec::new()
            }
            Self::Property { source, .. }
            | Self::Navigation { source, .. }
            | Self::Count { source } => vec![source.as_ref()],
            Self::BinaryOperator { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::UnaryOperator { operand, .. } => vec![operand.as_ref()],
            Self::FunctionCall { arguments, .. } => arguments.iter().collect(),
            Self::Any { source, body, .. } => {
                let mut children = vec![source.as_ref()];
                if let Some(body) = body {
                    children.push(body.as_ref());
                }
                children
            }
            Self::All { source, body, .. } => vec![source.as_ref(), body.as_ref()],
            Self::In { item, collection } => vec![item.as_ref(), collection.as_ref()],
        }
    }

    /// Returns the total number of nodes in this tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(QueryNode::node_count)
            .sum::<usize>()
    }
}

fn default_range_variable() -> String {
    IT.to_owned()
}

/// Parsed `$filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    /// Boolean predicate.
    pub expression: QueryNode,
    /// Name of the range variable the predicate refers to.
    #[serde(default = "default_range_variable")]
    pub range_variable: String,
}

impl FilterClause {
    /// Creates a filter over `$it`.
    #[must_use]
    pub fn new(expression: QueryNode) -> Self {
        Self {
            expression,
            range_variable: default_range_variable(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderByDirection {
    /// Ascending.
    #[default]
    Ascending,
    /// Descending.
    Descending,
}

/// One `$orderby` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    /// Key expression.
    pub expression: QueryNode,
    /// Sort direction.
    #[serde(default)]
    pub direction: OrderByDirection,
}

/// Parsed `$orderby`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByClause {
    /// Keys from most to least significant.
    pub items: Vec<OrderByItem>,
    /// Name of the range variable the keys refer to.
    #[serde(default = "default_range_variable")]
    pub range_variable: String,
}

impl OrderByClause {
    /// Creates an order-by over `$it`.
    #[must_use]
    pub fn new(items: Vec<OrderByItem>) -> Self {
        Self {
            items,
            range_variable: default_range_variable(),
        }
    }

    /// Creates an order-by from `(property, direction)` pairs on `$it`.
    #[must_use]
    pub fn by_properties(keys: &[(&str, OrderByDirection)]) -> Self {
        Self::new(
            keys.iter()
                .map(|(name, direction)| OrderByItem {
                    expression: QueryNode::property_of_it(*name),
                    direction: *direction,
                })
                .collect(),
        )
    }
}

/// Parsed `$search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchClause {
    /// Terms combined with `and`/`or`/`not`.
    pub expression: QueryNode,
}

/// One `$compute` item: `expression as alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeExpression {
    /// Computed value.
    pub expression: QueryNode,
    /// Name the value is exposed under.
    pub alias: String,
}

/// Parsed `$compute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeClause {
    /// Computed items in declaration order.
    pub items: Vec<ComputeExpression>,
}
