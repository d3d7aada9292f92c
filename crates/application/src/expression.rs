//! Backend-neutral expression trees produced by the binders.

use std::fmt::{Display, Formatter};

use querylens_domain::BinaryOperatorKind;
use serde::Serialize;
use serde_json::Value;

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinFunction {
    /// `contains(text, fragment)`
    Contains,
    /// `startswith(text, prefix)`
    StartsWith,
    /// `endswith(text, suffix)`
    EndsWith,
    /// `length(text)`
    Length,
    /// `indexof(text, fragment)`
    IndexOf,
    /// `substring(text, start[, length])`
    Substring,
    /// `tolower(text)`
    ToLower,
    /// `toupper(text)`
    ToUpper,
    /// `trim(text)`
    Trim,
    /// `concat(left, right)`
    Concat,
    /// `year(temporal)`
    Year,
    /// `month(temporal)`
    Month,
    /// `day(temporal)`
    Day,
    /// `hour(temporal)`
    Hour,
    /// `minute(temporal)`
    Minute,
    /// `second(temporal)`
    Second,
    /// `date(timestamp)`
    Date,
    /// `now()`
    Now,
    /// `round(number)`
    Round,
    /// `floor(number)`
    Floor,
    /// `ceiling(number)`
    Ceiling,
}

impl BuiltinFunction {
    const ALL: [Self; 21] = [
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::Length,
        Self::IndexOf,
        Self::Substring,
        Self::ToLower,
        Self::ToUpper,
        Self::Trim,
        Self::Concat,
        Self::Year,
        Self::Month,
        Self::Day,
        Self::Hour,
        Self::Minute,
        Self::Second,
        Self::Date,
        Self::Now,
        Self::Round,
        Self::Floor,
        Self::Ceiling,
    ];

    /// Looks a function up by its query-language name, ignoring ASCII case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|function| function.as_str().eq_ignore_ascii_case(name))
    }

    /// Returns the query-language name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Length => "length",
            Self::IndexOf => "indexof",
            Self::Substring => "substring",
            Self::ToLower => "tolower",
            Self::ToUpper => "toupper",
            Self::Trim => "trim",
            Self::Concat => "concat",
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Date => "date",
            Self::Now => "now",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceiling => "ceiling",
        }
    }

    /// Returns the accepted argument counts as an inclusive range.
    #[must_use]
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Self::Now => (0, 0),
            Self::Contains | Self::StartsWith | Self::EndsWith | Self::IndexOf | Self::Concat => {
                (2, 2)
            }
            Self::Substring => (2, 3),
            _ => (1, 1),
        }
    }
}

/// Aggregation functions the executor evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Sum of non-null numbers.
    Sum,
    /// Smallest non-null value.
    Min,
    /// Largest non-null value.
    Max,
    /// Mean of non-null numbers.
    Average,
    /// Number of distinct non-null values.
    CountDistinct,
    /// Number of elements.
    Count,
}

impl AggregateFunction {
    /// Returns the query-language name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Average => "average",
            Self::CountDistinct => "countdistinct",
            Self::Count => "$count",
        }
    }
}

/// Backend-neutral expression tree produced by the binders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    /// Literal value.
    Constant {
        /// Literal.
        value: Value,
    },
    /// Reference to a bound variable.
    Parameter {
        /// Variable name.
        name: String,
    },
    /// Property read.
    Member {
        /// Instance the property is read from.
        source: Box<Expr>,
        /// Property name.
        name: String,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        operator: BinaryOperatorKind,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
        /// Null operands produce null instead of failing.
        lifted: bool,
    },
    /// Logical negation.
    Not {
        /// Operand.
        operand: Box<Expr>,
    },
    /// Arithmetic negation.
    Negate {
        /// Operand.
        operand: Box<Expr>,
    },
    /// `test ? if_true : if_false`.
    Conditional {
        /// Condition.
        test: Box<Expr>,
        /// Value when the condition holds.
        if_true: Box<Expr>,
        /// Value otherwise.
        if_false: Box<Expr>,
    },
    /// Null test.
    IsNull {
        /// Tested value.
        operand: Box<Expr>,
    },
    /// Built-in function call.
    Call {
        /// Function.
        function: BuiltinFunction,
        /// Arguments in call order.
        arguments: Vec<Expr>,
    },
    /// Existential test over a collection.
    Any {
        /// Collection.
        source: Box<Expr>,
        /// Element variable name.
        variable: String,
        /// Predicate; `None` tests for non-emptiness.
        body: Option<Box<Expr>>,
    },
    /// Universal test over a collection.
    All {
        /// Collection.
        source: Box<Expr>,
        /// Element variable name.
        variable: String,
        /// Predicate.
        body: Box<Expr>,
    },
    /// Membership test.
    In {
        /// Tested value.
        item: Box<Expr>,
        /// Candidate collection.
        collection: Box<Expr>,
    },
    /// Number of elements of a collection.
    CollectionCount {
        /// Collection.
        source: Box<Expr>,
    },
    /// Aggregate over a collection.
    Aggregate {
        /// Collection.
        source: Box<Expr>,
        /// Element variable name.
        variable: String,
        /// Aggregation function.
        function: AggregateFunction,
        /// Aggregated value per element; `None` for counts.
        body: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Creates a literal.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self::Constant { value }
    }

    /// Creates a variable reference.
    #[must_use]
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter { name: name.into() }
    }

    /// Creates `source.name`.
    #[must_use]
    pub fn member(source: Expr, name: impl Into<String>) -> Self {
        Self::Member {
            source: Box::new(source),
            name: name.into(),
        }
    }

    /// Creates a binary operation.
    #[must_use]
    pub fn binary(operator: BinaryOperatorKind, left: Expr, right: Expr, lifted: bool) -> Self {
        Self::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            lifted,
        }
    }

    /// Creates a conditional.
    #[must_use]
    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Self::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Creates a null test.
    #[must_use]
    pub fn is_null(operand: Expr) -> Self {
        Self::IsNull {
            operand: Box::new(operand),
        }
    }

    /// Creates a logical negation.
    #[must_use]
    pub fn not(operand: Expr) -> Self {
        Self::Not {
            operand: Box::new(operand),
        }
    }

    /// Returns whether this is the literal `false`.
    #[must_use]
    pub fn is_false(&self) -> bool {
        matches!(self, Self::Constant { value: Value::Bool(false) })
    }
}

impl Display for Expr {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant { value } => write!(formatter, "{value}"),
            Self::Parameter { name } => formatter.write_str(name),
            Self::Member { source, name } => write!(formatter, "{source}.{name}"),
            Self::Binary {
                operator,
                left,
                right,
                lifted,
            } => {
                let marker = if *lifted { "?" } else { "" };
                write!(formatter, "({left} {}{marker} {right})", operator.as_str())
            }
            Self::Not { operand } => write!(formatter, "not({operand})"),
            Self::Negate { operand } => write!(formatter, "-({operand})"),
            Self::Conditional {
                test,
                if_true,
                if_false,
            } => write!(formatter, "iif({test}, {if_true}, {if_false})"),
            Self::IsNull { operand } => write!(formatter, "({operand} == null)"),
            Self::Call {
                function,
                arguments,
            } => {
                write!(formatter, "{}(", function.as_str())?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    write!(formatter, "{argument}")?;
                }
                formatter.write_str(")")
            }
            Self::Any {
                source,
                variable,
                body,
            } => match body {
                Some(body) => write!(formatter, "{source}.any({variable} => {body})"),
                None => write!(formatter, "{source}.any()"),
            },
            Self::All {
                source,
                variable,
                body,
            } => write!(formatter, "{source}.all({variable} => {body})"),
            Self::In { item, collection } => write!(formatter, "({item} in {collection})"),
            Self::CollectionCount { source } => write!(formatter, "{source}.count()"),
            Self::Aggregate {
                source,
                variable,
                function,
                body,
            } => match body {
                Some(body) => write!(
                    formatter,
                    "{source}.{}({variable} => {body})",
                    function.as_str()
                ),
                None => write!(formatter, "{source}.{}()", function.as_str()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use querylens_domain::BinaryOperatorKind;
    use serde_json::json;

    use super::{BuiltinFunction, Expr};

    #[test]
    fn display_renders_lifted_null_checks() {
        let source = Expr::member(Expr::parameter("$it"), "Address");
        let expr = Expr::binary(
            BinaryOperatorKind::Equal,
            Expr::conditional(
                Expr::is_null(source.clone()),
                Expr::constant(json!(null)),
                Expr::member(source, "City"),
            ),
            Expr::constant(json!("Oslo")),
            true,
        );

        assert_eq!(
            expr.to_string(),
            "(iif(($it.Address == null), null, $it.Address.City) eq? \"Oslo\")"
        );
    }

    #[test]
    fn functions_resolve_case_insensitively() {
        assert_eq!(
            BuiltinFunction::from_name("StartsWith"),
            Some(BuiltinFunction::StartsWith)
        );
        assert_eq!(BuiltinFunction::from_name("soundex"), None);
        assert_eq!(BuiltinFunction::Substring.arity(), (2, 3));
    }
}
