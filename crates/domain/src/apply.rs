use serde::{Deserialize, Serialize};

use crate::clause::{ComputeClause, FilterClause, QueryNode};

/// Aggregation method applied to a property expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// `with sum`
    Sum,
    /// `with min`
    Min,
    /// `with max`
    Max,
    /// `with average`
    Average,
    /// `with countdistinct`
    CountDistinct,
    /// Method provided by an external vocabulary.
    Custom(String),
}

impl AggregationMethod {
    /// Returns the wire token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Average => "average",
            Self::CountDistinct => "countdistinct",
            Self::Custom(name) => name.as_str(),
        }
    }
}

/// What an aggregate expression computes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateExpressionKind {
    /// `expression with method`.
    Property {
        /// Aggregated value.
        expression: QueryNode,
        /// Aggregation method.
        method: AggregationMethod,
    },
    /// `$count`.
    Count,
    /// `Navigation(aggregate(...))` over a collection navigation.
    Entity {
        /// Collection navigation property name.
        navigation: String,
        /// Aggregates evaluated against the navigation target.
        children: Vec<AggregateExpression>,
    },
}

/// One `... as alias` aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpression {
    /// Name the aggregated value is exposed under.
    pub alias: String,
    /// Aggregate body.
    #[serde(flatten)]
    pub kind: AggregateExpressionKind,
}

impl AggregateExpression {
    /// Creates `property with method as alias` on `$it`.
    #[must_use]
    pub fn property(property: &str, method: AggregationMethod, alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            kind: AggregateExpressionKind::Property {
                expression: QueryNode::property_of_it(property),
                method,
            },
        }
    }

    /// Creates `$count as alias`.
    #[must_use]
    pub fn count(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            kind: AggregateExpressionKind::Count,
        }
    }
}

/// One grouping property, possibly reaching into a navigation or complex value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupByPropertyNode {
    /// Property name on the current level.
    pub name: String,
    /// Nested grouping properties below this one.
    #[serde(default)]
    pub children: Vec<GroupByPropertyNode>,
}

impl GroupByPropertyNode {
    /// Creates a leaf grouping property.
    #[must_use]
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Creates a grouping property with nested children.
    #[must_use]
    pub fn nested(name: impl Into<String>, children: Vec<GroupByPropertyNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    /// Returns whether this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// One stage of an `$apply` pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transformation", rename_all = "snake_case")]
pub enum TransformationNode {
    /// `aggregate(...)`.
    Aggregate {
        /// Aggregates producing one row.
        expressions: Vec<AggregateExpression>,
    },
    /// `groupby((...), aggregate(...))`.
    GroupBy {
        /// Grouping properties.
        properties: Vec<GroupByPropertyNode>,
        /// Per-group aggregates.
        #[serde(default)]
        aggregate: Option<Vec<AggregateExpression>>,
    },
    /// `filter(...)`.
    Filter {
        /// Predicate over the current shape.
        clause: FilterClause,
    },
    /// `compute(...)`.
    Compute {
        /// Computed values over the current shape.
        clause: ComputeClause,
    },
}

impl TransformationNode {
    /// Returns the transformation name used in messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aggregate { .. } => "aggregate",
            Self::GroupBy { .. } => "groupby",
            Self::Filter { .. } => "filter",
            Self::Compute { .. } => "compute",
        }
    }
}

/// Parsed `$apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyClause {
    /// Stages in the order they must run.
    pub transformations: Vec<TransformationNode>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AggregateExpressionKind, AggregationMethod, ApplyClause, TransformationNode};

    #[test]
    fn apply_clause_deserializes_pipeline_in_order() {
        let clause: ApplyClause = serde_json::from_value(json!({
            "transformations": [
                {
                    "transformation": "group_by",
                    "properties": [{ "name": "Category" }],
                    "aggregate": [{
                        "alias": "Total",
                        "kind": "property",
                        "expression": {
                            "node": "property",
                            "source": { "node": "range_variable", "name": "$it" },
                            "name": "Price"
                        },
                        "method": "sum"
                    }]
                },
                {
                    "transformation": "filter",
                    "clause": {
                        "expression": { "node": "constant", "value": true }
                    }
                }
            ]
        }))
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(clause.transformations.len(), 2);
        assert_eq!(clause.transformations[0].name(), "groupby");
        assert_eq!(clause.transformations[1].name(), "filter");

        let TransformationNode::GroupBy { aggregate, .. } = &clause.transformations[0] else {
            unreachable!()
        };
        let aggregate = aggregate.as_deref().unwrap_or_default();
        assert!(matches!(
            &aggregate[0].kind,
            AggregateExpressionKind::Property {
                method: AggregationMethod::Sum,
                ..
            }
        ));
    }

    #[test]
    fn custom_method_keeps_its_name() {
        let method: AggregationMethod =
            serde_json::from_value(json!({ "custom": "median" })).unwrap_or_else(|_| unreachable!());

        assert_eq!(method.as_str(), "median");
    }
}
