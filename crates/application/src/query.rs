//! Operator pipelines the binders build and executors run.

use std::fmt::{Display, Formatter};

use querylens_core::AppResult;
use serde::Serialize;

use crate::expression::{AggregateFunction, Expr};
use crate::wrappers::Row;

/// One sort key of an ordering operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortKey {
    /// Key selector over the operator variable.
    pub expression: Expr,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

/// One grouping key; `path` places the value in the nested group container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupKey {
    /// Property path of the key, outermost first.
    pub path: Vec<String>,
    /// Key selector over the operator variable.
    pub expression: Expr,
}

/// What an aggregate computes over a set of elements.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateKind {
    /// Aggregation function over a per-element value.
    Property {
        /// Per-element value.
        expression: Expr,
        /// Aggregation function.
        function: AggregateFunction,
    },
    /// Number of elements.
    Count,
    /// Nested aggregates over the union of a collection navigation.
    Entity {
        /// Collection read from each element.
        navigation: Expr,
        /// Variable the children bind each navigation target to.
        variable: String,
        /// Aggregates over the navigation targets.
        children: Vec<AggregateSpec>,
    },
}

/// One named aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSpec {
    /// Output name.
    pub alias: String,
    /// Aggregate body.
    pub kind: AggregateKind,
}

/// One named computed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedValue {
    /// Output name.
    pub alias: String,
    /// Value over the operator variable.
    pub expression: Expr,
}

/// One selected property of a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedProperty {
    /// Output name.
    pub name: String,
    /// Value over the projection variable.
    pub expression: Expr,
    /// Selected only to support something else, hidden from output by default.
    pub auto_selected: bool,
}

/// One expanded navigation of a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedExpansion {
    /// Output name.
    pub name: String,
    /// Navigation value over the projection variable.
    pub source: Expr,
    /// Whether the navigation is a collection.
    pub is_collection: bool,
    /// Predicate over the nested projection variable.
    pub filter: Option<Expr>,
    /// Ordering over the nested projection variable.
    pub order_by: Vec<SortKey>,
    /// Number of nested elements to skip.
    pub skip: Option<usize>,
    /// Number of nested elements to keep.
    pub top: Option<usize>,
    /// Emit `<name>@odata.count` with the filtered element count.
    pub count: bool,
    /// Shape of each nested element.
    pub projection: Projection,
}

/// Result shape of a select/expand projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    /// Variable the row is bound to.
    pub variable: String,
    /// Structured type of the projected rows, `None` for dynamic rows.
    pub type_name: Option<String>,
    /// Every structural property is selected.
    pub select_all: bool,
    /// Structural properties filled from the instance when everything is selected.
    pub structural: Vec<String>,
    /// Explicitly or automatically selected properties.
    pub properties: Vec<ProjectedProperty>,
    /// Expanded navigations.
    pub expansions: Vec<ProjectedExpansion>,
}

/// One composable stage of a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum QueryOperator {
    /// Keep rows whose predicate is `true`.
    Where {
        /// Variable the row is bound to.
        variable: String,
        /// Predicate.
        predicate: Expr,
    },
    /// Stable sort by keys.
    OrderBy {
        /// Variable the row is bound to.
        variable: String,
        /// Keys from most to least significant.
        keys: Vec<SortKey>,
    },
    /// Drop leading rows.
    Skip {
        /// Rows to drop.
        count: usize,
    },
    /// Keep leading rows.
    Take {
        /// Rows to keep.
        count: usize,
    },
    /// Wrap rows with computed values.
    Compute {
        /// Variable the row is bound to.
        variable: String,
        /// Values in declaration order.
        values: Vec<ComputedValue>,
    },
    /// Wrap rows with values read across navigations.
    Flatten {
        /// Variable the row is bound to.
        variable: String,
        /// Flattened values under generated names.
        values: Vec<ComputedValue>,
    },
    /// Group rows, optionally aggregating each group.
    GroupBy {
        /// Variable the row is bound to.
        variable: String,
        /// Grouping keys.
        keys: Vec<GroupKey>,
        /// Per-group aggregates.
        aggregates: Option<Vec<AggregateSpec>>,
    },
    /// Aggregate all rows into one.
    Aggregate {
        /// Variable the row is bound to.
        variable: String,
        /// Aggregates.
        aggregates: Vec<AggregateSpec>,
    },
    /// Shape rows for output.
    Project {
        /// Projection.
        projection: Projection,
    },
}

impl QueryOperator {
    /// Returns the operator name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Where { .. } => "where",
            Self::OrderBy { .. } => "order_by",
            Self::Skip { .. } => "skip",
            Self::Take { .. } => "take",
            Self::Compute { .. } => "compute",
            Self::Flatten { .. } => "flatten",
            Self::GroupBy { .. } => "group_by",
            Self::Aggregate { .. } => "aggregate",
            Self::Project { .. } => "project",
        }
    }
}

/// An ordered operator pipeline attachable to any row source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Query {
    operators: Vec<QueryOperator>,
}

impl Query {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pipeline with one more operator.
    #[must_use]
    pub fn then(mut self, operator: QueryOperator) -> Self {
        self.operators.push(operator);
        self
    }

    /// Returns the pipeline with every operator of `other` appended.
    #[must_use]
    pub fn chain(mut self, other: Query) -> Self {
        self.operators.extend(other.operators);
        self
    }

    /// Returns operators in execution order.
    #[must_use]
    pub fn operators(&self) -> &[QueryOperator] {
        &self.operators
    }

    /// Returns whether the pipeline has no operators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl Display for Query {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("source")?;
        for operator in &self.operators {
            write!(formatter, " | {}", operator.name())?;
        }

        Ok(())
    }
}

/// Runs query pipelines against a row source.
pub trait QueryExecutor: Send + Sync {
    /// Executes every operator in order and returns the resulting rows.
    fn execute(&self, query: &Query, source: Vec<Row>) -> AppResult<Vec<Row>>;
}
