//! Per-request result shapes built on property container chains.

use std::sync::OnceLock;

use querylens_core::AppResult;
use serde_json::{Map, Value};

mod container;
mod mapper;
#[cfg(test)]
mod tests;
mod variants;

pub use container::{ContainerValue, NamedValue, PropertyContainer};
pub use mapper::{IdentityPropertyMapper, PropertyMapper};
pub use variants::{
    AggregationWrapper, ComputeWrapper, FlatteningWrapper, GroupByWrapper,
    NoGroupByAggregationWrapper, SelectExpandWrapper,
};

use self::mapper::mapped_name;

/// Named-value view shared by every result shape.
pub trait DynamicWrapper {
    /// Returns the value of a property, if the shape has it.
    fn try_get_property_value(&self, name: &str) -> Option<Value>;

    /// Returns every value under model names, auto-selected entries included.
    fn values(&self) -> &Map<String, Value>;

    /// Returns the ordered output mapping.
    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>>;
}

/// Closed set of result shapes.
#[derive(Debug, Clone)]
pub enum ResultWrapper {
    /// Select/expand projection.
    SelectExpand(SelectExpandWrapper),
    /// Group without aggregates.
    GroupBy(GroupByWrapper),
    /// Group with aggregates.
    Aggregation(AggregationWrapper),
    /// Aggregates over the whole input.
    NoGroupByAggregation(NoGroupByAggregationWrapper),
    /// Row with flattened navigation values.
    Flattening(FlatteningWrapper),
    /// Row with computed values.
    Compute(ComputeWrapper),
}

impl ResultWrapper {
    fn inner(&self) -> &dyn DynamicWrapper {
        match self {
            Self::SelectExpand(wrapper) => wrapper,
            Self::GroupBy(wrapper) => wrapper,
            Self::Aggregation(wrapper) => wrapper,
            Self::NoGroupByAggregation(wrapper) => wrapper,
            Self::Flattening(wrapper) => wrapper,
            Self::Compute(wrapper) => wrapper,
        }
    }
}

impl DynamicWrapper for ResultWrapper {
    fn try_get_property_value(&self, name: &str) -> Option<Value> {
        self.inner().try_get_property_value(name)
    }

    fn values(&self) -> &Map<String, Value> {
        self.inner().values()
    }

    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        self.inner().to_dictionary(mapper, include_auto_selected)
    }
}

/// One element flowing through a query pipeline.
#[derive(Debug, Clone)]
pub enum Row {
    /// Source record as stored.
    Instance(Value),
    /// Record reshaped by an earlier stage.
    Wrapper(ResultWrapper),
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: OnceLock<Map<String, Value>> = OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

impl Row {
    /// Returns the value of a property, if present.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        match self {
            Self::Instance(Value::Object(map)) => map.get(name).cloned(),
            Self::Instance(_) => None,
            Self::Wrapper(wrapper) => wrapper.try_get_property_value(name),
        }
    }

    /// Returns every value under model names.
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        match self {
            Self::Instance(Value::Object(map)) => map,
            Self::Instance(_) => empty_map(),
            Self::Wrapper(wrapper) => wrapper.values(),
        }
    }

    /// Converts the row to a JSON object using model names.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Instance(value) => value.clone(),
            Self::Wrapper(wrapper) => Value::Object(wrapper.values().clone()),
        }
    }

    /// Returns the ordered output mapping.
    pub fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        match self {
            Self::Instance(_) => {
                let mut dictionary = Map::new();
                for (name, value) in self.values() {
                    if let Some(mapped) = mapped_name(mapper, name)? {
                        dictionary.insert(mapped, value.clone());
                    }
                }
                Ok(dictionary)
            }
            Self::Wrapper(wrapper) => wrapper.to_dictionary(mapper, include_auto_selected),
        }
    }

    /// Returns the wrapper, if the row was reshaped.
    #[must_use]
    pub fn as_wrapper(&self) -> Option<&ResultWrapper> {
        match self {
            Self::Wrapper(wrapper) => Some(wrapper),
            Self::Instance(_) => None,
        }
    }
}

impl From<ResultWrapper> for Row {
    fn from(wrapper: ResultWrapper) -> Self {
        Self::Wrapper(wrapper)
    }
}
