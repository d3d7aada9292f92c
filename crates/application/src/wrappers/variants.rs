use std::sync::OnceLock;

use querylens_core::AppResult;
use serde_json::{Map, Value};

use super::container::PropertyContainer;
use super::mapper::{PropertyMapper, mapped_name};
use super::{DynamicWrapper, Row};

fn chain_value(container: Option<&PropertyContainer>, name: &str) -> Option<Value> {
    container
        .and_then(|container| container.get(name))
        .map(|node| node.value().to_value())
}

fn chain_map(container: Option<&PropertyContainer>) -> Map<String, Value> {
    container
        .map(PropertyContainer::to_value_map)
        .unwrap_or_default()
}

fn chain_dictionary(
    container: Option<&PropertyContainer>,
    mapper: &dyn PropertyMapper,
    include_auto_selected: bool,
) -> AppResult<Map<String, Value>> {
    container
        .map(|container| container.to_dictionary(mapper, include_auto_selected))
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Select/expand projection of one row.
///
/// When everything is selected the wrapper keeps the instance and fills
/// structural properties from it the first time its values are read.
#[derive(Debug, Clone)]
pub struct SelectExpandWrapper {
    type_name: Option<String>,
    instance: Option<Box<Row>>,
    structural: Vec<String>,
    container: Option<PropertyContainer>,
    values: OnceLock<Map<String, Value>>,
}

impl SelectExpandWrapper {
    /// Creates a wrapper selecting only the container entries.
    #[must_use]
    pub fn select_some(type_name: Option<String>, container: Option<PropertyContainer>) -> Self {
        Self {
            type_name,
            instance: None,
            structural: Vec::new(),
            container,
            values: OnceLock::new(),
        }
    }

    /// Creates a wrapper selecting every structural property of `instance`.
    #[must_use]
    pub fn select_all(
        type_name: Option<String>,
        instance: Row,
        structural: Vec<String>,
        container: Option<PropertyContainer>,
    ) -> Self {
        Self {
            type_name,
            instance: Some(Box::new(instance)),
            structural,
            container,
            values: OnceLock::new(),
        }
    }

    /// Returns the structured type of the wrapped row.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Returns whether every structural property is selected.
    #[must_use]
    pub fn is_select_all(&self) -> bool {
        self.instance.is_some()
    }

    /// Returns the container chain.
    #[must_use]
    pub fn container(&self) -> Option<&PropertyContainer> {
        self.container.as_ref()
    }

    /// Materializes structural properties of the instance, once.
    ///
    /// Container entries take precedence over instance values.
    pub fn ensure_values(&self) -> &Map<String, Value> {
        self.values.get_or_init(|| {
            let mut values = Map::new();
            if let Some(instance) = &self.instance {
                for name in &self.structural {
                    let value = chain_value(self.container.as_ref(), name)
                        .or_else(|| instance.property(name));
                    if let Some(value) = value {
                        values.insert(name.clone(), value);
                    }
                }
            }

            for (name, value) in chain_map(self.container.as_ref()) {
                if !values.contains_key(name.as_str()) {
                    values.insert(name, value);
                }
            }

            values
        })
    }
}

impl DynamicWrapper for SelectExpandWrapper {
    fn try_get_property_value(&self, name: &str) -> Option<Value> {
        self.ensure_values().get(name).cloned()
    }

    fn values(&self) -> &Map<String, Value> {
        self.ensure_values()
    }

    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        let mut dictionary = Map::new();
        for (name, value) in self.ensure_values() {
            let selected_by_wildcard =
                self.is_select_all() && self.structural.iter().any(|property| property == name);
            let node = self
                .container
                .as_ref()
                .and_then(|container| container.get(name));

            let value = match node {
                Some(node) => {
                    if node.is_auto_selected() && !include_auto_selected && !selected_by_wildcard {
                        continue;
                    }
                    node.mapped_entry(mapper, include_auto_selected)?
                }
                None => value.clone(),
            };
            let Some(mapped) = mapped_name(mapper, name)? else {
                continue;
            };

            dictionary.insert(mapped, value);
        }

        Ok(dictionary)
    }
}

/// Group produced by `groupby` without aggregation.
#[derive(Debug, Clone)]
pub struct GroupByWrapper {
    group_by: Option<PropertyContainer>,
    values: OnceLock<Map<String, Value>>,
}

impl GroupByWrapper {
    /// Creates a group from its key chain.
    #[must_use]
    pub fn new(group_by: Option<PropertyContainer>) -> Self {
        Self {
            group_by,
            values: OnceLock::new(),
        }
    }

    /// Returns the key chain.
    #[must_use]
    pub fn group_by(&self) -> Option<&PropertyContainer> {
        self.group_by.as_ref()
    }
}

impl DynamicWrapper for GroupByWrapper {
    fn try_get_property_value(&self, name: &str) -> Option<Value> {
        chain_value(self.group_by.as_ref(), name)
    }

    fn values(&self) -> &Map<String, Value> {
        self.values
            .get_or_init(|| chain_map(self.group_by.as_ref()))
    }

    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        chain_dictionary(self.group_by.as_ref(), mapper, include_auto_selected)
    }
}

/// Group produced by `groupby` with per-group aggregates.
#[derive(Debug, Clone)]
pub struct AggregationWrapper {
    group_by: Option<PropertyContainer>,
    container: Option<PropertyContainer>,
    values: OnceLock<Map<String, Value>>,
}

impl AggregationWrapper {
    /// Creates a group from its key chain and aggregate chain.
    #[must_use]
    pub fn new(group_by: Option<PropertyContainer>, container: Option<PropertyContainer>) -> Self {
        Self {
            group_by,
            container,
            values: OnceLock::new(),
        }
    }
}

impl DynamicWrapper for AggregationWrapper {
    fn try_get_property_value(&self, name: &str) -> Option<Value> {
        chain_value(self.group_by.as_ref(), name)
            .or_else(|| chain_value(self.container.as_ref(), name))
    }

    fn values(&self) -> &Map<String, Value> {
        self.values.get_or_init(|| {
            let mut values = chain_map(self.group_by.as_ref());
            values.extend(chain_map(self.container.as_ref()));
            values
        })
    }

    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        let mut dictionary =
            chain_dictionary(self.group_by.as_ref(), mapper, include_auto_selected)?;
        dictionary.extend(chain_dictionary(
            self.container.as_ref(),
            mapper,
            include_auto_selected,
        )?);
        Ok(dictionary)
    }
}

/// Single row produced by `aggregate` without grouping.
#[derive(Debug, Clone)]
pub struct NoGroupByAggregationWrapper {
    container: Option<PropertyContainer>,
    values: OnceLock<Map<String, Value>>,
}

impl NoGroupByAggregationWrapper {
    /// Creates the row from its aggregate chain.
    #[must_use]
    pub fn new(container: Option<PropertyContainer>) -> Self {
        Self {
            container,
            values: OnceLock::new(),
        }
    }
}

impl DynamicWrapper for NoGroupByAggregationWrapper {
    fn try_get_property_value(&self, name: &str) -> Option<Value> {
        chain_value(self.container.as_ref(), name)
    }

    fn values(&self) -> &Map<String, Value> {
        self.values
            .get_or_init(|| chain_map(self.container.as_ref()))
    }

    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        chain_dictionary(self.container.as_ref(), mapper, include_auto_selected)
    }
}

/// Row extended with values read across navigation properties.
///
/// Flattened values are auto-selected and only feed later stages.
#[derive(Debug, Clone)]
pub struct FlatteningWrapper {
    source: Box<Row>,
    container: Option<PropertyContainer>,
    values: OnceLock<Map<String, Value>>,
}

impl FlatteningWrapper {
    /// Creates the wrapper over a source row.
    #[must_use]
    pub fn new(source: Row, container: Option<PropertyContainer>) -> Self {
        Self {
            source: Box::new(source),
            container,
            values: OnceLock::new(),
        }
    }

    /// Returns the wrapped source row.
    #[must_use]
    pub fn source(&self) -> &Row {
        self.source.as_ref()
    }
}

impl DynamicWrapper for FlatteningWrapper {
    fn try_get_property_value(&self, name: &str) -> Option<Value> {
        chain_value(self.container.as_ref(), name).or_else(|| self.source.property(name))
    }

    fn values(&self) -> &Map<String, Value> {
        self.values.get_or_init(|| {
            let mut values = self.source.values().clone();
            values.extend(chain_map(self.container.as_ref()));
            values
        })
    }

    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        let mut dictionary = self.source.to_dictionary(mapper, include_auto_selected)?;
        dictionary.extend(chain_dictionary(
            self.container.as_ref(),
            mapper,
            include_auto_selected,
        )?);
        Ok(dictionary)
    }
}

/// Row extended with computed values.
#[derive(Debug, Clone)]
pub struct ComputeWrapper {
    instance: Box<Row>,
    container: Option<PropertyContainer>,
    values: OnceLock<Map<String, Value>>,
}

impl ComputeWrapper {
    /// Creates the wrapper over an instance row.
    #[must_use]
    pub fn new(instance: Row, container: Option<PropertyContainer>) -> Self {
        Self {
            instance: Box::new(instance),
            container,
            values: OnceLock::new(),
        }
    }

    /// Returns the wrapped instance row.
    #[must_use]
    pub fn instance(&self) -> &Row {
        self.instance.as_ref()
    }
}

impl DynamicWrapper for ComputeWrapper {
    fn try_get_property_value(&self, name: &str) -> Option<Value> {
        chain_value(self.container.as_ref(), name).or_else(|| self.instance.property(name))
    }

    fn values(&self) -> &Map<String, Value> {
        self.values.get_or_init(|| {
            let mut values = self.instance.values().clone();
            values.extend(chain_map(self.container.as_ref()));
            values
        })
    }

    fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        let mut dictionary = self.instance.to_dictionary(mapper, include_auto_selected)?;
        dictionary.extend(chain_dictionary(
            self.container.as_ref(),
            mapper,
            include_auto_selected,
        )?);
        Ok(dictionary)
    }
}
