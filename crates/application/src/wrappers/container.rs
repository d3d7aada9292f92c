use querylens_core::AppResult;
use serde_json::{Map, Value};

use super::mapper::{PropertyMapper, mapped_name};
use super::{DynamicWrapper, ResultWrapper};

/// Value held by one container node.
#[derive(Debug, Clone)]
pub enum ContainerValue {
    /// Plain JSON value.
    Leaf(Value),
    /// Nested chain, e.g. a group key reaching into a complex value.
    Nested(Box<PropertyContainer>),
    /// One expanded related row.
    Wrapped(Box<ResultWrapper>),
    /// Expanded related rows.
    WrappedCollection(Vec<ResultWrapper>),
}

impl ContainerValue {
    /// Converts the value to JSON using model names.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Leaf(value) => value.clone(),
            Self::Nested(container) => Value::Object(container.to_value_map()),
            Self::Wrapped(wrapper) => Value::Object(wrapper.values().clone()),
            Self::WrappedCollection(wrappers) => Value::Array(
                wrappers
                    .iter()
                    .map(|wrapper| Value::Object(wrapper.values().clone()))
                    .collect(),
            ),
        }
    }

    fn to_mapped_value(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Value> {
        match self {
            Self::Leaf(value) => Ok(value.clone()),
            Self::Nested(container) => container
                .to_dictionary(mapper, include_auto_selected)
                .map(Value::Object),
            Self::Wrapped(wrapper) => wrapper
                .to_dictionary(mapper, include_auto_selected)
                .map(Value::Object),
            Self::WrappedCollection(wrappers) => wrappers
                .iter()
                .map(|wrapper| {
                    wrapper
                        .to_dictionary(mapper, include_auto_selected)
                        .map(Value::Object)
                })
                .collect::<AppResult<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

/// Input entry for building a container chain.
#[derive(Debug, Clone)]
pub struct NamedValue {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: ContainerValue,
    /// Whether the entry was added only to support another selection.
    pub auto_selected: bool,
}

impl NamedValue {
    /// Creates an explicitly selected entry.
    #[must_use]
    pub fn new(name: impl Into<String>, value: ContainerValue) -> Self {
        Self {
            name: name.into(),
            value,
            auto_selected: false,
        }
    }

    /// Creates an explicitly selected leaf entry.
    #[must_use]
    pub fn leaf(name: impl Into<String>, value: Value) -> Self {
        Self::new(name, ContainerValue::Leaf(value))
    }

    /// Marks the entry as auto-selected.
    #[must_use]
    pub fn auto_selected(mut self) -> Self {
        self.auto_selected = true;
        self
    }
}

/// Singly linked chain of named values in declaration order.
#[derive(Debug, Clone)]
pub struct PropertyContainer {
    name: String,
    value: ContainerValue,
    auto_selected: bool,
    next: Option<Box<PropertyContainer>>,
}

impl PropertyContainer {
    /// Creates a single-node chain.
    #[must_use]
    pub fn new(entry: NamedValue) -> Self {
        Self {
            name: entry.name,
            value: entry.value,
            auto_selected: entry.auto_selected,
            next: None,
        }
    }

    /// Builds a chain preserving entry order; `None` for no entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = NamedValue>) -> Option<Self> {
        let entries: Vec<NamedValue> = entries.into_iter().collect();
        entries.into_iter().rev().fold(None, |next, entry| {
            let mut node = Self::new(entry);
            node.next = next.map(Box::new);
            Some(node)
        })
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the node value.
    #[must_use]
    pub fn value(&self) -> &ContainerValue {
        &self.value
    }

    /// Returns whether the node was auto-selected.
    #[must_use]
    pub fn is_auto_selected(&self) -> bool {
        self.auto_selected
    }

    /// Returns the following node.
    #[must_use]
    pub fn next(&self) -> Option<&PropertyContainer> {
        self.next.as_deref()
    }

    /// Iterates the chain from this node.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyContainer> {
        std::iter::successors(Some(self), |node| node.next())
    }

    /// Finds the first node with the name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyContainer> {
        self.iter().find(|node| node.name == name)
    }

    /// Converts the chain to a JSON map using model names, auto-selected entries included.
    #[must_use]
    pub fn to_value_map(&self) -> Map<String, Value> {
        self.iter()
            .map(|node| (node.name.clone(), node.value.to_value()))
            .collect()
    }

    /// Converts the chain to an ordered mapping with mapped names.
    ///
    /// Entries the mapper maps to `None` are omitted. Auto-selected entries are
    /// omitted unless `include_auto_selected` is set.
    pub fn to_dictionary(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Map<String, Value>> {
        let mut dictionary = Map::new();
        for node in self.iter() {
            if node.auto_selected && !include_auto_selected {
                continue;
            }
            let Some(name) = mapped_name(mapper, node.name.as_str())? else {
                continue;
            };

            dictionary.insert(
                name,
                node.value.to_mapped_value(mapper, include_auto_selected)?,
            );
        }

        Ok(dictionary)
    }

    pub(super) fn mapped_entry(
        &self,
        mapper: &dyn PropertyMapper,
        include_auto_selected: bool,
    ) -> AppResult<Value> {
        self.value.to_mapped_value(mapper, include_auto_selected)
    }
}
