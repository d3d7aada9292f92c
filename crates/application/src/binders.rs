//! Translation of parsed clauses into expression trees and query operators.

use std::sync::Arc;

use querylens_core::AppResult;
use querylens_domain::{DataModel, IT, QuerySettings, StructuredTypeDefinition};
use serde::Serialize;

mod aggregation;
mod compute;
mod expression;
mod filter;
mod order_by;
mod search;
mod select_expand;
#[cfg(test)]
mod tests;

pub(crate) use aggregation::stage_result_context;
pub use aggregation::{apply_result_context, bind_apply};
pub use compute::bind_compute;
pub use expression::ExpressionBinder;
pub use filter::bind_filter;
pub use order_by::{bind_order_by, stable_ordering_keys};
pub use search::{SearchBinder, VocabularySearchBinder, bind_search};
pub use select_expand::SelectExpandBinder;

/// One property of a dynamic result shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeProperty {
    /// Property name.
    pub name: String,
    /// Nested properties when the value is itself a record.
    pub children: Vec<ShapeProperty>,
}

impl ShapeProperty {
    /// Creates a scalar property.
    #[must_use]
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Finds a child, optionally ignoring ASCII case.
    #[must_use]
    pub fn find<'a>(
        properties: &'a [ShapeProperty],
        name: &str,
        case_insensitive: bool,
    ) -> Option<&'a ShapeProperty> {
        properties.iter().find(|property| property.name == name).or_else(|| {
            case_insensitive
                .then(|| {
                    properties
                        .iter()
                        .find(|property| property.name.eq_ignore_ascii_case(name))
                })
                .flatten()
        })
    }
}

/// Shape of the rows a clause is bound against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ResultShape {
    /// Rows are instances of a structured type.
    Entity {
        /// Structured type name.
        type_name: String,
    },
    /// Rows were reshaped by `$apply` and only expose these properties.
    Dynamic {
        /// Properties in output order.
        properties: Vec<ShapeProperty>,
    },
}

/// Per-request binding state.
///
/// A context is cheap to clone; `$apply` stages produce a new context for the
/// stages after them.
#[derive(Debug, Clone)]
pub struct QueryBinderContext {
    model: Arc<DataModel>,
    settings: QuerySettings,
    element_type: String,
    shape: ResultShape,
    range_variable: String,
    computed: Vec<String>,
}

impl QueryBinderContext {
    /// Creates a context binding against instances of `element_type`.
    pub fn new(
        model: Arc<DataModel>,
        settings: QuerySettings,
        element_type: impl Into<String>,
    ) -> AppResult<Self> {
        let element_type = element_type.into();
        model.require_type(&element_type)?;

        Ok(Self {
            model,
            settings,
            shape: ResultShape::Entity {
                type_name: element_type.clone(),
            },
            element_type,
            range_variable: IT.to_owned(),
            computed: Vec::new(),
        })
    }

    /// Returns the model.
    #[must_use]
    pub fn model(&self) -> &DataModel {
        self.model.as_ref()
    }

    /// Returns the shared model handle.
    #[must_use]
    pub fn model_handle(&self) -> Arc<DataModel> {
        Arc::clone(&self.model)
    }

    /// Returns the binding settings.
    #[must_use]
    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Returns the element type of the queried collection.
    #[must_use]
    pub fn element_type(&self) -> &str {
        self.element_type.as_str()
    }

    /// Returns the element type definition.
    pub fn element_definition(&self) -> AppResult<&StructuredTypeDefinition> {
        self.model.require_type(&self.element_type)
    }

    /// Returns the shape rows currently have.
    #[must_use]
    pub fn shape(&self) -> &ResultShape {
        &self.shape
    }

    /// Returns whether rows were reshaped by `$apply`.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self.shape, ResultShape::Dynamic { .. })
    }

    /// Returns the implicit iteration variable.
    #[must_use]
    pub fn range_variable(&self) -> &str {
        self.range_variable.as_str()
    }

    /// Returns aliases contributed by `$compute`.
    #[must_use]
    pub fn computed_properties(&self) -> &[String] {
        &self.computed
    }

    /// Returns whether `name` is a computed alias.
    #[must_use]
    pub fn is_computed(&self, name: &str) -> bool {
        self.computed.iter().any(|alias| {
            alias == name || (self.settings.enable_case_insensitive && alias.eq_ignore_ascii_case(name))
        })
    }

    /// Returns the context with rows reshaped.
    #[must_use]
    pub fn with_shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self.computed.clear();
        self
    }

    /// Returns the context with an extra computed alias.
    #[must_use]
    pub fn with_computed(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        match &mut self.shape {
            ResultShape::Entity { .. } => {
                if !self.computed.contains(&alias) {
                    self.computed.push(alias);
                }
            }
            ResultShape::Dynamic { properties } => {
                if !properties.iter().any(|property| property.name == alias) {
                    properties.push(ShapeProperty::leaf(alias));
                }
            }
        }
        self
    }
}
