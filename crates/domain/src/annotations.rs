use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ElementId;
use crate::model_bound::ModelBoundQuerySettings;

/// Out-of-band capability restrictions on a model element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictionAnnotation {
    /// Property cannot appear in `$filter`.
    pub not_filterable: bool,
    /// Property cannot appear in `$orderby`.
    pub not_sortable: bool,
    /// Collection cannot be counted.
    pub not_countable: bool,
    /// Navigation property cannot be traversed.
    pub not_navigable: bool,
    /// Navigation property cannot be expanded.
    pub not_expandable: bool,
}

impl RestrictionAnnotation {
    /// Returns whether no capability is restricted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Read access to annotations keyed by element identity.
pub trait AnnotationLookup: Send + Sync {
    /// Returns restriction flags attached to the element.
    fn restrictions(&self, element: &ElementId) -> Option<&RestrictionAnnotation>;

    /// Returns model-bound query settings attached to the element.
    fn query_settings(&self, element: &ElementId) -> Option<&ModelBoundQuerySettings>;
}

/// In-memory annotation side-table.
#[derive(Debug, Clone, Default)]
pub struct ModelAnnotations {
    restrictions: HashMap<ElementId, RestrictionAnnotation>,
    settings: HashMap<ElementId, ModelBoundQuerySettings>,
}

impl ModelAnnotations {
    /// Replaces restriction flags for an element.
    pub fn set_restrictions(&mut self, element: ElementId, restrictions: RestrictionAnnotation) {
        self.restrictions.insert(element, restrictions);
    }

    /// Replaces model-bound settings for an element.
    pub fn set_query_settings(&mut self, element: ElementId, settings: ModelBoundQuerySettings) {
        self.settings.insert(element, settings);
    }
}

impl AnnotationLookup for ModelAnnotations {
    fn restrictions(&self, element: &ElementId) -> Option<&RestrictionAnnotation> {
        self.restrictions.get(element)
    }

    fn query_settings(&self, element: &ElementId) -> Option<&ModelBoundQuerySettings> {
        self.settings.get(element)
    }
}

#[cfg(test)]
mod tests {
    use super::{AnnotationLookup, ModelAnnotations, RestrictionAnnotation};
    use crate::ElementId;

    #[test]
    fn lookup_is_keyed_by_element_identity() {
        let mut annotations = ModelAnnotations::default();
        annotations.set_restrictions(
            ElementId::of_property("Person", "Age"),
            RestrictionAnnotation {
                not_sortable: true,
                ..RestrictionAnnotation::default()
            },
        );

        assert!(
            annotations
                .restrictions(&ElementId::of_property("Person", "Age"))
                .is_some_and(|restrictions| restrictions.not_sortable)
        );
        assert!(
            annotations
                .restrictions(&ElementId::of_property("Employee", "Age"))
                .is_none()
        );
        assert!(annotations.restrictions(&ElementId::of_type("Person")).is_none());
    }
}
