//! Model-bound capability resolution for types, properties and navigations.

use std::sync::Arc;

use dashmap::DashMap;
use querylens_domain::{
    AnnotationLookup, DataModel, DefaultQuerySettings, ElementId, ExpandConfiguration,
    ModelBoundQuerySettings, RestrictionAnnotation, SelectExpandType,
};
use tracing::debug;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SettingsKey {
    property: Option<ElementId>,
    structured_type: String,
    default_max_top: Option<u32>,
}

/// Where a property sits relative to the settings that govern it.
///
/// A property read directly on the current type is governed by that type.
/// Behind a navigation or complex hop it is governed by the hop property
/// merged with the hop's target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyPosition<'a> {
    /// Navigation or complex property that leads to the property.
    pub path_property: Option<&'a ElementId>,
    /// Structured type whose settings apply.
    pub path_type: &'a str,
}

impl<'a> PropertyPosition<'a> {
    /// Position of a property read directly on `structured_type`.
    #[must_use]
    pub fn direct(structured_type: &'a str) -> Self {
        Self {
            path_property: None,
            path_type: structured_type,
        }
    }

    /// Position of a property reached through `hop` into `target_type`.
    #[must_use]
    pub fn behind(hop: &'a ElementId, target_type: &'a str) -> Self {
        Self {
            path_property: Some(hop),
            path_type: target_type,
        }
    }
}

/// Resolves effective query capabilities from model annotations.
///
/// Merged settings are cached per element and shared across requests.
#[derive(Debug)]
pub struct ModelRestrictionResolver {
    model: Arc<DataModel>,
    cache: DashMap<SettingsKey, Option<Arc<ModelBoundQuerySettings>>>,
}

impl ModelRestrictionResolver {
    /// Creates a resolver over a read-only model.
    #[must_use]
    pub fn new(model: Arc<DataModel>) -> Self {
        Self {
            model,
            cache: DashMap::new(),
        }
    }

    /// Returns the model the resolver reads.
    #[must_use]
    pub fn model(&self) -> &DataModel {
        self.model.as_ref()
    }

    /// Returns the shared model handle.
    #[must_use]
    pub fn model_handle(&self) -> Arc<DataModel> {
        Arc::clone(&self.model)
    }

    /// Returns restriction flags attached to an element.
    #[must_use]
    pub fn restrictions(&self, element: &ElementId) -> RestrictionAnnotation {
        self.model
            .annotations()
            .restrictions(element)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the effective settings for a structured type, or for a property merged with it.
    ///
    /// `None` means neither the elements nor the request defaults configure anything.
    pub fn settings_for(
        &self,
        property: Option<&ElementId>,
        structured_type: &str,
        defaults: &DefaultQuerySettings,
    ) -> Option<Arc<ModelBoundQuerySettings>> {
        let key = SettingsKey {
            property: property.cloned(),
            structured_type: structured_type.to_owned(),
            default_max_top: defaults.max_top,
        };
        if let Some(cached) = self.cache.get(&key) {
            return cached.value().clone();
        }

        let type_settings = self.element_settings(&ElementId::of_type(structured_type), defaults);
        let resolved = match property {
            None => type_settings,
            Some(property) => {
                let property_settings = self.element_settings(property, defaults);
                match (property_settings, type_settings) {
                    (None, None) => None,
                    (Some(property_settings), None) => Some(property_settings),
                    (property_settings, Some(type_settings)) => Some(
                        property_settings
                            .unwrap_or_default()
                            .merged_with_type(&type_settings),
                    ),
                }
            }
        }
        .map(Arc::new);

        debug!(
            element = %property.map_or_else(|| structured_type.to_owned(), ToString::to_string),
            structured_type,
            configured = resolved.is_some(),
            "resolved model-bound query settings"
        );
        self.cache.insert(key, resolved.clone());
        resolved
    }

    fn element_settings(
        &self,
        element: &ElementId,
        defaults: &DefaultQuerySettings,
    ) -> Option<ModelBoundQuerySettings> {
        match self.model.annotations().query_settings(element) {
            Some(settings) => Some(settings.clone()),
            None => defaults
                .max_top
                .filter(|max_top| *max_top > 0)
                .map(|max_top| ModelBoundQuerySettings {
                    max_top: Some(max_top),
                    ..ModelBoundQuerySettings::default()
                }),
        }
    }

    fn position_settings(&self, position: PropertyPosition<'_>) -> ModelBoundQuerySettings {
        self.settings_for(
            position.path_property,
            position.path_type,
            &DefaultQuerySettings::default(),
        )
        .map(|settings| settings.as_ref().clone())
        .unwrap_or_default()
    }

    /// Returns whether the property may not appear in `$filter`.
    #[must_use]
    pub fn is_not_filterable(
        &self,
        property: &ElementId,
        position: PropertyPosition<'_>,
        enable_filter: bool,
    ) -> bool {
        if self.restrictions(property).not_filterable {
            return true;
        }

        let name = property.property_name().unwrap_or_default();
        let settings = self.position_settings(position);
        if !enable_filter {
            return !settings.filterable(name);
        }

        match settings.filter_configurations.get(name) {
            Some(enabled) => !enabled,
            None => settings.default_enable_filter == Some(false),
        }
    }

    /// Returns whether the property may not appear in `$orderby`.
    #[must_use]
    pub fn is_not_sortable(
        &self,
        property: &ElementId,
        position: PropertyPosition<'_>,
        enable_order_by: bool,
    ) -> bool {
        if self.restrictions(property).not_sortable {
            return true;
        }

        let name = property.property_name().unwrap_or_default();
        let settings = self.position_settings(position);
        if !enable_order_by {
            return !settings.sortable(name);
        }

        match settings.order_by_configurations.get(name) {
            Some(enabled) => !enabled,
            None => settings.default_enable_order_by == Some(false),
        }
    }

    /// Returns whether the property may not appear in `$select`.
    #[must_use]
    pub fn is_not_selectable(
        &self,
        property: &ElementId,
        position: PropertyPosition<'_>,
        enable_select: bool,
    ) -> bool {
        let name = property.property_name().unwrap_or_default();
        let settings = self.position_settings(position);
        if !enable_select {
            return !settings.selectable(name);
        }

        match settings.select_configurations.get(name) {
            Some(select_type) => *select_type == SelectExpandType::Disabled,
            None => settings.default_select_type == Some(SelectExpandType::Disabled),
        }
    }

    /// Returns whether the collection may not be counted.
    ///
    /// `property` is the collection navigation, or `None` for the entity set of `structured_type`.
    #[must_use]
    pub fn is_not_countable(
        &self,
        property: Option<&ElementId>,
        structured_type: &str,
        enable_count: bool,
    ) -> bool {
        if property.is_some_and(|property| self.restrictions(property).not_countable) {
            return true;
        }

        self.settings_for(property, structured_type, &DefaultQuerySettings::default())
            .is_some_and(|settings| {
                settings.countable == Some(false) || (settings.countable.is_none() && !enable_count)
            })
    }

    /// Returns whether the navigation property may not be traversed.
    #[must_use]
    pub fn is_not_navigable(&self, navigation: &ElementId) -> bool {
        self.restrictions(navigation).not_navigable
    }

    /// Returns the effective expand configuration, or `None` when the navigation cannot be expanded.
    #[must_use]
    pub fn expand_configuration(
        &self,
        navigation: &ElementId,
        position: PropertyPosition<'_>,
        enable_expand: bool,
    ) -> Option<ExpandConfiguration> {
        let restrictions = self.restrictions(navigation);
        if restrictions.not_expandable || restrictions.not_navigable {
            return None;
        }

        let name = navigation.property_name().unwrap_or_default();
        match self.position_settings(position).expand_configuration(name) {
            Some(configuration) => configuration.is_enabled().then_some(configuration),
            None => enable_expand.then_some(ExpandConfiguration {
                expand_type: SelectExpandType::Allowed,
                max_depth: 0,
            }),
        }
    }

    /// Returns whether the property is selected even when the request does not ask for it.
    #[must_use]
    pub fn is_auto_select(&self, property: &ElementId, position: PropertyPosition<'_>) -> bool {
        let name = property.property_name().unwrap_or_default();
        self.position_settings(position).select_type(name) == Some(SelectExpandType::Automatic)
    }

    /// Returns whether the navigation is expanded even when the request does not ask for it.
    #[must_use]
    pub fn is_auto_expand(&self, navigation: &ElementId, position: PropertyPosition<'_>) -> bool {
        let restrictions = self.restrictions(navigation);
        if restrictions.not_expandable || restrictions.not_navigable {
            return false;
        }

        let name = navigation.property_name().unwrap_or_default();
        self.position_settings(position)
            .expand_configuration(name)
            .is_some_and(|configuration| configuration.expand_type == SelectExpandType::Automatic)
    }

    /// Returns the model-bound `$top` limit, seeded by the request default.
    #[must_use]
    pub fn max_top(
        &self,
        property: Option<&ElementId>,
        structured_type: &str,
        defaults: &DefaultQuerySettings,
    ) -> Option<u32> {
        self.settings_for(property, structured_type, defaults)
            .and_then(|settings| settings.max_top)
    }

    /// Returns the model-bound page size.
    #[must_use]
    pub fn page_size(&self, property: Option<&ElementId>, structured_type: &str) -> Option<u32> {
        self.settings_for(property, structured_type, &DefaultQuerySettings::default())
            .and_then(|settings| settings.page_size)
    }
}
