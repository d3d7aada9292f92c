use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Select or expand behavior configured on the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectExpandType {
    /// The property may be selected/expanded when asked for.
    Allowed,
    /// The property may never be selected/expanded.
    Disabled,
    /// The property is selected/expanded even when not asked for.
    Automatic,
}

/// Expand behavior for one navigation property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandConfiguration {
    /// Expand behavior.
    pub expand_type: SelectExpandType,
    /// Maximum nesting depth below this navigation, `0` for unbounded.
    #[serde(default)]
    pub max_depth: u32,
}

impl ExpandConfiguration {
    /// Returns whether expansion is allowed at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.expand_type != SelectExpandType::Disabled
    }
}

/// Query capability settings attached to a type or property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelBoundQuerySettings {
    /// Largest `$top` accepted; `None` when unset.
    pub max_top: Option<u32>,
    /// Server-driven page size.
    pub page_size: Option<u32>,
    /// Whether the collection may be counted.
    pub countable: Option<bool>,
    /// Filter default for properties without an explicit entry.
    pub default_enable_filter: Option<bool>,
    /// Order-by default for properties without an explicit entry.
    pub default_enable_order_by: Option<bool>,
    /// Select default for properties without an explicit entry.
    pub default_select_type: Option<SelectExpandType>,
    /// Expand default for navigations without an explicit entry.
    pub default_expand_type: Option<SelectExpandType>,
    /// Expand depth default for navigations without an explicit entry.
    pub default_max_depth: Option<u32>,
    /// Explicit per-property filter switches.
    pub filter_configurations: BTreeMap<String, bool>,
    /// Explicit per-property order-by switches.
    pub order_by_configurations: BTreeMap<String, bool>,
    /// Explicit per-property select behavior.
    pub select_configurations: BTreeMap<String, SelectExpandType>,
    /// Explicit per-navigation expand behavior.
    pub expand_configurations: BTreeMap<String, ExpandConfiguration>,
}

impl ModelBoundQuerySettings {
    /// Returns whether the property is explicitly or by default filterable.
    #[must_use]
    pub fn filterable(&self, property: &str) -> bool {
        self.filter_configurations
            .get(property)
            .copied()
            .unwrap_or(self.default_enable_filter == Some(true))
    }

    /// Returns whether the property is explicitly or by default sortable.
    #[must_use]
    pub fn sortable(&self, property: &str) -> bool {
        self.order_by_configurations
            .get(property)
            .copied()
            .unwrap_or(self.default_enable_order_by == Some(true))
    }

    /// Returns whether the property is explicitly or by default selectable.
    #[must_use]
    pub fn selectable(&self, property: &str) -> bool {
        match self.select_configurations.get(property) {
            Some(select_type) => *select_type != SelectExpandType::Disabled,
            None => self
                .default_select_type
                .is_some_and(|select_type| select_type != SelectExpandType::Disabled),
        }
    }

    /// Returns the effective select behavior when any was configured.
    #[must_use]
    pub fn select_type(&self, property: &str) -> Option<SelectExpandType> {
        self.select_configurations
            .get(property)
            .copied()
            .or(self.default_select_type)
    }

    /// Returns the effective expand configuration when any was configured.
    #[must_use]
    pub fn expand_configuration(&self, navigation: &str) -> Option<ExpandConfiguration> {
        self.expand_configurations.get(navigation).copied().or_else(|| {
            self.default_expand_type
                .map(|expand_type| ExpandConfiguration {
                    expand_type,
                    max_depth: self.default_max_depth.unwrap_or(0),
                })
        })
    }

    /// Returns whether nothing is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fills every unset value from the containing type's settings.
    ///
    /// Values already present on `self` are never replaced. Capability groups
    /// (filter, order-by, select, expand) are taken over as a whole, and only
    /// when `self` configures nothing for that group.
    #[must_use]
    pub fn merged_with_type(&self, type_settings: &Self) -> Self {
        let mut merged = self.clone();

        if merged.page_size.is_none() {
            merged.page_size = type_settings.page_size;
        }
        if merged.max_top.is_none() {
            merged.max_top = type_settings.max_top;
        }
        if merged.countable.is_none() {
            merged.countable = type_settings.countable;
        }

        if merged.order_by_configurations.is_empty() && merged.default_enable_order_by.is_none() {
            merged
                .order_by_configurations
                .clone_from(&type_settings.order_by_configurations);
            merged.default_enable_order_by = type_settings.default_enable_order_by;
        }

        if merged.filter_configurations.is_empty() && merged.default_enable_filter.is_none() {
            merged
                .filter_configurations
                .clone_from(&type_settings.filter_configurations);
            merged.default_enable_filter = type_settings.default_enable_filter;
        }

        if merged.select_configurations.is_empty() && merged.default_select_type.is_none() {
            merged
                .select_configurations
                .clone_from(&type_settings.select_configurations);
            merged.default_select_type = type_settings.default_select_type;
        }

        if merged.expand_configurations.is_empty() && merged.default_expand_type.is_none() {
            merged
                .expand_configurations
                .clone_from(&type_settings.expand_configurations);
            merged.default_expand_type = type_settings.default_expand_type;
            merged.default_max_depth = type_settings.default_max_depth;
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::{ExpandConfiguration, ModelBoundQuerySettings, SelectExpandType};

    fn settings_strategy() -> impl Strategy<Value = ModelBoundQuerySettings> {
        (
            proptest::option::of(0u32..100),
            proptest::option::of(1u32..50),
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<bool>()),
            proptest::collection::btree_map("[A-C]", any::<bool>(), 0..3),
            proptest::collection::btree_map("[A-C]", any::<bool>(), 0..3),
        )
            .prop_map(
                |(
                    max_top,
                    page_size,
                    countable,
                    default_enable_filter,
                    default_enable_order_by,
                    filter_configurations,
                    order_by_configurations,
                )| ModelBoundQuerySettings {
                    max_top,
                    page_size,
                    countable,
                    default_enable_filter,
                    default_enable_order_by,
                    filter_configurations,
                    order_by_configurations,
                    ..ModelBoundQuerySettings::default()
                },
            )
    }

    proptest! {
        #[test]
        fn merge_never_overwrites_populated_values(
            property in settings_strategy(),
            type_settings in settings_strategy(),
        ) {
            let merged = property.merged_with_type(&type_settings);

            if property.max_top.is_some() {
                prop_assert_eq!(merged.max_top, property.max_top);
            } else {
                prop_assert_eq!(merged.max_top, type_settings.max_top);
            }
            if property.page_size.is_some() {
                prop_assert_eq!(merged.page_size, property.page_size);
            }
            if property.countable.is_some() {
                prop_assert_eq!(merged.countable, property.countable);
            }
            if !property.filter_configurations.is_empty() || property.default_enable_filter.is_some() {
                prop_assert_eq!(&merged.filter_configurations, &property.filter_configurations);
                prop_assert_eq!(merged.default_enable_filter, property.default_enable_filter);
            }
        }

        #[test]
        fn merge_is_idempotent(
            property in settings_strategy(),
            type_settings in settings_strategy(),
        ) {
            let once = property.merged_with_type(&type_settings);
            let twice = once.merged_with_type(&type_settings);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn explicit_property_filter_entry_wins(
            explicit in any::<bool>(),
            type_default in any::<bool>(),
        ) {
            let property = ModelBoundQuerySettings {
                filter_configurations: BTreeMap::from([("Age".to_owned(), explicit)]),
                ..ModelBoundQuerySettings::default()
            };
            let type_settings = ModelBoundQuerySettings {
                default_enable_filter: Some(type_default),
                filter_configurations: BTreeMap::from([("Age".to_owned(), !explicit)]),
                ..ModelBoundQuerySettings::default()
            };

            prop_assert_eq!(property.merged_with_type(&type_settings).filterable("Age"), explicit);
        }
    }

    #[test]
    fn type_default_fills_property_without_settings() {
        let type_settings = ModelBoundQuerySettings {
            default_enable_filter: Some(false),
            max_top: Some(10),
            ..ModelBoundQuerySettings::default()
        };

        let merged = ModelBoundQuerySettings::default().merged_with_type(&type_settings);
        assert_eq!(merged.max_top, Some(10));
        assert!(!merged.filterable("Age"));
    }

    #[test]
    fn explicit_zero_max_top_is_kept() {
        let property = ModelBoundQuerySettings {
            max_top: Some(0),
            ..ModelBoundQuerySettings::default()
        };
        let type_settings = ModelBoundQuerySettings {
            max_top: Some(25),
            ..ModelBoundQuerySettings::default()
        };

        assert_eq!(property.merged_with_type(&type_settings).max_top, Some(0));
    }

    #[test]
    fn expand_configuration_falls_back_to_type_default() {
        let settings = ModelBoundQuerySettings {
            default_expand_type: Some(SelectExpandType::Allowed),
            default_max_depth: Some(3),
            expand_configurations: BTreeMap::from([(
                "Orders".to_owned(),
                ExpandConfiguration {
                    expand_type: SelectExpandType::Disabled,
                    max_depth: 0,
                },
            )]),
            ..ModelBoundQuerySettings::default()
        };

        assert!(
            settings
                .expand_configuration("Orders")
                .is_some_and(|configuration| !configuration.is_enabled())
        );
        assert_eq!(
            settings.expand_configuration("Manager"),
            Some(ExpandConfiguration {
                expand_type: SelectExpandType::Allowed,
                max_depth: 3,
            })
        );
    }

    #[test]
    fn selectable_requires_enabled_entry_or_default() {
        let settings = ModelBoundQuerySettings {
            select_configurations: BTreeMap::from([
                ("Secret".to_owned(), SelectExpandType::Disabled),
                ("Name".to_owned(), SelectExpandType::Automatic),
            ]),
            ..ModelBoundQuerySettings::default()
        };

        assert!(!settings.selectable("Secret"));
        assert!(settings.selectable("Name"));
        assert!(!settings.selectable("Age"));
    }
}
