use std::collections::BTreeMap;

use querylens_domain::{
    DefaultQuerySettings, ElementId, ExpandConfiguration, ModelBoundQuerySettings,
    RestrictionAnnotation, SelectExpandType,
};

use super::PropertyPosition;
use crate::fixtures::{resolver_for, sample_model};

fn age() -> ElementId {
    ElementId::of_property("Person", "Age")
}

#[test]
fn type_default_disables_filter_when_request_disables_it() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_type("Person"),
            ModelBoundQuerySettings {
                default_enable_filter: Some(false),
                ..ModelBoundQuerySettings::default()
            },
        )
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);

    assert!(resolver.is_not_filterable(&age(), PropertyPosition::direct("Person"), false));
    assert!(resolver.is_not_filterable(&age(), PropertyPosition::direct("Person"), true));
}

#[test]
fn explicit_property_entry_wins_over_type_default() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_type("Person"),
            ModelBoundQuerySettings {
                default_enable_filter: Some(false),
                filter_configurations: BTreeMap::from([("Age".to_owned(), true)]),
                ..ModelBoundQuerySettings::default()
            },
        )
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);

    assert!(!resolver.is_not_filterable(&age(), PropertyPosition::direct("Person"), false));
    assert!(resolver.is_not_filterable(
        &ElementId::of_property("Person", "Name"),
        PropertyPosition::direct("Person"),
        true
    ));
}

#[test]
fn request_enable_allows_properties_without_settings() {
    let resolver = resolver_for(sample_model());

    assert!(!resolver.is_not_filterable(&age(), PropertyPosition::direct("Person"), true));
    assert!(resolver.is_not_filterable(&age(), PropertyPosition::direct("Person"), false));
    assert!(!resolver.is_not_sortable(&age(), PropertyPosition::direct("Person"), true));
}

#[test]
fn restriction_annotation_always_wins() {
    let model = sample_model()
        .with_restrictions(
            age(),
            RestrictionAnnotation {
                not_sortable: true,
                ..RestrictionAnnotation::default()
            },
        )
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);

    assert!(resolver.is_not_sortable(&age(), PropertyPosition::direct("Person"), true));
    assert!(!resolver.is_not_filterable(&age(), PropertyPosition::direct("Person"), true));
}

#[test]
fn navigation_position_reads_navigation_and_target_settings() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_property("Person", "Orders"),
            ModelBoundQuerySettings {
                order_by_configurations: BTreeMap::from([("Amount".to_owned(), false)]),
                ..ModelBoundQuerySettings::default()
            },
        )
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);
    let orders = ElementId::of_property("Person", "Orders");
    let amount = ElementId::of_property("Order", "Amount");

    assert!(resolver.is_not_sortable(&amount, PropertyPosition::behind(&orders, "Order"), true));
    assert!(!resolver.is_not_sortable(&amount, PropertyPosition::direct("Order"), true));
}

#[test]
fn countable_follows_settings_then_request_default() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_property("Person", "Orders"),
            ModelBoundQuerySettings {
                countable: Some(false),
                ..ModelBoundQuerySettings::default()
            },
        )
        .and_then(|model| {
            model.with_query_settings(
                ElementId::of_type("Person"),
                ModelBoundQuerySettings {
                    max_top: Some(20),
                    ..ModelBoundQuerySettings::default()
                },
            )
        })
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);
    let orders = ElementId::of_property("Person", "Orders");

    assert!(resolver.is_not_countable(Some(&orders), "Order", true));
    assert!(!resolver.is_not_countable(None, "Person", true));
    assert!(resolver.is_not_countable(None, "Person", false));
    assert!(!resolver.is_not_countable(None, "Order", false));
}

#[test]
fn expand_configuration_respects_annotations_and_defaults() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_type("Person"),
            ModelBoundQuerySettings {
                expand_configurations: BTreeMap::from([(
                    "Manager".to_owned(),
                    ExpandConfiguration {
                        expand_type: SelectExpandType::Automatic,
                        max_depth: 3,
                    },
                )]),
                ..ModelBoundQuerySettings::default()
            },
        )
        .and_then(|model| {
            model.with_restrictions(
                ElementId::of_property("Person", "Orders"),
                RestrictionAnnotation {
                    not_expandable: true,
                    ..RestrictionAnnotation::default()
                },
            )
        })
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);
    let manager = ElementId::of_property("Person", "Manager");
    let orders = ElementId::of_property("Person", "Orders");

    assert_eq!(
        resolver
            .expand_configuration(&manager, PropertyPosition::direct("Person"), false)
            .map(|configuration| configuration.max_depth),
        Some(3)
    );
    assert!(resolver.is_auto_expand(&manager, PropertyPosition::direct("Person")));
    assert!(
        resolver
            .expand_configuration(&orders, PropertyPosition::direct("Person"), true)
            .is_none()
    );
}

#[test]
fn request_default_max_top_seeds_unannotated_elements() {
    let resolver = resolver_for(sample_model());
    let defaults = DefaultQuerySettings {
        max_top: Some(30),
        ..DefaultQuerySettings::default()
    };

    assert_eq!(resolver.max_top(None, "Person", &defaults), Some(30));
    assert_eq!(
        resolver.max_top(None, "Person", &DefaultQuerySettings::default()),
        None
    );
}

#[test]
fn property_max_top_overrides_type_max_top() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_type("Order"),
            ModelBoundQuerySettings {
                max_top: Some(50),
                page_size: Some(5),
                ..ModelBoundQuerySettings::default()
            },
        )
        .and_then(|model| {
            model.with_query_settings(
                ElementId::of_property("Person", "Orders"),
                ModelBoundQuerySettings {
                    max_top: Some(2),
                    ..ModelBoundQuerySettings::default()
                },
            )
        })
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);
    let orders = ElementId::of_property("Person", "Orders");
    let defaults = DefaultQuerySettings::default();

    assert_eq!(resolver.max_top(Some(&orders), "Order", &defaults), Some(2));
    assert_eq!(resolver.max_top(None, "Order", &defaults), Some(50));
    assert_eq!(resolver.page_size(Some(&orders), "Order"), Some(5));
}

#[test]
fn select_defaults_and_automatic_selection() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_type("Person"),
            ModelBoundQuerySettings {
                default_select_type: Some(SelectExpandType::Allowed),
                select_configurations: BTreeMap::from([
                    ("Secret".to_owned(), SelectExpandType::Disabled),
                    ("Id".to_owned(), SelectExpandType::Automatic),
                ]),
                ..ModelBoundQuerySettings::default()
            },
        )
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);
    let position = PropertyPosition::direct("Person");

    assert!(resolver.is_not_selectable(
        &ElementId::of_property("Person", "Secret"),
        position,
        true
    ));
    assert!(!resolver.is_not_selectable(&age(), position, false));
    assert!(resolver.is_auto_select(&ElementId::of_property("Person", "Id"), position));
}

#[test]
fn repeated_resolution_is_served_from_cache() {
    let resolver = resolver_for(sample_model());
    let defaults = DefaultQuerySettings::default();

    let first = resolver.settings_for(Some(&age()), "Person", &defaults);
    let second = resolver.settings_for(Some(&age()), "Person", &defaults);

    assert!(first.is_none());
    assert!(second.is_none());
    assert_eq!(resolver.cache.len(), 1);
}
