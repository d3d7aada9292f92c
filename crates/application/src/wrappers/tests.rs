use querylens_core::AppError;
use serde_json::{Value, json};

use super::{
    AggregationWrapper, ComputeWrapper, ContainerValue, DynamicWrapper, FlatteningWrapper,
    GroupByWrapper, IdentityPropertyMapper, NamedValue, PropertyContainer, ResultWrapper, Row,
    SelectExpandWrapper,
};

fn person() -> Row {
    Row::Instance(json!({ "Id": 7, "Name": "Eve", "Age": 52, "Manager": null }))
}

fn structural() -> Vec<String> {
    ["Id", "Name", "Age"].into_iter().map(str::to_owned).collect()
}

#[test]
fn container_chain_preserves_insertion_order() {
    let chain = PropertyContainer::from_entries([
        NamedValue::leaf("Id", json!(1)),
        NamedValue::leaf("Name", json!("Bob")),
    ])
    .unwrap_or_else(|| unreachable!());

    assert_eq!(chain.name(), "Id");
    assert_eq!(chain.next().map(PropertyContainer::name), Some("Name"));
    assert!(chain.next().and_then(PropertyContainer::next).is_none());

    let dictionary = chain
        .to_dictionary(&IdentityPropertyMapper, false)
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(
        dictionary.into_iter().collect::<Vec<_>>(),
        vec![
            ("Id".to_owned(), json!(1)),
            ("Name".to_owned(), json!("Bob")),
        ]
    );
}

#[test]
fn empty_entry_list_builds_no_chain() {
    assert!(PropertyContainer::from_entries(Vec::new()).is_none());
}

#[test]
fn auto_selected_entries_are_hidden_unless_requested() {
    let wrapper = SelectExpandWrapper::select_some(
        Some("Person".to_owned()),
        PropertyContainer::from_entries([
            NamedValue::leaf("Name", json!("Eve")),
            NamedValue::leaf("Id", json!(7)).auto_selected(),
        ]),
    );

    let visible = wrapper
        .to_dictionary(&IdentityPropertyMapper, false)
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(visible.keys().collect::<Vec<_>>(), ["Name"]);

    let everything = wrapper
        .to_dictionary(&IdentityPropertyMapper, true)
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(everything.keys().collect::<Vec<_>>(), ["Name", "Id"]);
}

#[test]
fn lazy_fill_runs_once_and_keeps_container_values() {
    let wrapper = SelectExpandWrapper::select_all(
        Some("Person".to_owned()),
        person(),
        structural(),
        PropertyContainer::from_entries([NamedValue::leaf("Name", json!("Overridden"))]),
    );

    let first = wrapper.ensure_values();
    let second = wrapper.ensure_values();

    assert!(std::ptr::eq(first, second));
    assert_eq!(
        first.clone().into_iter().collect::<Vec<_>>(),
        vec![
            ("Id".to_owned(), json!(7)),
            ("Name".to_owned(), json!("Overridden")),
            ("Age".to_owned(), json!(52)),
        ]
    );
}

#[test]
fn select_all_ignores_non_structural_instance_values() {
    let wrapper =
        SelectExpandWrapper::select_all(Some("Person".to_owned()), person(), structural(), None);

    assert!(wrapper.try_get_property_value("Manager").is_none());
    assert_eq!(wrapper.try_get_property_value("Age"), Some(json!(52)));
}

#[test]
fn mapper_can_rename_and_omit_properties() {
    let wrapper = SelectExpandWrapper::select_all(None, person(), structural(), None);
    let mapper = |name: &str| match name {
        "Age" => None,
        other => Some(other.to_ascii_lowercase()),
    };

    let dictionary = wrapper
        .to_dictionary(&mapper, false)
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(dictionary.keys().collect::<Vec<_>>(), ["id", "name"]);
}

#[test]
fn empty_mapped_name_is_rejected() {
    let wrapper = SelectExpandWrapper::select_all(None, person(), structural(), None);
    let mapper = |_: &str| Some(String::new());

    assert!(matches!(
        wrapper.to_dictionary(&mapper, false),
        Err(AppError::Configuration(_))
    ));
}

#[test]
fn nested_wrappers_are_mapped_recursively() {
    let nested = ResultWrapper::SelectExpand(SelectExpandWrapper::select_some(
        Some("Order".to_owned()),
        PropertyContainer::from_entries([NamedValue::leaf("Amount", json!(3.5))]),
    ));
    let wrapper = SelectExpandWrapper::select_some(
        Some("Person".to_owned()),
        PropertyContainer::from_entries([
            NamedValue::leaf("Name", json!("Eve")),
            NamedValue::new("Orders", ContainerValue::WrappedCollection(vec![nested])),
        ]),
    );
    let mapper = |name: &str| Some(name.to_ascii_uppercase());

    let dictionary = wrapper
        .to_dictionary(&mapper, false)
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(
        Value::Object(dictionary),
        json!({ "NAME": "Eve", "ORDERS": [{ "AMOUNT": 3.5 }] })
    );
}

#[test]
fn aggregation_wrapper_lists_keys_before_aggregates() {
    let group_key = PropertyContainer::from_entries([NamedValue::new(
        "Address",
        ContainerValue::Nested(Box::new(PropertyContainer::new(NamedValue::leaf(
            "City",
            json!("Oslo"),
        )))),
    )]);
    let aggregates = PropertyContainer::from_entries([NamedValue::leaf("Total", json!(25.5))]);
    let wrapper = AggregationWrapper::new(group_key, aggregates);

    assert_eq!(
        Value::Object(wrapper.values().clone()),
        json!({ "Address": { "City": "Oslo" }, "Total": 25.5 })
    );
    assert_eq!(
        wrapper.try_get_property_value("Address"),
        Some(json!({ "City": "Oslo" }))
    );
}

#[test]
fn compute_and_flattening_wrappers_fall_through_to_source() {
    let computed = ComputeWrapper::new(
        person(),
        PropertyContainer::from_entries([NamedValue::leaf("Double", json!(104))]),
    );
    assert_eq!(computed.try_get_property_value("Double"), Some(json!(104)));
    assert_eq!(computed.try_get_property_value("Name"), Some(json!("Eve")));

    let flattened = FlatteningWrapper::new(
        Row::Wrapper(ResultWrapper::Compute(computed)),
        PropertyContainer::from_entries([
            NamedValue::leaf("Property0", json!("Alice")).auto_selected(),
        ]),
    );
    assert_eq!(flattened.try_get_property_value("Property0"), Some(json!("Alice")));
    assert_eq!(flattened.try_get_property_value("Double"), Some(json!(104)));

    let dictionary = flattened
        .to_dictionary(&IdentityPropertyMapper, false)
        .unwrap_or_else(|_| unreachable!());
    assert!(!dictionary.contains_key("Property0"));
    assert!(dictionary.contains_key("Double"));
}

#[test]
fn group_wrapper_without_keys_is_empty() {
    let wrapper = GroupByWrapper::new(None);

    assert!(wrapper.values().is_empty());
    assert!(wrapper.try_get_property_value("Anything").is_none());
}
