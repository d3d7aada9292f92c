//! Sample model and records shared by unit tests.

use std::sync::Arc;

use querylens_domain::{
    DataModel, EnumMember, EnumTypeDefinition, PrimitiveKind, PropertyDefinition,
    StructuredTypeDefinition,
};
use serde_json::{Value, json};

use crate::resolver::ModelRestrictionResolver;
use crate::wrappers::Row;

fn primitive(name: &str, kind: PrimitiveKind) -> PropertyDefinition {
    PropertyDefinition::primitive(name, kind).unwrap_or_else(|_| unreachable!())
}

/// Person/Order/Address model without annotations.
pub(crate) fn sample_model() -> DataModel {
    let address = StructuredTypeDefinition::complex(
        "Address",
        vec![
            primitive("Street", PrimitiveKind::String),
            primitive("City", PrimitiveKind::String),
        ],
    )
    .unwrap_or_else(|_| unreachable!());

    let person = StructuredTypeDefinition::entity(
        "Person",
        vec!["Id".to_owned()],
        vec![
            primitive("Id", PrimitiveKind::Int32).not_null(),
            primitive("Name", PrimitiveKind::String),
            primitive("Age", PrimitiveKind::Int32),
            primitive("Secret", PrimitiveKind::String),
            primitive("Tags", PrimitiveKind::String).into_collection(),
            PropertyDefinition::complex("Address", "Address").unwrap_or_else(|_| unreachable!()),
            PropertyDefinition::navigation("Manager", "Person", false)
                .unwrap_or_else(|_| unreachable!()),
            PropertyDefinition::navigation("Orders", "Order", true)
                .unwrap_or_else(|_| unreachable!()),
        ],
    )
    .unwrap_or_else(|_| unreachable!());

    let order = StructuredTypeDefinition::entity(
        "Order",
        vec!["Id".to_owned()],
        vec![
            primitive("Id", PrimitiveKind::Int32).not_null(),
            primitive("Amount", PrimitiveKind::Double),
            PropertyDefinition::enumeration("Category", "ProductCategory")
                .unwrap_or_else(|_| unreachable!()),
            primitive("PlacedOn", PrimitiveKind::DateTimeOffset),
        ],
    )
    .unwrap_or_else(|_| unreachable!());

    let category = EnumTypeDefinition::new(
        "ProductCategory",
        ["Books", "Games", "Music"]
            .into_iter()
            .zip(0..)
            .map(|(name, value)| EnumMember {
                name: name.to_owned(),
                value,
            })
            .collect(),
        false,
    )
    .unwrap_or_else(|_| unreachable!());

    DataModel::new()
        .with_type(address)
        .and_then(|model| model.with_type(person))
        .and_then(|model| model.with_type(order))
        .and_then(|model| model.with_enum(category))
        .unwrap_or_else(|_| unreachable!())
}

/// Resolver over an unannotated sample model.
pub(crate) fn sample_resolver() -> Arc<ModelRestrictionResolver> {
    resolver_for(sample_model())
}

/// Resolver over the given model.
pub(crate) fn resolver_for(model: DataModel) -> Arc<ModelRestrictionResolver> {
    Arc::new(ModelRestrictionResolver::new(Arc::new(model)))
}

/// Four people with addresses, managers and orders.
pub(crate) fn sample_people() -> Vec<Value> {
    vec![
        json!({
            "Id": 1,
            "Name": "Alice",
            "Age": 41,
            "Secret": "a",
            "Tags": ["admin", "ops"],
            "Address": { "Street": "1 Main St", "City": "Oslo" },
            "Manager": null,
            "Orders": [
                { "Id": 10, "Amount": 20.0, "Category": "Books", "PlacedOn": "2024-01-05T10:00:00Z" },
                { "Id": 11, "Amount": 5.5, "Category": "Games", "PlacedOn": "2024-02-01T23:30:00Z" }
            ]
        }),
        json!({
            "Id": 2,
            "Name": "Bob",
            "Age": 29,
            "Secret": "b",
            "Tags": [],
            "Address": { "Street": "2 Side St", "City": "Bergen" },
            "Manager": { "Id": 1, "Name": "Alice", "Age": 41 },
            "Orders": [
                { "Id": 12, "Amount": 12.0, "Category": "Books", "PlacedOn": "2024-03-10T08:00:00Z" }
            ]
        }),
        json!({
            "Id": 3,
            "Name": "Carol",
            "Age": 35,
            "Secret": "c",
            "Tags": ["ops"],
            "Address": { "Street": "3 High St", "City": "Oslo" },
            "Manager": { "Id": 1, "Name": "Alice", "Age": 41 },
            "Orders": []
        }),
        json!({
            "Id": 4,
            "Name": "Dave",
            "Age": null,
            "Secret": "d",
            "Tags": [],
            "Address": null,
            "Manager": { "Id": 2, "Name": "Bob", "Age": 29 },
            "Orders": [
                { "Id": 13, "Amount": 7.0, "Category": "Music", "PlacedOn": "2024-03-11T12:00:00Z" }
            ]
        }),
    ]
}

/// Sample people as pipeline rows.
pub(crate) fn sample_rows() -> Vec<Row> {
    sample_people().into_iter().map(Row::Instance).collect()
}

/// Reads a property of a row as JSON.
pub(crate) fn row_value(row: &Row, name: &str) -> Value {
    row.property(name).unwrap_or(Value::Null)
}
