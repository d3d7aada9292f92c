use std::collections::BTreeMap;
use std::sync::Arc;

use querylens_core::AppError;
use querylens_domain::{
    AggregateExpression, AggregationMethod, ApplyClause, BinaryOperatorKind, ComputeClause,
    ComputeExpression, DefaultQuerySettings, ElementId, ExpandConfiguration, ExpandItem,
    FilterClause, GroupByPropertyNode, ModelBoundQuerySettings, NullPropagation, OrderByClause,
    OrderByDirection, QueryNode, QuerySettings, SearchClause, SelectExpandClause,
    SelectExpandType, TransformationNode,
};
use serde_json::{Value, json};

use super::{
    QueryBinderContext, ResultShape, SelectExpandBinder, ShapeProperty, VocabularySearchBinder,
    bind_apply, bind_compute, bind_filter, bind_order_by, bind_search, stable_ordering_keys,
};
use crate::executor::InMemoryExecutor;
use crate::expression::Expr;
use crate::fixtures::{resolver_for, sample_model, sample_resolver, sample_rows};
use crate::query::{Query, QueryExecutor, QueryOperator};
use crate::wrappers::{IdentityPropertyMapper, Row};

fn context_for(type_name: &str, settings: QuerySettings) -> QueryBinderContext {
    QueryBinderContext::new(Arc::new(sample_model()), settings, type_name)
        .unwrap_or_else(|_| unreachable!())
}

fn people() -> QueryBinderContext {
    context_for("Person", QuerySettings::default())
}

fn predicate(operator: QueryOperator) -> Expr {
    match operator {
        QueryOperator::Where { predicate, .. } => predicate,
        _ => unreachable!(),
    }
}

fn run(query: &Query) -> Vec<Value> {
    InMemoryExecutor::default()
        .execute(query, sample_rows())
        .unwrap_or_else(|_| unreachable!())
        .iter()
        .map(dictionary)
        .collect()
}

fn dictionary(row: &Row) -> Value {
    Value::Object(
        row.to_dictionary(&IdentityPropertyMapper, false)
            .unwrap_or_else(|_| unreachable!()),
    )
}

fn city_equals(city: &str) -> FilterClause {
    FilterClause::new(QueryNode::property_of_it("Address").property("City").equals(json!(city)))
}

fn group_by_city_with_total() -> ApplyClause {
    ApplyClause {
        transformations: vec![TransformationNode::GroupBy {
            properties: vec![GroupByPropertyNode::nested(
                "Address",
                vec![GroupByPropertyNode::leaf("City")],
            )],
            aggregate: Some(vec![AggregateExpression::property(
                "Age",
                AggregationMethod::Sum,
                "Total",
            )]),
        }],
    }
}

#[test]
fn member_access_below_the_root_is_null_guarded() {
    let bound = bind_filter(&city_equals("Oslo"), &people()).unwrap_or_else(|_| unreachable!());

    assert_eq!(
        predicate(bound).to_string(),
        r#"(iif(($it.Address == null), null, $it.Address.City) eq "Oslo")"#
    );
}

#[test]
fn never_propagation_binds_plain_member_access() {
    let context = context_for(
        "Person",
        QuerySettings {
            null_propagation: NullPropagation::Never,
            ..QuerySettings::default()
        },
    );

    let bound = bind_filter(&city_equals("Oslo"), &context).unwrap_or_else(|_| unreachable!());

    assert_eq!(predicate(bound).to_string(), r#"($it.Address.City eq "Oslo")"#);
}

#[test]
fn arithmetic_is_lifted_only_when_nulls_propagate() {
    let clause = FilterClause::new(
        QueryNode::property_of_it("Age")
            .binary(BinaryOperatorKind::Add, QueryNode::constant(json!(1)))
            .binary(BinaryOperatorKind::GreaterThan, QueryNode::constant(json!(40))),
    );

    let bound = bind_filter(&clause, &people()).unwrap_or_else(|_| unreachable!());

    assert_eq!(predicate(bound).to_string(), "(($it.Age add? 1) gt 40)");
}

#[test]
fn enum_literals_are_canonicalized_and_unknown_ones_kept() {
    let context = context_for("Order", QuerySettings::default());
    let games = FilterClause::new(QueryNode::property_of_it("Category").equals(json!("games")));
    let toys = FilterClause::new(QueryNode::property_of_it("Category").equals(json!("Toys")));

    let games = bind_filter(&games, &context).unwrap_or_else(|_| unreachable!());
    let toys = bind_filter(&toys, &context).unwrap_or_else(|_| unreachable!());

    assert_eq!(predicate(games).to_string(), r#"($it.Category eq "Games")"#);
    assert_eq!(predicate(toys).to_string(), r#"($it.Category eq "Toys")"#);
}

#[test]
fn case_insensitive_binding_uses_declared_names() {
    let context = context_for(
        "Person",
        QuerySettings {
            enable_case_insensitive: true,
            ..QuerySettings::default()
        },
    );
    let clause = FilterClause::new(QueryNode::property_of_it("nAmE").equals(json!("Bob")));

    let bound = bind_filter(&clause, &context).unwrap_or_else(|_| unreachable!());
    assert_eq!(predicate(bound).to_string(), r#"($it.Name eq "Bob")"#);

    let strict = bind_filter(&clause, &people());
    assert!(matches!(strict, Err(AppError::Internal(_))));
}

#[test]
fn lambda_variables_bind_against_collection_elements() {
    let clause = FilterClause::new(QueryNode::Any {
        source: Box::new(QueryNode::it().navigation("Orders")),
        variable: "o".to_owned(),
        body: Some(Box::new(
            QueryNode::range_variable("o")
                .property("Amount")
                .binary(BinaryOperatorKind::GreaterThan, QueryNode::constant(json!(10))),
        )),
    });

    let bound = bind_filter(&clause, &people()).unwrap_or_else(|_| unreachable!());
    let query = Query::new().then(bound);

    let names: Vec<Value> = run(&query)
        .into_iter()
        .map(|row| row["Name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Alice"), json!("Bob")]);
}

#[test]
fn unknown_functions_are_not_supported() {
    let clause = FilterClause::new(QueryNode::call(
        "geo.distance",
        vec![QueryNode::property_of_it("Name")],
    ));

    assert!(matches!(
        bind_filter(&clause, &people()),
        Err(AppError::NotSupported(_))
    ));
}

#[test]
fn computed_aliases_are_visible_to_later_clauses() {
    let compute = ComputeClause {
        items: vec![ComputeExpression {
            expression: QueryNode::property_of_it("Age")
                .binary(BinaryOperatorKind::Multiply, QueryNode::constant(json!(2))),
            alias: "DoubleAge".to_owned(),
        }],
    };
    let (operator, next) = bind_compute(&compute, &people()).unwrap_or_else(|_| unreachable!());
    let filter = FilterClause::new(
        QueryNode::property_of_it("DoubleAge")
            .binary(BinaryOperatorKind::GreaterThan, QueryNode::constant(json!(70))),
    );

    assert!(next.is_computed("DoubleAge"));
    assert!(bind_filter(&filter, &people()).is_err());

    let query = Query::new()
        .then(operator)
        .then(bind_filter(&filter, &next).unwrap_or_else(|_| unreachable!()));
    let names: Vec<Value> = run(&query)
        .into_iter()
        .map(|row| row["Name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Alice")]);
}

#[test]
fn group_by_reshapes_rows_for_later_stages() {
    let (query, next) =
        bind_apply(&group_by_city_with_total(), &people()).unwrap_or_else(|_| unreachable!());

    assert_eq!(
        next.shape(),
        &ResultShape::Dynamic {
            properties: vec![
                ShapeProperty {
                    name: "Address".to_owned(),
                    children: vec![ShapeProperty::leaf("City")],
                },
                ShapeProperty::leaf("Total"),
            ],
        }
    );
    assert_eq!(
        run(&query),
        vec![
            json!({ "Address": { "City": "Oslo" }, "Total": 76 }),
            json!({ "Address": { "City": "Bergen" }, "Total": 29 }),
            json!({ "Address": { "City": null }, "Total": 0 }),
        ]
    );

    let later = FilterClause::new(
        QueryNode::property_of_it("Total")
            .binary(BinaryOperatorKind::GreaterThan, QueryNode::constant(json!(30))),
    );
    let filtered = query.then(bind_filter(&later, &next).unwrap_or_else(|_| unreachable!()));
    assert_eq!(run(&filtered).len(), 1);

    let gone = FilterClause::new(QueryNode::property_of_it("Name").equals(json!("Alice")));
    assert!(bind_filter(&gone, &next).is_err());
}

#[test]
fn grouping_across_a_navigation_flattens_first() {
    let clause = ApplyClause {
        transformations: vec![TransformationNode::GroupBy {
            properties: vec![GroupByPropertyNode::nested(
                "Manager",
                vec![GroupByPropertyNode::leaf("Name")],
            )],
            aggregate: None,
        }],
    };

    let (query, _) = bind_apply(&clause, &people()).unwrap_or_else(|_| unreachable!());

    assert!(matches!(
        query.operators(),
        [QueryOperator::Flatten { values, .. }, QueryOperator::GroupBy { .. }]
            if values.len() == 1 && values[0].alias == "Property0"
    ));
    assert_eq!(
        run(&query),
        vec![
            json!({ "Manager": { "Name": null } }),
            json!({ "Manager": { "Name": "Alice" } }),
            json!({ "Manager": { "Name": "Bob" } }),
        ]
    );
}

#[test]
fn custom_aggregation_methods_are_not_supported() {
    let clause = ApplyClause {
        transformations: vec![TransformationNode::Aggregate {
            expressions: vec![AggregateExpression::property(
                "Age",
                AggregationMethod::Custom("median".to_owned()),
                "Median",
            )],
        }],
    };

    assert!(matches!(
        bind_apply(&clause, &people()),
        Err(AppError::NotSupported(_))
    ));
}

#[test]
fn vocabulary_search_matches_enum_members() {
    let model = sample_model();
    let context = context_for("Order", QuerySettings::default());
    let binder = VocabularySearchBinder::for_enum(&model, "Order", "Category")
        .unwrap_or_else(|_| unreachable!());

    let books = SearchClause {
        expression: QueryNode::search_term("books"),
    };
    let toys = SearchClause {
        expression: QueryNode::search_term("toys").not(),
    };

    let books = bind_search(&books, &binder, &context).unwrap_or_else(|_| unreachable!());
    let toys = bind_search(&toys, &binder, &context).unwrap_or_else(|_| unreachable!());

    assert_eq!(predicate(books).to_string(), r#"($it.Category eq "Books")"#);
    assert_eq!(predicate(toys).to_string(), "not(false)");
    assert!(matches!(
        VocabularySearchBinder::for_enum(&model, "Order", "Amount"),
        Err(AppError::Configuration(_))
    ));
}

#[test]
fn stable_ordering_appends_missing_keys_once() {
    let context = people();
    let by_name = bind_order_by(
        &OrderByClause::by_properties(&[("Name", OrderByDirection::Descending)]),
        &context,
    )
    .unwrap_or_else(|_| unreachable!());
    let by_id = bind_order_by(
        &OrderByClause::by_properties(&[("Id", OrderByDirection::Descending)]),
        &context,
    )
    .unwrap_or_else(|_| unreachable!());

    let completed =
        stable_ordering_keys(&context, "$it", by_name).unwrap_or_else(|_| unreachable!());
    let untouched = stable_ordering_keys(&context, "$it", by_id).unwrap_or_else(|_| unreachable!());

    assert_eq!(completed.len(), 2);
    assert_eq!(completed[1].expression.to_string(), "$it.Id");
    assert!(!completed[1].descending);
    assert_eq!(untouched.len(), 1);
}

#[test]
fn select_expand_hides_keys_added_for_expansion() {
    let resolver = sample_resolver();
    let context = people();
    let mut orders = ExpandItem::new("Orders");
    orders.filter = Some(FilterClause::new(
        QueryNode::property_of_it("Amount")
            .binary(BinaryOperatorKind::GreaterThan, QueryNode::constant(json!(6))),
    ));
    orders.count = true;
    let clause = SelectExpandClause::select(&["Name"]).with_expand(orders);

    let projection = SelectExpandBinder::new(&context, &resolver, DefaultQuerySettings::enable_all())
        .bind(Some(&clause))
        .unwrap_or_else(|_| unreachable!());
    let rows = run(&Query::new().then(QueryOperator::Project { projection }));

    assert_eq!(
        rows[0],
        json!({
            "Name": "Alice",
            "Orders": [
                { "Id": 10, "Amount": 20.0, "Category": "Books", "PlacedOn": "2024-01-05T10:00:00Z" }
            ],
            "Orders@odata.count": 1
        })
    );
}

#[test]
fn max_levels_expand_recursively_up_to_the_default_depth() {
    let resolver = sample_resolver();
    let context = people();
    let mut manager = ExpandItem::new("Manager");
    manager.select_expand = Some(SelectExpandClause::select(&["Name"]));
    manager.levels = Some(0);
    let clause = SelectExpandClause::select(&["Name"]).with_expand(manager);

    let projection = SelectExpandBinder::new(&context, &resolver, DefaultQuerySettings::enable_all())
        .bind(Some(&clause))
        .unwrap_or_else(|_| unreachable!());

    let first = &projection.expansions[0];
    assert_eq!(first.name, "Manager");
    let second = &first.projection.expansions[0];
    assert_eq!(second.name, "Manager");
    assert!(second.projection.expansions.is_empty());
}

#[test]
fn automatic_expansions_follow_model_settings() {
    let model = sample_model()
        .with_query_settings(
            ElementId::of_type("Person"),
            ModelBoundQuerySettings {
                expand_configurations: BTreeMap::from([(
                    "Manager".to_owned(),
                    ExpandConfiguration {
                        expand_type: SelectExpandType::Automatic,
                        max_depth: 0,
                    },
                )]),
                ..ModelBoundQuerySettings::default()
            },
        )
        .unwrap_or_else(|_| unreachable!());
    let resolver = resolver_for(model);
    let context = QueryBinderContext::new(
        resolver.model_handle(),
        QuerySettings::default(),
        "Person",
    )
    .unwrap_or_else(|_| unreachable!());

    let projection = SelectExpandBinder::new(&context, &resolver, DefaultQuerySettings::default())
        .with_max_depth(1)
        .bind(None)
        .unwrap_or_else(|_| unreachable!());

    assert!(projection.select_all);
    assert_eq!(projection.expansions.len(), 1);
    assert!(projection.expansions[0].projection.expansions.is_empty());
}

#[test]
fn select_after_apply_projects_dynamic_properties() {
    let resolver = sample_resolver();
    let (query, next) =
        bind_apply(&group_by_city_with_total(), &people()).unwrap_or_else(|_| unreachable!());

    let projection = SelectExpandBinder::new(&next, &resolver, DefaultQuerySettings::enable_all())
        .bind(Some(&SelectExpandClause::select(&["Total"])))
        .unwrap_or_else(|_| unreachable!());
    let rows = run(&query.then(QueryOperator::Project { projection }));

    assert_eq!(rows[0], json!({ "Total": 76 }));

    let expand = SelectExpandClause::default().with_expand(ExpandItem::new("Orders"));
    assert!(
        SelectExpandBinder::new(&next, &resolver, DefaultQuerySettings::enable_all())
            .bind(Some(&expand))
            .is_err()
    );
}
