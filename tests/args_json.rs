use serde_json::json;
use softscope::SoftscopeError;
use softscope::args::{Condition, Direction, Filter, FindManyArgs, OrderBy, Selection};

fn args(value: serde_json::Value) -> FindManyArgs {
    serde_json::from_value(value).expect("valid arguments")
}

#[test]
fn scalar_shorthand_means_equals() {
    let filter = Filter::parse(r#"{ "email": "a@example.com" }"#).expect("filter");
    assert_eq!(filter, Filter::equals("email", "a@example.com"));
}

#[test]
fn null_means_is_null() {
    let filter = Filter::parse(r#"{ "deletedAt": null }"#).expect("filter");
    assert_eq!(filter, Filter::is_null("deletedAt"));
    let filter = Filter::parse(r#"{ "deletedAt": { "not": null } }"#).expect("filter");
    assert_eq!(filter, Filter::is_not_null("deletedAt"));
}

#[test]
fn several_fields_form_a_conjunction() {
    let filter = Filter::parse(r#"{ "id": { "gte": 2, "lt": 10 }, "name": "Ann" }"#).expect("filter");
    assert_eq!(
        filter,
        Filter::And(vec![
            Filter::field("id", Condition::Gte(json!(2))),
            Filter::field("id", Condition::Lt(json!(10))),
            Filter::equals("name", "Ann"),
        ])
    );
}

#[test]
fn logical_operators() {
    let filter = Filter::parse(
        r#"{ "NOT": { "id": 3 }, "OR": [{ "name": "Ann" }, { "name": { "startsWith": "B" } }] }"#,
    )
    .expect("filter");
    assert_eq!(
        filter,
        Filter::And(vec![
            Filter::Not(Box::new(Filter::equals("id", 3))),
            Filter::Or(vec![
                Filter::equals("name", "Ann"),
                Filter::field("name", Condition::StartsWith("B".into())),
            ]),
        ])
    );
}

#[test]
fn not_over_a_list_is_none_of() {
    let filter = Filter::parse(r#"{ "NOT": [{ "id": 1 }, { "id": 2 }] }"#).expect("filter");
    assert_eq!(
        filter,
        Filter::Not(Box::new(Filter::Or(vec![Filter::equals("id", 1), Filter::equals("id", 2)])))
    );
}

#[test]
fn nested_not_negates_its_operations() {
    let filter = Filter::parse(r#"{ "title": { "not": { "contains": "draft" } } }"#).expect("filter");
    assert_eq!(
        filter,
        Filter::Not(Box::new(Filter::And(vec![Filter::field(
            "title",
            Condition::Contains("draft".into())
        )])))
    );
}

#[test]
fn list_operations() {
    let filter = Filter::parse(r#"{ "id": { "in": [1, 2], "notIn": [] } }"#).expect("filter");
    assert_eq!(
        filter,
        Filter::And(vec![
            Filter::field("id", Condition::In(vec![json!(1), json!(2)])),
            Filter::field("id", Condition::NotIn(vec![])),
        ])
    );
}

#[test]
fn malformed_filters_are_rejected() {
    for text in [
        r#"[1, 2]"#,
        r#"{ "id": [1, 2] }"#,
        r#"{ "id": { "between": [1, 2] } }"#,
        r#"{ "id": { "in": 3 } }"#,
        r#"{ "name": { "contains": 3 } }"#,
        r#"{ "posts": { "some": { "title": "x" } } }"#,
    ] {
        let result = Filter::parse(text);
        assert!(
            matches!(result, Err(SoftscopeError::Filter { .. })),
            "expected a filter error for {text}, got {result:?}"
        );
    }
}

#[test]
fn filter_json_form_is_stable() {
    let filter = Filter::And(vec![Filter::equals("email", "a@example.com"), Filter::is_null("deletedAt")]);
    assert_eq!(
        serde_json::to_value(&filter).expect("json"),
        json!({ "AND": [{ "email": "a@example.com" }, { "deletedAt": null }] })
    );
    assert_eq!(filter.to_string(), r#"{"AND":[{"email":"a@example.com"},{"deletedAt":null}]}"#);
}

#[test]
fn selections_are_flags_or_trees() {
    let parsed = args(json!({
        "include": {
            "posts": { "where": { "title": "x" }, "take": 1 },
            "author": true,
            "comments": false
        }
    }));
    let include = parsed.include.expect("include");
    assert_eq!(include.get("author"), Some(&Selection::Flag(true)));
    assert_eq!(include.get("comments"), Some(&Selection::Flag(false)));
    assert!(!include["comments"].is_requested());
    assert_eq!(
        include.get("posts"),
        Some(&Selection::nested(
            FindManyArgs::new().with_filter(Filter::equals("title", "x")).with_take(1)
        ))
    );
}

#[test]
fn order_by_accepts_object_or_list() {
    let single = args(json!({ "orderBy": { "id": "desc" } }));
    assert_eq!(single.order_by, vec![OrderBy::desc("id")]);

    let several = args(json!({ "orderBy": [{ "name": "asc" }, { "id": "desc" }] }));
    assert_eq!(several.order_by, vec![OrderBy::asc("name"), OrderBy::desc("id")]);
    assert_eq!(several.order_by[1].direction, Direction::Desc);

    assert!(serde_json::from_value::<FindManyArgs>(json!({ "orderBy": { "id": "up" } })).is_err());
    assert!(serde_json::from_value::<FindManyArgs>(json!({ "orderBy": ["id"] })).is_err());
}

#[test]
fn unknown_options_are_carried() {
    let parsed = args(json!({ "where": { "id": 1 }, "distinct": ["email"], "cursor": { "id": 4 } }));
    assert_eq!(parsed.options.get("distinct"), Some(&json!(["email"])));
    assert_eq!(parsed.options.get("cursor"), Some(&json!({ "id": 4 })));

    let written = serde_json::to_value(&parsed).expect("json");
    assert_eq!(written, json!({ "where": { "id": 1 }, "distinct": ["email"], "cursor": { "id": 4 } }));
}

#[test]
fn empty_object_is_default_args() {
    assert_eq!(args(json!({})), FindManyArgs::default());
}
