use serde_json::{Value, json};
use softscope::SoftscopeError;
use softscope::args::{Filter, FindManyArgs, OrderBy, Selection};
use softscope::client::{Client, QueryExecutor, Row, extend_with_soft_delete};
use softscope::datatype::ScalarType;
use softscope::persist::{PersistenceMode, Persistor};
use softscope::schema::{EntityModel, FieldModel, Schema};
use softscope::seed::*;

fn seeded() -> Client<Persistor> {
    let schema = demo_schema();
    let persistor = Persistor::new(PersistenceMode::InMemory, &schema).expect("persistor");
    let client = extend_with_soft_delete(persistor, &schema);
    reset_and_seed_scenario_data(&client).expect("seed");
    client
}

fn row(value: Value) -> Row {
    serde_json::from_value(value).expect("row")
}

fn titles(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .expect("list")
        .iter()
        .map(|post| post["title"].as_str().expect("title"))
        .collect()
}

#[test]
fn find_many_scopes_root_and_include() {
    let client = seeded();
    let args = FindManyArgs::new()
        .with_order(OrderBy::asc("id"))
        .include_relation(
            "posts",
            Selection::nested(FindManyArgs::new().with_order(OrderBy::asc("id"))),
        );
    let users = client.find_many("User", &args).expect("users");
    let emails: Vec<_> = users.iter().map(|u| u["email"].as_str().expect("email")).collect();
    assert_eq!(emails, vec![ACTIVE_USER_EMAIL, ACTIVE_USER_2_EMAIL]);
    assert!(users.iter().all(|u| u["deletedAt"].is_null()));

    assert_eq!(titles(&users[0]["posts"]), vec![ACTIVE_POST_TITLE]);
    assert_eq!(titles(&users[1]["posts"]), Vec::<&str>::new());
}

#[test]
fn include_flag_is_scoped_too() {
    let client = seeded();
    let args = FindManyArgs::new()
        .with_filter(Filter::equals("email", ACTIVE_USER_EMAIL))
        .include_relation("posts", Selection::flag());
    let users = client.find_many("User", &args).expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(titles(&users[0]["posts"]), vec![ACTIVE_POST_TITLE]);
}

#[test]
fn select_keeps_only_requested_fields() {
    let client = seeded();
    let args = FindManyArgs::new()
        .with_order(OrderBy::asc("id"))
        .select_field("email", Selection::flag())
        .select_field("posts", Selection::nested(FindManyArgs::new().select_field("title", Selection::flag())));
    let users = client.find_many("User", &args).expect("users");
    assert_eq!(users.len(), 2);
    let first = &users[0];
    assert_eq!(first.keys().map(String::as_str).collect::<Vec<_>>(), vec!["email", "posts"]);
    assert_eq!(first["posts"], json!([{ "title": ACTIVE_POST_TITLE }]));
}

#[test]
fn singular_relation_reaches_deleted_author() {
    let client = seeded();
    let args = FindManyArgs::new()
        .with_filter(Filter::equals("title", ORPHANED_POST_TITLE))
        .include_relation("author", Selection::flag());
    let posts = client.find_many("Post", &args).expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["author"]["email"], json!(DELETED_USER_EMAIL));
    assert!(!posts[0]["author"]["deletedAt"].is_null());
}

#[test]
fn with_deleted_sees_everything() {
    let client = seeded();
    let deleted = client
        .with_deleted()
        .find_many("User", &FindManyArgs::new().with_filter(Filter::is_not_null("deletedAt")))
        .expect("deleted users");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0]["email"], json!(DELETED_USER_EMAIL));

    let args = FindManyArgs::new()
        .with_filter(Filter::equals("email", ACTIVE_USER_EMAIL))
        .include_relation("posts", Selection::nested(FindManyArgs::new().with_order(OrderBy::asc("id"))));
    let active = client.with_deleted().find_first("User", &args).expect("lookup").expect("active user");
    assert_eq!(titles(&active["posts"]), vec![ACTIVE_POST_TITLE, DELETED_POST_TITLE]);
}

#[test]
fn scoped_read_of_deleted_rows_is_empty() {
    let client = seeded();
    let args = FindManyArgs::new().with_filter(Filter::is_not_null("deletedAt"));
    assert!(client.find_many("User", &args).expect("users").is_empty());
}

#[test]
fn singular_lookups_and_count_are_not_scoped() {
    let client = seeded();
    let by_email = FindManyArgs::new().with_filter(Filter::equals("email", DELETED_USER_EMAIL));

    let unique = client.find_unique("User", &by_email).expect("unique").expect("deleted user");
    assert!(!unique["deletedAt"].is_null());
    let first = client.find_first("User", &by_email).expect("first");
    assert!(first.is_some());

    assert_eq!(client.count("User", None).expect("count"), 3);
    assert_eq!(client.count("Post", None).expect("count"), 3);
    assert_eq!(client.count("Post", Some(&Filter::is_null("deletedAt"))).expect("count"), 2);
}

#[test]
fn find_unique_requires_a_unique_selector() {
    let client = seeded();
    let by_name = FindManyArgs::new().with_filter(Filter::equals("name", "Active User"));
    let result = client.find_unique("User", &by_name);
    assert!(matches!(result, Err(SoftscopeError::Execution(_))), "got {result:?}");
}

#[test]
fn writes_pass_through() {
    let client = seeded();
    let created = client
        .create("User", &row(json!({ "email": "runtime@example.com", "name": "Runtime User" })))
        .expect("create");
    assert!(created["deletedAt"].is_null());
    let id = created["id"].clone();

    let updated = client
        .update("User", &Filter::equals("id", id.clone()), &row(json!({ "name": "Runtime User Updated" })))
        .expect("update");
    assert_eq!(updated["name"], json!("Runtime User Updated"));

    let removed = client.delete("User", &Filter::equals("id", id.clone())).expect("delete");
    assert_eq!(removed["email"], json!("runtime@example.com"));

    let lookup = FindManyArgs::new().with_filter(Filter::equals("id", id.clone()));
    assert!(client.with_deleted().find_unique("User", &lookup).expect("lookup").is_none());

    let again = client.delete("User", &Filter::equals("id", id));
    assert!(matches!(again, Err(SoftscopeError::RecordNotFound { .. })), "got {again:?}");
}

#[test]
fn soft_deleting_hides_from_scoped_reads() {
    let client = seeded();
    let user = client
        .find_first("User", &FindManyArgs::new().with_filter(Filter::equals("email", ACTIVE_USER_2_EMAIL)))
        .expect("lookup")
        .expect("user");
    let marked = mark_deleted(&client, "User", &user["id"]).expect("mark");
    assert!(marked["deletedAt"].is_string());

    let users = client.find_many("User", &FindManyArgs::new()).expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(client.with_deleted().find_many("User", &FindManyArgs::new()).expect("all").len(), 3);
}

#[test]
fn reseeding_is_repeatable() {
    let client = seeded();
    reset_and_seed_scenario_data(&client).expect("second seed");
    assert_eq!(client.count("User", None).expect("count"), 3);
    assert_eq!(client.find_many("User", &FindManyArgs::new()).expect("users").len(), 2);
}

#[test]
fn hooks_are_registered_once() {
    let client = seeded();
    assert_eq!(client.hook_names(), vec!["soft-delete-scope"]);
    let plain = Client::from_shared(client.shared_executor());
    assert!(plain.hook_names().is_empty());
    assert_eq!(plain.find_many("User", &FindManyArgs::new()).expect("users").len(), 3);
}

fn forum_schema() -> Schema {
    Schema::new(vec![
        EntityModel::new("User")
            .field(FieldModel::id("id"))
            .field(FieldModel::scalar("email", ScalarType::String).unique())
            .field(FieldModel::scalar("deletedAt", ScalarType::DateTime).optional())
            .field(FieldModel::relation_list("posts", "Post", "UserPosts")),
        EntityModel::new("Post")
            .field(FieldModel::id("id"))
            .field(FieldModel::scalar("title", ScalarType::String))
            .field(FieldModel::scalar("authorId", ScalarType::Int))
            .field(FieldModel::scalar("deletedAt", ScalarType::DateTime).optional())
            .field(FieldModel::relation_one("author", "User", "UserPosts").references("authorId", "id"))
            .field(FieldModel::relation_list("comments", "Comment", "PostComments")),
        EntityModel::new("Comment")
            .field(FieldModel::id("id"))
            .field(FieldModel::scalar("body", ScalarType::String))
            .field(FieldModel::scalar("postId", ScalarType::Int))
            .field(FieldModel::scalar("deletedAt", ScalarType::DateTime).optional())
            .field(FieldModel::relation_one("post", "Post", "PostComments").references("postId", "id")),
    ])
}

#[test]
fn three_level_include_is_scoped_at_every_level() {
    let schema = forum_schema();
    let persistor = Persistor::new(PersistenceMode::InMemory, &schema).expect("persistor");
    let client = extend_with_soft_delete(persistor, &schema);

    let user = client.create("User", &row(json!({ "email": "u@example.com" }))).expect("user");
    let kept = client
        .create("Post", &row(json!({ "title": "kept", "authorId": user["id"] })))
        .expect("post");
    let hidden = client
        .create("Post", &row(json!({ "title": "hidden", "authorId": user["id"] })))
        .expect("post");
    client
        .create("Comment", &row(json!({ "body": "visible", "postId": kept["id"] })))
        .expect("comment");
    let gone = client
        .create("Comment", &row(json!({ "body": "gone", "postId": kept["id"] })))
        .expect("comment");
    client
        .create("Comment", &row(json!({ "body": "on hidden post", "postId": hidden["id"] })))
        .expect("comment");
    mark_deleted(&client, "Post", &hidden["id"]).expect("mark post");
    mark_deleted(&client, "Comment", &gone["id"]).expect("mark comment");

    let args = FindManyArgs::new().include_relation(
        "posts",
        Selection::nested(FindManyArgs::new().include_relation("comments", Selection::flag())),
    );
    let users = client.find_many("User", &args).expect("users");
    assert_eq!(users.len(), 1);
    let posts = users[0]["posts"].as_array().expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], json!("kept"));
    let comments = posts[0]["comments"].as_array().expect("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["body"], json!("visible"));

    let everything = client.with_deleted().find_many("Comment", &FindManyArgs::new()).expect("all");
    assert_eq!(everything.len(), 3);
}

#[test]
fn parsed_arguments_drive_the_executor() {
    let client = seeded();
    let args: FindManyArgs = serde_json::from_value(json!({
        "where": { "email": { "endsWith": "@example.com" } },
        "orderBy": { "id": "desc" },
        "take": 1,
        "include": { "posts": true }
    }))
    .expect("args");
    let users = client.find_many("User", &args).expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], json!(ACTIVE_USER_2_EMAIL));
}

#[test]
fn unsupported_read_options_are_rejected() {
    let client = seeded();
    for body in [
        json!({ "wehre": { "email": "nobody@example.com" } }),
        json!({ "cursor": { "id": 2 } }),
        json!({ "include": { "posts": { "distinct": ["title"] } } }),
    ] {
        let args: FindManyArgs = serde_json::from_value(body.clone()).expect("args");
        let result = client.find_many("User", &args);
        assert!(matches!(result, Err(SoftscopeError::Execution(_))), "{body} gave {result:?}");
        let unscoped = client.with_deleted().find_many("User", &args);
        assert!(unscoped.is_err(), "{body} gave {unscoped:?} without scoping");
    }
    let args: FindManyArgs = serde_json::from_value(json!({ "wehre": {}, "cursor": 1 })).expect("args");
    match client.find_many("User", &args) {
        Err(SoftscopeError::Execution(message)) => {
            assert!(message.contains("wehre") && message.contains("cursor"), "{message}");
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
}

#[test]
fn with_deleted_lists_posts_of_the_deleted_user() {
    let client = seeded();
    let deleted = client
        .find_unique("User", &FindManyArgs::new().with_filter(Filter::equals("email", DELETED_USER_EMAIL)))
        .expect("lookup")
        .expect("deleted user");
    let by_author = FindManyArgs::new().with_filter(Filter::equals("authorId", deleted["id"].clone()));
    let posts = client.with_deleted().find_many("Post", &by_author).expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], json!(ORPHANED_POST_TITLE));
    // the post itself is live, so the scoped read finds it too
    assert_eq!(client.find_many("Post", &by_author).expect("posts").len(), 1);
}

#[test]
fn relations_load_for_every_parent() {
    let client = seeded();
    // two posts share one author
    let args = FindManyArgs::new()
        .with_order(OrderBy::asc("id"))
        .include_relation("author", Selection::nested(FindManyArgs::new().select_field("email", Selection::flag())));
    let posts = client.with_deleted().find_many("Post", &args).expect("posts");
    let authors: Vec<_> = posts.iter().map(|p| p["author"].clone()).collect();
    assert_eq!(
        authors,
        vec![
            json!({ "email": ACTIVE_USER_EMAIL }),
            json!({ "email": ACTIVE_USER_EMAIL }),
            json!({ "email": DELETED_USER_EMAIL }),
        ]
    );

    // paging is per parent row
    let paged = FindManyArgs::new()
        .with_order(OrderBy::asc("id"))
        .include_relation(
            "posts",
            Selection::nested(FindManyArgs::new().with_order(OrderBy::desc("id")).with_take(1)),
        );
    let users = client.with_deleted().find_many("User", &paged).expect("users");
    assert_eq!(titles(&users[0]["posts"]), vec![DELETED_POST_TITLE]);
    assert_eq!(titles(&users[1]["posts"]), Vec::<&str>::new());
    assert_eq!(titles(&users[2]["posts"]), vec![ORPHANED_POST_TITLE]);
}
