//! Demo schema and the scenario data used by the binary and the tests.
//!
//! Three users, one of them soft-deleted. The first user owns an active and a
//! soft-deleted post; the deleted user owns one post of their own.

use serde_json::{Value, json};
use tracing::info;

use crate::args::Filter;
use crate::client::{Client, QueryExecutor, Row};
use crate::datatype::{ScalarType, now};
use crate::error::Result;
use crate::persist::Persistor;
use crate::schema::{DELETION_MARKER, EntityModel, FieldModel, Schema};

pub const ACTIVE_USER_EMAIL: &str = "active@example.com";
pub const ACTIVE_USER_2_EMAIL: &str = "active2@example.com";
pub const DELETED_USER_EMAIL: &str = "deleted@example.com";
pub const ACTIVE_POST_TITLE: &str = "Active post";
pub const DELETED_POST_TITLE: &str = "Deleted post";
pub const ORPHANED_POST_TITLE: &str = "Post by a deleted user";

pub fn demo_schema() -> Schema {
    Schema::new(vec![
        EntityModel::new("User")
            .field(FieldModel::id("id"))
            .field(FieldModel::scalar("email", ScalarType::String).unique())
            .field(FieldModel::scalar("name", ScalarType::String).optional())
            .field(FieldModel::scalar(DELETION_MARKER, ScalarType::DateTime).optional())
            .field(FieldModel::relation_list("posts", "Post", "UserPosts")),
        EntityModel::new("Post")
            .field(FieldModel::id("id"))
            .field(FieldModel::scalar("title", ScalarType::String))
            .field(FieldModel::scalar("authorId", ScalarType::Int))
            .field(FieldModel::relation_one("author", "User", "UserPosts").references("authorId", "id"))
            .field(FieldModel::scalar(DELETION_MARKER, ScalarType::DateTime).optional()),
    ])
}

pub fn reset_and_seed_scenario_data(client: &Client<Persistor>) -> Result<()> {
    client.with_deleted().reset()?;

    let active = client.create("User", &row(json!({ "email": ACTIVE_USER_EMAIL, "name": "Active User" })))?;
    client.create("User", &row(json!({ "email": ACTIVE_USER_2_EMAIL, "name": "Second Active User" })))?;
    let deleted = client.create("User", &row(json!({ "email": DELETED_USER_EMAIL, "name": "Deleted User" })))?;

    client.create("Post", &row(json!({ "title": ACTIVE_POST_TITLE, "authorId": active["id"] })))?;
    let deleted_post = client.create("Post", &row(json!({ "title": DELETED_POST_TITLE, "authorId": active["id"] })))?;
    client.create("Post", &row(json!({ "title": ORPHANED_POST_TITLE, "authorId": deleted["id"] })))?;

    mark_deleted(client, "User", &deleted["id"])?;
    mark_deleted(client, "Post", &deleted_post["id"])?;

    info!("scenario data seeded");
    Ok(())
}

/// Soft-deletes one record by id. This is a plain update of the marker.
pub fn mark_deleted<E: QueryExecutor>(executor: &E, entity: &str, id: &Value) -> Result<Row> {
    let mut data = Row::new();
    data.insert(DELETION_MARKER.to_string(), now());
    executor.update(entity, &Filter::equals("id", id.clone()), &data)
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}
