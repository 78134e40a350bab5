use std::sync::Arc;
use std::time::Instant;
use axum::{routing::post, Router, Json};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tower_http::cors::{CorsLayer, Any};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::args::FindManyArgs;
use crate::client::{Client, QueryExecutor, Row};
use crate::error::{Result, SoftscopeError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    #[serde(default)]
    pub args: FindManyArgs,
    // reads through the unscoped view when set
    #[serde(default)]
    pub with_deleted: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadResponse {
    fn failed(elapsed_ms: f64, error: String) -> Self {
        Self { status: "error".into(), elapsed_ms, row_count: None, rows: None, count: None, error: Some(error) }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    FindMany,
    FindFirst,
    FindUnique,
    Count,
}
impl Operation {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "find_many" => Some(Self::FindMany),
            "find_first" => Some(Self::FindFirst),
            "find_unique" => Some(Self::FindUnique),
            "count" => Some(Self::Count),
            _ => None,
        }
    }
}

enum Reply {
    Rows(Vec<Row>),
    Count(u64),
}

pub fn router<E: QueryExecutor + 'static>(client: Arc<Client<E>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/:entity/:operation", post(dispatch::<E>))
        .layer(cors)
        .with_state(client)
}

async fn dispatch<E: QueryExecutor + 'static>(
    State(client): State<Arc<Client<E>>>,
    Path((entity, operation)): Path<(String, String)>,
    Json(request): Json<ReadRequest>,
) -> (StatusCode, Json<ReadResponse>) {
    let started = Instant::now();
    let Some(parsed) = Operation::parse(&operation) else {
        let msg = format!("Unknown operation '{operation}'");
        warn!(%msg, "rejected request");
        return (StatusCode::NOT_FOUND, Json(ReadResponse::failed(0.0, msg)));
    };
    let with_deleted = request.with_deleted;
    let target = entity.clone();
    // The executor is synchronous, so the work runs on a blocking thread.
    let outcome = tokio::task::spawn_blocking(move || execute::<E>(&client, &target, parsed, &request)).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match outcome {
        Err(e) => {
            warn!(error=%e, "Join error");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ReadResponse::failed(elapsed_ms, "Join error".into())))
        }
        Ok(Ok(Reply::Rows(rows))) => {
            info!(%entity, ?parsed, with_deleted, ms=elapsed_ms, rows=rows.len(), "read complete");
            let body = ReadResponse { status: "ok".into(), elapsed_ms, row_count: Some(rows.len()), rows: Some(rows), count: None, error: None };
            (StatusCode::OK, Json(body))
        }
        Ok(Ok(Reply::Count(count))) => {
            info!(%entity, with_deleted, ms=elapsed_ms, count, "count complete");
            let body = ReadResponse { status: "ok".into(), elapsed_ms, row_count: None, rows: None, count: Some(count), error: None };
            (StatusCode::OK, Json(body))
        }
        Ok(Err(e)) => {
            let status = match e {
                SoftscopeError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
                SoftscopeError::Filter { .. }
                | SoftscopeError::Execution(_)
                | SoftscopeError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let msg = format!("{e}");
            warn!(%msg, code=%status.as_u16(), "read error");
            (status, Json(ReadResponse::failed(elapsed_ms, msg)))
        }
    }
}

fn execute<E: QueryExecutor>(client: &Client<E>, entity: &str, operation: Operation, request: &ReadRequest) -> Result<Reply> {
    let executor: &dyn QueryExecutor = if request.with_deleted { client.with_deleted() } else { client };
    let args = &request.args;
    Ok(match operation {
        Operation::FindMany => Reply::Rows(executor.find_many(entity, args)?),
        Operation::FindFirst => Reply::Rows(executor.find_first(entity, args)?.into_iter().collect()),
        Operation::FindUnique => Reply::Rows(executor.find_unique(entity, args)?.into_iter().collect()),
        Operation::Count => Reply::Count(executor.count(entity, args.filter.as_ref())?),
    })
}
