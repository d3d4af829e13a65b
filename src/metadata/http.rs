//! HTTP API for a metadata replica
//!
//! Client routes and internal replication routes go through
//! [`MetadataNode`], whose crash guard runs first in every call. The
//! `/leader` and `/admin/*` routes stay answerable while crashed.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::wire::Answer;
use crate::common::Result;
use crate::metadata::client::ModifyRequest;
use crate::metadata::coordinator::MetadataNode;
use crate::metadata::record::{FileRecord, WriteOutcome};
use crate::metadata::replication::{Proposal, ProposeAck, TxnRef};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct MetaState {
    pub node: Arc<MetadataNode>,
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    version: u64,
}

/// Build the replica router; `max_concurrency` bounds in-flight requests
pub fn create_router(state: MetaState, max_concurrency: usize) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/metrics", get(metrics))
        .route(
            "/files/:name",
            get(read_file).put(modify_file).delete(delete_file),
        )
        .route("/leader", get(is_leader))
        .route("/admin/crash", post(crash))
        .route("/admin/restore", post(restore))
        .route("/admin/crashed", get(is_crashed))
        .route("/internal/propose", post(propose))
        .route("/internal/commit", post(commit))
        .route("/internal/abort", post(abort))
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(max_concurrency.max(1)))
        .with_state(state)
}

async fn ping(State(state): State<MetaState>) -> Result<StatusCode> {
    state.node.ping()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn metrics(State(state): State<MetaState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.node.metrics().to_prometheus(),
    )
}

async fn read_file(
    State(state): State<MetaState>,
    Path(name): Path<String>,
) -> Result<Json<FileRecord>> {
    Ok(Json(state.node.read_file(&name)?))
}

async fn modify_file(
    State(state): State<MetaState>,
    Path(name): Path<String>,
    Json(req): Json<ModifyRequest>,
) -> Result<Json<WriteOutcome>> {
    let proposed = FileRecord::new(name, req.version, req.blocklist);
    Ok(Json(state.node.modify_file(proposed).await?))
}

async fn delete_file(
    State(state): State<MetaState>,
    Path(name): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<WriteOutcome>> {
    Ok(Json(state.node.delete_file(&name, params.version).await?))
}

async fn is_leader(State(state): State<MetaState>) -> Json<Answer> {
    Json(Answer::new(state.node.is_leader()))
}

async fn crash(State(state): State<MetaState>) -> StatusCode {
    state.node.crash();
    StatusCode::NO_CONTENT
}

async fn restore(State(state): State<MetaState>) -> StatusCode {
    state.node.restore();
    StatusCode::NO_CONTENT
}

async fn is_crashed(State(state): State<MetaState>) -> Json<Answer> {
    Json(Answer::new(state.node.is_crashed()))
}

async fn propose(
    State(state): State<MetaState>,
    Json(proposal): Json<Proposal>,
) -> Result<Json<ProposeAck>> {
    let ack = state.node.handle_propose(proposal)?;
    Ok(Json(ProposeAck { ack }))
}

async fn commit(State(state): State<MetaState>, Json(txn): Json<TxnRef>) -> Result<StatusCode> {
    state.node.handle_commit(&txn.txn_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn abort(State(state): State<MetaState>, Json(txn): Json<TxnRef>) -> Result<StatusCode> {
    state.node.handle_abort(&txn.txn_id)?;
    Ok(StatusCode::NO_CONTENT)
}
