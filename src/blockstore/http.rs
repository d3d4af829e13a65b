//! HTTP API for the block store

use crate::blockstore::store::{Block, BlockStore};
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::wire::Answer;
use crate::common::{Error, MetricsRegistry, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

/// Upper bound on a single block upload
pub const MAX_BLOCK_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct BlockState {
    pub store: Arc<BlockStore>,
    pub metrics: Arc<MetricsRegistry>,
}

impl BlockState {
    pub fn new(store: Arc<BlockStore>) -> Self {
        Self {
            store,
            metrics: Arc::new(MetricsRegistry::new("blocksync_block")),
        }
    }
}

/// Build the block store router; `max_concurrency` bounds in-flight requests
pub fn create_router(state: BlockState, max_concurrency: usize) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/metrics", get(metrics))
        .route("/blocks/:hash", get(get_block).put(store_block))
        .route("/blocks/:hash/exists", get(has_block))
        .layer(DefaultBodyLimit::max(MAX_BLOCK_BYTES))
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(max_concurrency.max(1)))
        .with_state(state)
}

async fn ping() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn metrics(State(state): State<BlockState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

async fn has_block(
    State(state): State<BlockState>,
    Path(hash): Path<String>,
) -> Result<Json<Answer>> {
    state.metrics.block_lookups.inc();
    Ok(Json(Answer::new(state.store.has(&hash)?)))
}

async fn store_block(
    State(state): State<BlockState>,
    Path(hash): Path<String>,
    body: Bytes,
) -> Result<StatusCode> {
    let size = body.len() as u64;
    let block = Block { hash, data: body };
    if state.store.put(&block)? {
        state.metrics.blocks_stored.inc();
        state.metrics.bytes_stored.add(size);
        tracing::debug!(hash = %block.hash, size, "Stored block");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_block(
    State(state): State<BlockState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse> {
    state.metrics.block_lookups.inc();
    match state.store.get(&hash)? {
        Some(block) => Ok((
            [(header::CONTENT_TYPE, "application/octet-stream")],
            block.data,
        )),
        None => Err(Error::BlockNotFound(hash)),
    }
}
