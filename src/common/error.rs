//! Error types for blocksync
//!
//! Protocol outcomes (old version, missing blocks, not leader, replication
//! failure) are values of [`crate::metadata::WriteOutcome`], not errors. This
//! enum only carries conditions a caller cannot act on by re-reading state.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Fault injection ===
    #[error("Replica unavailable (crashed)")]
    Unavailable,

    // === Block store Errors ===
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Block store error: {0}")]
    BlockStore(String),

    #[error("Storage backend error: {0}")]
    Storage(String),

    // === Network Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // === Request Errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Transport(_) | Error::Unavailable | Error::BlockStore(_)
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::BlockNotFound(_) => StatusCode::NOT_FOUND,
            Error::HashMismatch { .. } | Error::InvalidRequest(_) | Error::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::BlockStore(_) | Error::Transport(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable tag used in JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Unavailable => "unavailable",
            Error::BlockNotFound(_) => "not_found",
            Error::HashMismatch { .. } => "hash_mismatch",
            Error::BlockStore(_) => "block_store",
            Error::Storage(_) => "storage",
            Error::Transport(_) => "transport",
            Error::Http(_) => "http",
            Error::InvalidRequest(_) => "invalid_request",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Internal(_) => "internal",
            Error::Timeout(_) => "timeout",
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.to_http_status(), axum::Json(body)).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
