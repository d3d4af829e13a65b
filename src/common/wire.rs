//! JSON shapes shared by every HTTP surface

use crate::common::Error;
use serde::{Deserialize, Serialize};

/// Boolean answer (`hasBlock`, `isLeader`, `isCrashed`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: bool,
}

impl Answer {
    pub fn new(answer: bool) -> Self {
        Self { answer }
    }
}

/// Error body written by `Error::into_response`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

/// Turn a non-success HTTP response back into an [`Error`]
pub async fn error_from_response(resp: reqwest::Response) -> Error {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => match body.error.as_str() {
            "unavailable" => Error::Unavailable,
            "not_found" => Error::BlockNotFound(body.message),
            "invalid_request" => Error::InvalidRequest(body.message),
            "invalid_config" => Error::InvalidConfig(body.message),
            "timeout" => Error::Timeout(body.message),
            "block_store" => Error::BlockStore(body.message),
            _ => Error::Http(format!("{}: {}", status, body.message)),
        },
        Err(_) if status == reqwest::StatusCode::SERVICE_UNAVAILABLE => Error::Unavailable,
        Err(_) => Error::Http(status.to_string()),
    }
}
