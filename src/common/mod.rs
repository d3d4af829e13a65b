//! Common utilities and types shared across blocksync

pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod tracing_middleware;
pub mod utils;
pub mod wire;

pub use config::{quorum, socket_addr_of, ClusterConfig, ClusterView, Role};
pub use error::{Error, Result};
pub use hash::{content_hash, is_content_hash};
pub use metrics::MetricsRegistry;
pub use utils::{encode_filename, encode_path_segment, split_blocks, validate_filename};
