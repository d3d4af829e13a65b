//! # blocksync
//!
//! A replicated file-metadata coordinator over a content-addressed block
//! store:
//! - Clients split files into blocks and upload them keyed by SHA-256
//! - A file is a `(version, blocklist)` record under its name
//! - Writes are conditional: version must be `current + 1`, blocks must exist
//! - A statically configured leader replicates every accepted write with a
//!   propose/commit round and commits only on a majority
//! - Crash/restore hooks make node failure testable
//!
//! ## Architecture
//!
//! ```text
//!            client
//!              │ HTTP (readFile / modifyFile / deleteFile)
//!   ┌──────────▼──────────┐   propose/commit   ┌──────────────┐
//!   │  metadata leader    ├───────────────────►│  follower 2  │
//!   │  (version table)    ├───────────────────►│  follower 3  │
//!   └──────────┬──────────┘                    └──────────────┘
//!              │ hasBlock
//!   ┌──────────▼──────────┐
//!   │    block store      │
//!   │  (hash → bytes)     │
//!   └─────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Cluster file
//! ```toml
//! block_store = "http://127.0.0.1:7000"
//! metadata = ["http://127.0.0.1:7001", "http://127.0.0.1:7002", "http://127.0.0.1:7003"]
//! leader = 1
//! threads = 10
//! ```
//!
//! ### Start the services
//! ```bash
//! blocksync-block cluster.toml
//! blocksync-meta cluster.toml --number 1
//! blocksync-meta cluster.toml --number 2
//! blocksync-meta cluster.toml --number 3
//! ```
//!
//! ### Use the CLI
//! ```bash
//! blocksync --config cluster.toml upload ./cat.txt
//! blocksync --config cluster.toml read cat.txt
//! blocksync --config cluster.toml crash --number 3
//! ```

pub mod blockstore;
pub mod common;
pub mod metadata;

pub use blockstore::{Block, BlockServer, BlockStore};
pub use common::{ClusterConfig, Error, Result};
pub use metadata::{FileRecord, MetadataNode, MetadataServer, WriteOutcome};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolves on Ctrl-C (or SIGTERM on unix)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
