//! Block store server

use crate::blockstore::http::{create_router, BlockState};
use crate::blockstore::store::BlockStore;
use crate::common::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct BlockServer {
    store: Arc<BlockStore>,
    threads: usize,
}

impl BlockServer {
    pub fn new(store: BlockStore, threads: usize) -> Self {
        Self {
            store: Arc::new(store),
            threads,
        }
    }

    pub async fn serve(self, bind_addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        self.serve_on(listener, crate::shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("Starting block store");
        tracing::info!("  HTTP API: {}", addr);
        tracing::info!("  Blocks: {}", self.store.len());
        tracing::info!("  Concurrency: {}", self.threads);

        let router = create_router(BlockState::new(self.store), self.threads);

        tracing::info!("✓ Block store ready");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Block store stopped");
        Ok(())
    }
}
