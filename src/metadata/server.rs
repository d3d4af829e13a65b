//! Metadata replica server

use crate::blockstore::{BlockStoreClient, HttpBlockClient};
use crate::common::{ClusterConfig, ClusterView, Result};
use crate::metadata::coordinator::MetadataNode;
use crate::metadata::http::{create_router, MetaState};
use crate::metadata::peer_client::HttpReplicaClient;
use crate::metadata::replication::ReplicaClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct MetadataServer {
    node: Arc<MetadataNode>,
    threads: usize,
}

impl MetadataServer {
    /// Wire replica `number` (1-based) of `config` to the HTTP block store
    /// and, on the leader, to every follower.
    pub fn new(config: &ClusterConfig, number: usize) -> Result<Self> {
        let view = config.view(number)?;
        let blocks: Arc<dyn BlockStoreClient> =
            Arc::new(HttpBlockClient::new(view.block_store.clone())?);

        let mut followers: Vec<Arc<dyn ReplicaClient>> = Vec::new();
        if view.is_leader() {
            for addr in &view.followers {
                followers.push(Arc::new(HttpReplicaClient::new(
                    addr.clone(),
                    view.propose_timeout,
                )?));
            }
        }

        Ok(Self::from_node(
            MetadataNode::new(view, blocks, followers),
            config.threads,
        ))
    }

    pub fn from_node(node: MetadataNode, threads: usize) -> Self {
        Self {
            node: Arc::new(node),
            threads,
        }
    }

    pub fn node(&self) -> &Arc<MetadataNode> {
        &self.node
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
        let view: &ClusterView = self.node.view();
        tracing::info!("Starting metadata replica {}", view.number);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Role: {}", view.role);
        tracing::info!("  Block store: {}", view.block_store);
        tracing::info!("  Cluster size: {} (quorum {})", view.cluster_size, view.quorum());
        tracing::info!("  Concurrency: {}", self.threads);

        let router = create_router(MetaState { node: self.node.clone() }, self.threads);

        tracing::info!("✓ Metadata replica ready ({})", view.role);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Metadata replica stopped");
        Ok(())
    }
}
