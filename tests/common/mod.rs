//! In-process cluster harness shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use blocksync::blockstore::{Block, BlockStore};
use blocksync::common::{ClusterConfig, Result};
use blocksync::metadata::{MetadataNode, Proposal, ReplicaClient};
use std::sync::Arc;
use std::time::Duration;

/// Follower reached by direct calls instead of HTTP
pub struct LocalReplica {
    addr: String,
    node: Arc<MetadataNode>,
    delay: Duration,
    late_version: Option<(u64, Duration)>,
    commit_delay: Duration,
}

impl LocalReplica {
    pub fn new(addr: String, node: Arc<MetadataNode>) -> Self {
        Self {
            addr,
            node,
            delay: Duration::ZERO,
            late_version: None,
            commit_delay: Duration::ZERO,
        }
    }

    /// Deliver the proposal for `version` only after `delay`
    pub fn late_for_version(mut self, version: u64, delay: Duration) -> Self {
        self.late_version = Some((version, delay));
        self
    }

    /// Deliver commit signals only after `delay`
    pub fn slow_commits(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }
}

#[async_trait]
impl ReplicaClient for LocalReplica {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn propose(&self, proposal: &Proposal) -> Result<bool> {
        let mut delay = self.delay;
        if let Some((version, late)) = self.late_version {
            if proposal.record.version == version {
                delay += late;
            }
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.node.handle_propose(proposal.clone())
    }

    async fn commit(&self, txn_id: &str) -> Result<()> {
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        self.node.handle_commit(txn_id)
    }

    async fn abort(&self, txn_id: &str) -> Result<()> {
        self.node.handle_abort(txn_id)
    }
}

pub struct TestCluster {
    pub config: ClusterConfig,
    pub blocks: Arc<BlockStore>,
    /// `nodes[0]` is the leader
    pub nodes: Vec<Arc<MetadataNode>>,
}

impl TestCluster {
    pub fn leader(&self) -> &Arc<MetadataNode> {
        &self.nodes[0]
    }

    /// Replica by 1-based number
    pub fn node(&self, number: usize) -> &Arc<MetadataNode> {
        &self.nodes[number - 1]
    }

    pub fn store(&self, data: &'static [u8]) -> Block {
        let block = Block::new(data);
        self.blocks.put(&block).expect("store block");
        block
    }
}

pub fn config(n: usize, propose_timeout_ms: u64) -> ClusterConfig {
    ClusterConfig {
        block_store: "http://blocks".to_string(),
        metadata: (1..=n).map(|i| format!("http://metadata{}", i)).collect(),
        leader: 1,
        threads: 4,
        propose_timeout_ms,
        log_level: "debug".to_string(),
    }
}

/// `n` replicas, replica 1 leads
pub fn cluster(n: usize) -> TestCluster {
    cluster_with(n, 200, &[])
}

/// Like [`cluster`], but followers listed in `slow` (by number) delay every
/// proposal by one second
pub fn cluster_with(n: usize, propose_timeout_ms: u64, slow: &[usize]) -> TestCluster {
    cluster_shaped(n, propose_timeout_ms, |number, replica| {
        if slow.contains(&number) {
            LocalReplica {
                delay: Duration::from_secs(1),
                ..replica
            }
        } else {
            replica
        }
    })
}

/// `shape` adjusts how the leader reaches follower `number`
pub fn cluster_shaped(
    n: usize,
    propose_timeout_ms: u64,
    shape: impl Fn(usize, LocalReplica) -> LocalReplica,
) -> TestCluster {
    let config = config(n, propose_timeout_ms);
    let blocks = Arc::new(BlockStore::in_memory());

    let mut followers = Vec::new();
    let mut clients: Vec<Arc<dyn ReplicaClient>> = Vec::new();
    for number in 2..=n {
        let view = config.view(number).expect("follower view");
        let addr = view.self_addr.clone();
        let node = Arc::new(MetadataNode::new(view, blocks.clone(), Vec::new()));
        clients.push(Arc::new(shape(number, LocalReplica::new(addr, node.clone()))));
        followers.push(node);
    }

    let leader = Arc::new(MetadataNode::new(
        config.view(1).expect("leader view"),
        blocks.clone(),
        clients,
    ));

    let mut nodes = vec![leader];
    nodes.extend(followers);
    TestCluster {
        config,
        blocks,
        nodes,
    }
}
