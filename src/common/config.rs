//! Cluster configuration for blocksync components
//!
//! The cluster layout is static: it is read once at process start and never
//! changes while a node runs. Leadership is part of that layout.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Cluster-wide configuration shared by every process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Block store base URL (e.g. `http://127.0.0.1:7000`)
    pub block_store: String,

    /// Ordered metadata replica base URLs
    pub metadata: Vec<String>,

    /// Leader replica, 1-based index into `metadata`
    #[serde(default = "default_leader")]
    pub leader: usize,

    /// Concurrent request bound per node
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Per-follower timeout for replication RPCs
    #[serde(default = "default_propose_timeout")]
    pub propose_timeout_ms: u64,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_leader() -> usize {
    1
}
fn default_threads() -> usize {
    10
}
fn default_propose_timeout() -> u64 {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Role of a metadata replica, fixed by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Leader,
    Follower,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Follower => write!(f, "follower"),
        }
    }
}

/// Immutable per-node view of the cluster
#[derive(Debug, Clone)]
pub struct ClusterView {
    /// 1-based replica number of this node
    pub number: usize,
    /// Own base URL
    pub self_addr: String,
    pub role: Role,
    /// Leader base URL (used for NOT_LEADER redirects)
    pub leader_addr: String,
    /// Every replica except the leader
    pub followers: Vec<String>,
    /// Total replicas, leader included
    pub cluster_size: usize,
    pub block_store: String,
    pub propose_timeout: Duration,
}

impl ClusterView {
    /// Minimum number of agreeing replicas (leader included) to commit
    pub fn quorum(&self) -> usize {
        quorum(self.cluster_size)
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// Single-replica view, mostly for tests and local runs
    pub fn standalone(block_store: impl Into<String>) -> Self {
        let addr = "http://127.0.0.1:0".to_string();
        Self {
            number: 1,
            self_addr: addr.clone(),
            role: Role::Leader,
            leader_addr: addr,
            followers: Vec::new(),
            cluster_size: 1,
            block_store: block_store.into(),
            propose_timeout: Duration::from_millis(default_propose_timeout()),
        }
    }
}

/// `floor(n / 2) + 1`
pub fn quorum(cluster_size: usize) -> usize {
    cluster_size / 2 + 1
}

impl ClusterConfig {
    /// Load from a TOML file, with `BLOCKSYNC_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("BLOCKSYNC")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("metadata"),
            )
            .build()?;
        let cfg: ClusterConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document directly
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()?;
        let cfg: ClusterConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_store.trim().is_empty() {
            return Err(Error::InvalidConfig("block_store address is empty".into()));
        }
        if self.metadata.is_empty() {
            return Err(Error::InvalidConfig("no metadata replicas configured".into()));
        }
        if self.leader == 0 || self.leader > self.metadata.len() {
            return Err(Error::InvalidConfig(format!(
                "leader {} not in 1..={}",
                self.leader,
                self.metadata.len()
            )));
        }
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be positive".into()));
        }
        if self.propose_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "propose_timeout_ms must be positive".into(),
            ));
        }
        let mut seen = HashSet::new();
        for addr in &self.metadata {
            if !seen.insert(addr.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate replica address {}",
                    addr
                )));
            }
        }
        Ok(())
    }

    /// Base URL of replica `number` (1-based)
    pub fn replica_addr(&self, number: usize) -> Result<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.metadata.get(i))
            .map(String::as_str)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "metadata{} not in config (have {})",
                    number,
                    self.metadata.len()
                ))
            })
    }

    pub fn leader_addr(&self) -> Result<&str> {
        self.replica_addr(self.leader)
    }

    /// Derive the view for replica `number` (1-based)
    pub fn view(&self, number: usize) -> Result<ClusterView> {
        let self_addr = self.replica_addr(number)?.to_string();
        let leader_addr = self.leader_addr()?.to_string();
        let role = if number == self.leader {
            Role::Leader
        } else {
            Role::Follower
        };
        let followers = self
            .metadata
            .iter()
            .enumerate()
            .filter(|(i, _)| i + 1 != self.leader)
            .map(|(_, a)| a.clone())
            .collect();

        Ok(ClusterView {
            number,
            self_addr,
            role,
            leader_addr,
            followers,
            cluster_size: self.metadata.len(),
            block_store: self.block_store.clone(),
            propose_timeout: Duration::from_millis(self.propose_timeout_ms),
        })
    }
}

/// Resolve the socket address a base URL like `http://127.0.0.1:7001` names
pub fn socket_addr_of(base_url: &str) -> Result<SocketAddr> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| Error::InvalidConfig(format!("bad address {}: {}", base_url, e)))?;
    url.socket_addrs(|| None)
        .map_err(|e| Error::InvalidConfig(format!("cannot resolve {}: {}", base_url, e)))?
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidConfig(format!("no address for {}", base_url)))
}
