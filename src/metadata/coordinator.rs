//! Metadata replica: the conditional-write engine
//!
//! A write is accepted iff the proposed version is exactly one past the
//! stored version and every referenced block is present in the block store
//! (deletes skip the block check). On the leader an accepted write becomes
//! visible only after its replication round reaches quorum.

use crate::blockstore::BlockStoreClient;
use crate::common::{is_content_hash, validate_filename, ClusterView, MetricsRegistry, Result, Role};
use crate::metadata::control::NodeControl;
use crate::metadata::record::{FileRecord, WriteOutcome};
use crate::metadata::replication::{Proposal, ReplicaClient, Replicator, StagingArea};
use crate::metadata::table::FileVersionTable;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// What a conditional write installs once accepted
enum Change {
    Blocks(Vec<String>),
    Tombstone,
}

pub struct MetadataNode {
    view: ClusterView,
    control: NodeControl,
    table: FileVersionTable,
    staging: StagingArea,
    blocks: Arc<dyn BlockStoreClient>,
    replicator: Replicator,
    metrics: Arc<MetricsRegistry>,
}

impl MetadataNode {
    /// `followers` is only used when `view.role` is leader
    pub fn new(
        view: ClusterView,
        blocks: Arc<dyn BlockStoreClient>,
        followers: Vec<Arc<dyn ReplicaClient>>,
    ) -> Self {
        let followers = if view.role == Role::Leader {
            followers
        } else {
            Vec::new()
        };
        let replicator = Replicator::new(followers, view.cluster_size, view.propose_timeout);
        Self {
            control: NodeControl::new(view.role),
            view,
            table: FileVersionTable::new(),
            staging: StagingArea::new(),
            blocks,
            replicator,
            metrics: Arc::new(MetricsRegistry::new("blocksync_meta")),
        }
    }

    pub fn view(&self) -> &ClusterView {
        &self.view
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn guard(&self) -> Result<()> {
        let res = self.control.guard();
        if res.is_err() {
            self.metrics.unavailable_rejections.inc();
        }
        res
    }

    // === Client surface ===

    pub fn ping(&self) -> Result<()> {
        self.guard()
    }

    /// Current record, version 0 and empty blocklist for unknown names
    pub fn read_file(&self, filename: &str) -> Result<FileRecord> {
        self.guard()?;
        self.metrics.reads.inc();
        let record = self.table.get(filename);
        tracing::debug!(filename, version = record.version, "Read file");
        Ok(record)
    }

    pub async fn modify_file(&self, proposed: FileRecord) -> Result<WriteOutcome> {
        let FileRecord {
            filename,
            version,
            blocklist,
        } = proposed;
        self.conditional_write(filename, version, Change::Blocks(blocklist))
            .await
    }

    /// Deleting an unknown file behaves like modifying one: only version 1
    /// succeeds, leaving a tombstone at version 1.
    pub async fn delete_file(&self, filename: &str, version: u64) -> Result<WriteOutcome> {
        self.conditional_write(filename.to_string(), version, Change::Tombstone)
            .await
    }

    async fn conditional_write(
        &self,
        filename: String,
        version: u64,
        change: Change,
    ) -> Result<WriteOutcome> {
        self.guard()?;
        validate_filename(&filename)?;

        if !self.control.is_leader() {
            self.metrics.writes_not_leader.inc();
            return Ok(WriteOutcome::NotLeader {
                leader: self.view.leader_addr.clone(),
            });
        }

        let _file = self.table.lock_file(&filename).await;
        let current = self.table.version(&filename);

        if version != current + 1 {
            self.metrics.writes_old_version.inc();
            tracing::debug!(%filename, version, current, "Rejected stale write");
            return Ok(WriteOutcome::OldVersion {
                current_version: current,
            });
        }

        let record = match change {
            Change::Blocks(blocklist) => {
                let missing = self.missing_blocks(&blocklist).await?;
                if !missing.is_empty() {
                    self.metrics.writes_missing_blocks.inc();
                    tracing::debug!(%filename, version, missing = missing.len(), "Blocks missing");
                    return Ok(WriteOutcome::MissingBlocks {
                        current_version: current,
                        missing,
                    });
                }
                FileRecord::new(filename, version, blocklist)
            }
            Change::Tombstone => FileRecord::tombstone(filename, version),
        };

        let round = self.replicator.propose(&record).await;
        self.metrics.round_latency.observe_duration(round.elapsed());

        if !round.committed() {
            self.metrics.rounds_aborted.inc();
            self.metrics.writes_replication_failed.inc();
            tracing::warn!(
                txn_id = round.txn_id(),
                filename = %record.filename,
                version,
                acks = round.acks(),
                needed = round.needed(),
                "Replication failed, write aborted"
            );
            round.finish().await;
            return Ok(WriteOutcome::ReplicationFailed {
                current_version: current,
            });
        }

        let filename = record.filename.clone();
        let tombstone = record.is_tombstone();
        let txn_id = round.txn_id().to_string();
        self.table.apply(record);
        round.finish().await;

        self.metrics.rounds_committed.inc();
        self.metrics.writes_ok.inc();
        tracing::info!(%txn_id, %filename, version, tombstone, "Committed write");
        Ok(WriteOutcome::Ok { version })
    }

    /// Hashes from `blocklist` absent from the block store, first-seen order,
    /// without duplicates. Entries that are not content hashes can never be
    /// present and are reported without asking the store.
    async fn missing_blocks(&self, blocklist: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = blocklist.iter().filter(|h| seen.insert(*h)).collect();

        let answers = join_all(unique.iter().map(|h| async move {
            if is_content_hash(h) {
                self.blocks.has_block(h).await
            } else {
                Ok(false)
            }
        }))
        .await;

        let mut missing = Vec::new();
        for (hash, present) in unique.into_iter().zip(answers) {
            if !present.map_err(|e| crate::Error::BlockStore(e.to_string()))? {
                missing.push(hash.clone());
            }
        }
        Ok(missing)
    }

    // === Replication surface (follower side) ===

    /// Stage a proposed record. Refused when this node is the leader or
    /// already holds an equal or newer version, committed or staged.
    pub fn handle_propose(&self, proposal: Proposal) -> Result<bool> {
        self.guard()?;
        let Proposal { txn_id, record } = proposal;

        if self.control.is_leader() {
            self.metrics.proposals_rejected.inc();
            tracing::warn!(%txn_id, "Leader received a proposal, refusing");
            return Ok(false);
        }

        let current = self.table.version(&record.filename);
        if record.version <= current {
            self.metrics.proposals_rejected.inc();
            tracing::debug!(%txn_id, filename = %record.filename, version = record.version, current, "Refused stale proposal");
            return Ok(false);
        }

        let filename = record.filename.clone();
        let version = record.version;
        if !self.staging.stage(txn_id.clone(), record) {
            self.metrics.proposals_rejected.inc();
            tracing::debug!(%txn_id, %filename, version, "Refused proposal behind a staged one");
            return Ok(false);
        }

        tracing::debug!(%txn_id, %filename, version, "Staged proposal");
        self.metrics.proposals_staged.inc();
        Ok(true)
    }

    /// Make a staged record visible. Unknown transactions are ignored.
    pub fn handle_commit(&self, txn_id: &str) -> Result<()> {
        self.guard()?;
        match self.staging.take(txn_id) {
            Some(record) => {
                let filename = record.filename.clone();
                let version = record.version;
                if self.table.apply(record) {
                    tracing::debug!(txn_id, %filename, version, "Applied committed record");
                }
            }
            None => tracing::debug!(txn_id, "Commit for unknown transaction"),
        }
        Ok(())
    }

    pub fn handle_abort(&self, txn_id: &str) -> Result<()> {
        self.guard()?;
        if self.staging.take(txn_id).is_some() {
            tracing::debug!(txn_id, "Discarded aborted proposal");
        }
        Ok(())
    }

    // === Fault injection (never gated) ===

    pub fn crash(&self) {
        tracing::warn!(node = self.view.number, "Crash injected");
        self.control.crash();
    }

    pub fn restore(&self) {
        tracing::info!(node = self.view.number, "Restored");
        self.control.restore();
    }

    pub fn is_crashed(&self) -> bool {
        self.control.is_crashed()
    }

    pub fn is_leader(&self) -> bool {
        self.control.is_leader()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::{Block, BlockStore};
    use crate::common::Error;

    fn standalone() -> (MetadataNode, Arc<BlockStore>) {
        let blocks = Arc::new(BlockStore::in_memory());
        let node = MetadataNode::new(
            ClusterView::standalone("mem"),
            blocks.clone(),
            Vec::new(),
        );
        (node, blocks)
    }

    #[tokio::test]
    async fn test_version_check_precedes_block_check() {
        let (node, _blocks) = standalone();
        let b = Block::new(&b"never stored"[..]);
        let out = node
            .modify_file(FileRecord::new("cat.txt", 2, vec![b.hash.clone()]))
            .await
            .unwrap();
        assert_eq!(out, WriteOutcome::OldVersion { current_version: 0 });
    }

    #[tokio::test]
    async fn test_missing_blocks_is_exact_difference() {
        let (node, blocks) = standalone();
        let b0 = Block::new(&b"b0"[..]);
        let b1 = Block::new(&b"b1"[..]);
        let b2 = Block::new(&b"b2"[..]);
        blocks.put(&b1).unwrap();

        let list = vec![b0.hash.clone(), b1.hash.clone(), b2.hash.clone(), b0.hash.clone()];
        let out = node
            .modify_file(FileRecord::new("cat.txt", 1, list))
            .await
            .unwrap();
        assert_eq!(
            out,
            WriteOutcome::MissingBlocks {
                current_version: 0,
                missing: vec![b0.hash, b2.hash],
            }
        );
        assert_eq!(node.read_file("cat.txt").unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_non_hash_entries_are_always_missing() {
        let (node, blocks) = standalone();
        let b = Block::new(&b"stored"[..]);
        blocks.put(&b).unwrap();

        let smuggled = format!("{}/exists?", b.hash);
        let list = vec![b.hash.clone(), smuggled.clone(), "a/b".to_string()];
        let out = node
            .modify_file(FileRecord::new("f.txt", 1, list))
            .await
            .unwrap();
        assert_eq!(
            out,
            WriteOutcome::MissingBlocks {
                current_version: 0,
                missing: vec![smuggled, "a/b".to_string()],
            }
        );
        assert_eq!(node.read_file("f.txt").unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_bad_filename_is_a_request_error_after_the_guard() {
        let (node, _blocks) = standalone();
        assert!(matches!(
            node.modify_file(FileRecord::new("", 1, vec![])).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            node.delete_file("bad\nname", 1).await,
            Err(Error::InvalidRequest(_))
        ));

        node.crash();
        assert!(matches!(
            node.modify_file(FileRecord::new("", 1, vec![])).await,
            Err(Error::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_empty_blocklist_needs_no_blocks() {
        let (node, _blocks) = standalone();
        let out = node
            .modify_file(FileRecord::new("empty.txt", 1, vec![]))
            .await
            .unwrap();
        assert_eq!(out, WriteOutcome::Ok { version: 1 });
    }

    #[tokio::test]
    async fn test_delete_unknown_file_creates_tombstone() {
        let (node, _blocks) = standalone();
        let out = node.delete_file("ghost.txt", 2).await.unwrap();
        assert_eq!(out, WriteOutcome::OldVersion { current_version: 0 });

        let out = node.delete_file("ghost.txt", 1).await.unwrap();
        assert_eq!(out, WriteOutcome::Ok { version: 1 });
        assert!(node.read_file("ghost.txt").unwrap().is_tombstone());
    }

    #[tokio::test]
    async fn test_follower_refuses_writes() {
        let mut view = ClusterView::standalone("mem");
        view.role = Role::Follower;
        view.leader_addr = "http://leader:7001".into();
        let node = MetadataNode::new(view, Arc::new(BlockStore::in_memory()), Vec::new());

        let out = node
            .modify_file(FileRecord::new("cat.txt", 1, vec![]))
            .await
            .unwrap();
        assert_eq!(
            out,
            WriteOutcome::NotLeader {
                leader: "http://leader:7001".into()
            }
        );
        let out = node.delete_file("cat.txt", 1).await.unwrap();
        assert!(matches!(out, WriteOutcome::NotLeader { .. }));
        assert_eq!(node.read_file("cat.txt").unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_crashed_node_rejects_everything_but_control() {
        let (node, _blocks) = standalone();
        node.crash();

        assert!(matches!(node.ping(), Err(Error::Unavailable)));
        assert!(matches!(node.read_file("a"), Err(Error::Unavailable)));
        assert!(matches!(
            node.modify_file(FileRecord::new("a", 1, vec![])).await,
            Err(Error::Unavailable)
        ));
        assert!(matches!(node.delete_file("a", 1).await, Err(Error::Unavailable)));
        assert!(matches!(node.handle_commit("t"), Err(Error::Unavailable)));
        assert!(node.is_crashed());
        assert!(node.is_leader());

        node.restore();
        assert!(node.ping().is_ok());
        assert_eq!(node.metrics().unavailable_rejections.get(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_writers_one_wins() {
        let (node, _blocks) = standalone();
        let node = Arc::new(node);

        let mut handles = Vec::new();
        for i in 0..16 {
            let node = node.clone();
            handles.push(tokio::spawn(async move {
                node.modify_file(FileRecord::new("race.txt", 1, vec![]))
                    .await
                    .map(|o| (i, o))
            }));
        }

        let mut wins = 0;
        for h in handles {
            let (_, outcome) = h.await.unwrap().unwrap();
            match outcome {
                WriteOutcome::Ok { version } => {
                    assert_eq!(version, 1);
                    wins += 1;
                }
                WriteOutcome::OldVersion { current_version } => assert_eq!(current_version, 1),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_follower_staging_rules() {
        let mut view = ClusterView::standalone("mem");
        view.role = Role::Follower;
        let node = MetadataNode::new(view, Arc::new(BlockStore::in_memory()), Vec::new());

        let p1 = Proposal {
            txn_id: "t1".into(),
            record: FileRecord::new("a", 1, vec![]),
        };
        assert!(node.handle_propose(p1).unwrap());
        // Staged, not visible
        assert_eq!(node.read_file("a").unwrap().version, 0);

        node.handle_commit("t1").unwrap();
        assert_eq!(node.read_file("a").unwrap().version, 1);

        let stale = Proposal {
            txn_id: "t2".into(),
            record: FileRecord::new("a", 1, vec!["x".into()]),
        };
        assert!(!node.handle_propose(stale).unwrap());

        let aborted = Proposal {
            txn_id: "t3".into(),
            record: FileRecord::new("a", 2, vec![]),
        };
        assert!(node.handle_propose(aborted).unwrap());
        node.handle_abort("t3").unwrap();
        node.handle_commit("t3").unwrap();
        assert_eq!(node.read_file("a").unwrap().version, 1);
    }

    #[test]
    fn test_late_proposal_cannot_displace_a_newer_staged_one() {
        let mut view = ClusterView::standalone("mem");
        view.role = Role::Follower;
        let node = MetadataNode::new(view, Arc::new(BlockStore::in_memory()), Vec::new());

        let v3 = Proposal {
            txn_id: "t3".into(),
            record: FileRecord::new("a", 3, vec![]),
        };
        let v2 = Proposal {
            txn_id: "t2".into(),
            record: FileRecord::new("a", 2, vec![]),
        };
        assert!(node.handle_propose(v3).unwrap());
        assert!(!node.handle_propose(v2).unwrap());

        node.handle_commit("t3").unwrap();
        node.handle_commit("t2").unwrap();
        assert_eq!(node.read_file("a").unwrap().version, 3);
        assert_eq!(node.metrics().proposals_rejected.get(), 1);
    }
}
