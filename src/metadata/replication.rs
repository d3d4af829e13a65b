//! Leader-driven propose/commit replication
//!
//! For every write the leader accepts locally it runs one round:
//!
//! 1. **Propose** the candidate record to every follower in parallel, each
//!    call bounded by the propose timeout. A follower stages the record
//!    (invisible to its readers) and acks, or fails.
//! 2. **Decide** as soon as `1 + acks >= floor(N/2) + 1` or that has become
//!    impossible.
//! 3. **Commit or abort** on every follower that acked. Proposals still in
//!    flight at decision time are drained in the background and get the same
//!    verdict when they land.
//!
//! There is no log and no catch-up: a follower that misses a round stays at
//! its last committed record until a later round reaches it.

use crate::common::{quorum, Result};
use crate::metadata::record::FileRecord;
use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Phase-1 message: stage `record` under `txn_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub txn_id: String,
    pub record: FileRecord,
}

/// Phase-2 message (commit or abort)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnRef {
    pub txn_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeAck {
    pub ack: bool,
}

/// Leader's handle on one follower
#[async_trait]
pub trait ReplicaClient: Send + Sync {
    /// Address used in logs
    fn addr(&self) -> &str;
    async fn propose(&self, proposal: &Proposal) -> Result<bool>;
    async fn commit(&self, txn_id: &str) -> Result<()>;
    async fn abort(&self, txn_id: &str) -> Result<()>;
}

/// Follower-side records proposed but not yet committed
#[derive(Default)]
pub struct StagingArea {
    staged: Mutex<HashMap<String, FileRecord>>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `record`, dropping any older proposal for the same filename.
    ///
    /// Returns `false` and stages nothing when an equal or newer version of
    /// the file is already staged; a late proposal must not displace one this
    /// follower has acked since.
    pub fn stage(&self, txn_id: String, record: FileRecord) -> bool {
        let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        let superseded = staged
            .values()
            .any(|r| r.filename == record.filename && r.version >= record.version);
        if superseded {
            return false;
        }
        staged.retain(|_, r| r.filename != record.filename);
        staged.insert(txn_id, record);
        true
    }

    pub fn take(&self, txn_id: &str) -> Option<FileRecord> {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(txn_id)
    }

    pub fn len(&self) -> usize {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type ProposeTask = JoinHandle<(usize, bool)>;

/// Fans proposals out to the configured followers
pub struct Replicator {
    followers: Vec<Arc<dyn ReplicaClient>>,
    cluster_size: usize,
    timeout: Duration,
}

impl Replicator {
    /// `cluster_size` counts the leader
    pub fn new(
        followers: Vec<Arc<dyn ReplicaClient>>,
        cluster_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            followers,
            cluster_size,
            timeout,
        }
    }

    /// Follower acks required on top of the leader's own vote
    pub fn followers_needed(&self) -> usize {
        quorum(self.cluster_size).saturating_sub(1)
    }

    /// Run phase 1 and decide. The caller applies locally on success and
    /// then calls [`Round::finish`].
    pub async fn propose(&self, record: &FileRecord) -> Round {
        let started = Instant::now();
        let txn_id = Uuid::new_v4().to_string();
        let proposal = Arc::new(Proposal {
            txn_id: txn_id.clone(),
            record: record.clone(),
        });

        let mut pending: FuturesUnordered<ProposeTask> = FuturesUnordered::new();
        for (idx, follower) in self.followers.iter().enumerate() {
            let follower = follower.clone();
            let proposal = proposal.clone();
            let timeout = self.timeout;
            pending.push(tokio::spawn(async move {
                let acked = match tokio::time::timeout(timeout, follower.propose(&proposal)).await
                {
                    Ok(Ok(ack)) => ack,
                    Ok(Err(e)) => {
                        tracing::debug!(follower = %follower.addr(), "Propose failed: {}", e);
                        false
                    }
                    Err(_) => {
                        tracing::debug!(follower = %follower.addr(), ?timeout, "Propose timed out");
                        false
                    }
                };
                (idx, acked)
            }));
        }

        let needed = self.followers_needed();
        let total = self.followers.len();
        let mut acked = Vec::new();
        let mut refused = 0usize;

        while acked.len() < needed && total - refused >= needed {
            match pending.next().await {
                Some(Ok((idx, true))) => acked.push(idx),
                Some(Ok((_, false))) | Some(Err(_)) => refused += 1,
                None => break,
            }
        }

        let committed = acked.len() >= needed;
        tracing::debug!(
            txn_id = %txn_id,
            filename = %record.filename,
            version = record.version,
            acks = acked.len(),
            needed,
            committed,
            "Replication round decided"
        );

        Round {
            txn_id,
            committed,
            acked,
            needed,
            pending,
            followers: self.followers.clone(),
            timeout: self.timeout,
            started,
        }
    }
}

/// A decided replication round awaiting its phase-2 signals
pub struct Round {
    txn_id: String,
    committed: bool,
    acked: Vec<usize>,
    needed: usize,
    pending: FuturesUnordered<ProposeTask>,
    followers: Vec<Arc<dyn ReplicaClient>>,
    timeout: Duration,
    started: Instant,
}

impl Round {
    pub fn committed(&self) -> bool {
        self.committed
    }

    pub fn txn_id(&self) -> &str {
        &self.txn_id
    }

    /// Followers that acked before the decision
    pub fn acks(&self) -> usize {
        self.acked.len()
    }

    pub fn needed(&self) -> usize {
        self.needed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Send commit (or abort) to every follower that acked in time and hand
    /// late proposals to a background task that does the same.
    pub async fn finish(self) {
        let Round {
            txn_id,
            committed,
            acked,
            mut pending,
            followers,
            timeout,
            ..
        } = self;

        join_all(
            acked
                .iter()
                .map(|&idx| signal(followers[idx].clone(), &txn_id, committed, timeout)),
        )
        .await;

        if pending.is_empty() {
            return;
        }
        tokio::spawn(async move {
            while let Some(res) = pending.next().await {
                if let Ok((idx, true)) = res {
                    signal(followers[idx].clone(), &txn_id, committed, timeout).await;
                }
            }
        });
    }
}

async fn signal(follower: Arc<dyn ReplicaClient>, txn_id: &str, commit: bool, timeout: Duration) {
    let (phase, res) = if commit {
        ("commit", tokio::time::timeout(timeout, follower.commit(txn_id)).await)
    } else {
        ("abort", tokio::time::timeout(timeout, follower.abort(txn_id)).await)
    };
    match res {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(follower = %follower.addr(), txn_id, phase, "Signal failed: {}", e)
        }
        Err(_) => tracing::warn!(follower = %follower.addr(), txn_id, phase, "Signal timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted follower: fixed answer after a fixed delay
    struct Scripted {
        addr: String,
        ack: Option<bool>,
        delay: Duration,
        commits: AtomicUsize,
        aborts: AtomicUsize,
    }

    impl Scripted {
        fn new(addr: &str, ack: Option<bool>, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                addr: addr.to_string(),
                ack,
                delay: Duration::from_millis(delay_ms),
                commits: AtomicUsize::new(0),
                aborts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReplicaClient for Scripted {
        fn addr(&self) -> &str {
            &self.addr
        }

        async fn propose(&self, _proposal: &Proposal) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            self.ack.ok_or(Error::Unavailable)
        }

        async fn commit(&self, _txn_id: &str) -> Result<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn abort(&self, _txn_id: &str) -> Result<()> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn replicator(followers: &[Arc<Scripted>], timeout_ms: u64) -> Replicator {
        let clients: Vec<Arc<dyn ReplicaClient>> = followers
            .iter()
            .map(|f| f.clone() as Arc<dyn ReplicaClient>)
            .collect();
        Replicator::new(
            clients,
            followers.len() + 1,
            Duration::from_millis(timeout_ms),
        )
    }

    fn record() -> FileRecord {
        FileRecord::new("cat.txt", 1, vec!["h".into()])
    }

    #[tokio::test]
    async fn test_single_node_commits_alone() {
        let r = Replicator::new(Vec::new(), 1, Duration::from_millis(10));
        let round = r.propose(&record()).await;
        assert!(round.committed());
        assert_eq!(round.needed(), 0);
        round.finish().await;
    }

    #[tokio::test]
    async fn test_quorum_with_one_follower_down() {
        let b = Scripted::new("b", Some(true), 0);
        let c = Scripted::new("c", None, 0);
        let round = replicator(&[b.clone(), c.clone()], 200).propose(&record()).await;
        assert!(round.committed());
        round.finish().await;
        assert_eq!(b.commits.load(Ordering::SeqCst), 1);
        assert_eq!(c.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_quorum_aborts_ackers() {
        let b = Scripted::new("b", Some(true), 0);
        let c = Scripted::new("c", None, 0);
        let d = Scripted::new("d", Some(false), 0);
        let e = Scripted::new("e", None, 0);
        // N = 5, quorum 3, only one follower ack
        let round = replicator(&[b.clone(), c, d, e], 200)
            .propose(&record())
            .await;
        assert!(!round.committed());
        round.finish().await;
        // b may land after the decision, in which case the drain aborts it
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(b.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(b.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_decides_before_slow_follower_times_out() {
        let fast = Scripted::new("fast", Some(true), 0);
        let slow = Scripted::new("slow", Some(true), 300);
        let r = replicator(&[fast.clone(), slow.clone()], 2_000);

        let started = Instant::now();
        let round = r.propose(&record()).await;
        assert!(round.committed());
        assert!(started.elapsed() < Duration::from_millis(250));
        round.finish().await;

        // Late ack still gets its commit from the background drain
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fast.commits.load(Ordering::SeqCst), 1);
        assert_eq!(slow.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_nack() {
        let slow = Scripted::new("slow", Some(true), 500);
        let down = Scripted::new("down", None, 0);
        let r = replicator(&[slow, down], 50);
        let round = r.propose(&record()).await;
        assert!(!round.committed());
        assert!(round.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_staging_keeps_latest_per_file() {
        let staging = StagingArea::new();
        assert!(staging.stage("t1".into(), FileRecord::new("a", 1, vec![])));
        assert!(staging.stage("t2".into(), FileRecord::new("b", 1, vec![])));
        assert!(staging.stage("t3".into(), FileRecord::new("a", 2, vec![])));
        assert_eq!(staging.len(), 2);
        assert!(staging.take("t1").is_none());
        assert_eq!(staging.take("t3").unwrap().version, 2);
        assert!(staging.take("t3").is_none());
    }

    #[test]
    fn test_staging_refuses_late_older_version() {
        let staging = StagingArea::new();
        assert!(staging.stage("t3".into(), FileRecord::new("a", 3, vec![])));
        assert!(!staging.stage("t2".into(), FileRecord::new("a", 2, vec![])));
        assert!(!staging.stage("t3b".into(), FileRecord::new("a", 3, vec![])));
        assert_eq!(staging.len(), 1);
        assert!(staging.take("t2").is_none());
        assert_eq!(staging.take("t3").unwrap().version, 3);

        // Once taken, the filename is free again
        assert!(staging.stage("t4".into(), FileRecord::new("a", 2, vec![])));
    }
}
