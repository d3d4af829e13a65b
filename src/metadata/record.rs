//! File records and write outcomes

use serde::{Deserialize, Serialize};

/// Blocklist entry marking a deleted file. Never a valid content hash.
pub const TOMBSTONE: &str = "0";

/// A filename's current (version, blocklist) pair.
///
/// Version 0 means the file has never been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub version: u64,
    #[serde(default)]
    pub blocklist: Vec<String>,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, version: u64, blocklist: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            version,
            blocklist,
        }
    }

    /// Record returned for a filename that was never written
    pub fn absent(filename: impl Into<String>) -> Self {
        Self::new(filename, 0, Vec::new())
    }

    pub fn tombstone(filename: impl Into<String>, version: u64) -> Self {
        Self::new(filename, version, vec![TOMBSTONE.to_string()])
    }

    pub fn is_tombstone(&self) -> bool {
        self.blocklist.len() == 1 && self.blocklist[0] == TOMBSTONE
    }

    /// Live file: written at least once and not deleted
    pub fn is_live(&self) -> bool {
        self.version > 0 && !self.is_tombstone()
    }
}

/// Result of a conditional write.
///
/// Each variant carries exactly the payload that applies to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Committed at `version`
    Ok { version: u64 },
    /// Proposed version was not `current_version + 1`
    OldVersion { current_version: u64 },
    /// Version check passed but these blocks are absent from the block store
    MissingBlocks {
        current_version: u64,
        missing: Vec<String>,
    },
    /// This replica does not accept writes; retry against `leader`
    NotLeader { leader: String },
    /// Quorum not reached; nothing changed anywhere
    ReplicationFailed { current_version: u64 },
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Ok { .. })
    }

    /// The version the file is at after this outcome, when known
    pub fn current_version(&self) -> Option<u64> {
        match self {
            WriteOutcome::Ok { version } => Some(*version),
            WriteOutcome::OldVersion { current_version }
            | WriteOutcome::MissingBlocks {
                current_version, ..
            }
            | WriteOutcome::ReplicationFailed { current_version } => Some(*current_version),
            WriteOutcome::NotLeader { .. } => None,
        }
    }
}

impl std::fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOutcome::Ok { version } => write!(f, "OK({})", version),
            WriteOutcome::OldVersion { current_version } => {
                write!(f, "OLD_VERSION({})", current_version)
            }
            WriteOutcome::MissingBlocks {
                current_version,
                missing,
            } => write!(
                f,
                "MISSING_BLOCKS({}, {} missing)",
                current_version,
                missing.len()
            ),
            WriteOutcome::NotLeader { leader } => write!(f, "NOT_LEADER(leader={})", leader),
            WriteOutcome::ReplicationFailed { current_version } => {
                write!(f, "REPLICATION_FAILED({})", current_version)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstone() {
        let t = FileRecord::tombstone("cat.txt", 2);
        assert!(t.is_tombstone());
        assert!(!t.is_live());
        assert_eq!(t.blocklist, vec!["0".to_string()]);

        assert!(!FileRecord::absent("x").is_live());
        assert!(FileRecord::new("x", 1, vec![]).is_live());
    }

    #[test]
    fn test_outcome_json_shape() {
        let o = WriteOutcome::MissingBlocks {
            current_version: 0,
            missing: vec!["ab".into()],
        };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["result"], "missing_blocks");
        assert_eq!(json["current_version"], 0);
        assert_eq!(json["missing"][0], "ab");

        let ok: WriteOutcome = serde_json::from_str(r#"{"result":"ok","version":3}"#).unwrap();
        assert_eq!(ok, WriteOutcome::Ok { version: 3 });
        assert_eq!(ok.current_version(), Some(3));
    }
}
