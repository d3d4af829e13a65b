//! Per-replica file version table
//!
//! Readers take a short shared lock and clone an `Arc<FileRecord>`; writers
//! swap whole records in. A reader therefore sees either the old record or
//! the new one, never a partially filled blocklist.
//!
//! Writers to the same filename serialize on a per-file async mutex which the
//! coordinator holds across the version check, the block-presence check and
//! the replication round.

use crate::metadata::record::FileRecord;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OwnedMutexGuard;

type LockMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Held while a write to one filename is being decided. The filename's lock
/// entry is removed on drop once nobody else holds or awaits it.
pub struct FileGuard {
    guard: OwnedMutexGuard<()>,
    filename: String,
    locks: Arc<LockMap>,
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in this guard
        if Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) == 2 {
            locks.remove(&self.filename);
        }
    }
}

#[derive(Default)]
pub struct FileVersionTable {
    records: RwLock<HashMap<String, Arc<FileRecord>>>,
    write_locks: Arc<LockMap>,
}

impl FileVersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record, or the version-0 record for unknown names
    pub fn get(&self, filename: &str) -> FileRecord {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        match records.get(filename) {
            Some(rec) => FileRecord::clone(rec),
            None => FileRecord::absent(filename),
        }
    }

    pub fn version(&self, filename: &str) -> u64 {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(filename).map(|r| r.version).unwrap_or(0)
    }

    /// Acquire the write lock for `filename`
    pub async fn lock_file(&self, filename: &str) -> FileGuard {
        let lock = {
            let mut locks = self
                .write_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(filename.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        FileGuard {
            guard: lock.lock_owned().await,
            filename: filename.to_string(),
            locks: self.write_locks.clone(),
        }
    }

    /// Install `record` if it is newer than the stored one.
    ///
    /// Returns `false` (and changes nothing) when the stored version is equal
    /// or greater, so a replica's versions never go backwards.
    pub fn apply(&self, record: FileRecord) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let current = records.get(&record.filename).map(|r| r.version).unwrap_or(0);
        if record.version <= current {
            return false;
        }
        records.insert(record.filename.clone(), Arc::new(record));
        true
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unknown_file_is_version_zero() {
        let table = FileVersionTable::new();
        let rec = table.get("notfound.txt");
        assert_eq!(rec.filename, "notfound.txt");
        assert_eq!(rec.version, 0);
        assert!(rec.blocklist.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_apply_never_goes_backwards() {
        let table = FileVersionTable::new();
        assert!(table.apply(FileRecord::new("a", 1, vec!["h1".into()])));
        assert!(table.apply(FileRecord::new("a", 3, vec!["h3".into()])));
        assert!(!table.apply(FileRecord::new("a", 2, vec!["h2".into()])));
        assert!(!table.apply(FileRecord::new("a", 3, vec!["other".into()])));

        let rec = table.get("a");
        assert_eq!(rec.version, 3);
        assert_eq!(rec.blocklist, vec!["h3".to_string()]);
    }

    #[tokio::test]
    async fn test_file_lock_is_exclusive_per_name() {
        let table = Arc::new(FileVersionTable::new());
        let guard = table.lock_file("a").await;

        // Other filenames are not blocked
        let other = tokio::time::timeout(Duration::from_millis(50), table.lock_file("b")).await;
        assert!(other.is_ok());

        // Same filename waits for the holder
        let same = tokio::time::timeout(Duration::from_millis(50), table.lock_file("a")).await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(50), table.lock_file("a")).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_lock_entries_do_not_outlive_writers() {
        let table = Arc::new(FileVersionTable::new());
        for i in 0..100 {
            let _guard = table.lock_file(&format!("rejected-{}.txt", i)).await;
        }
        assert_eq!(table.write_locks.lock().unwrap().len(), 0);

        // A waiter keeps the entry alive until it is done too
        let first = table.lock_file("a").await;
        let waiter = {
            let table = table.clone();
            tokio::spawn(async move {
                let _guard = table.lock_file("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(table.write_locks.lock().unwrap().len(), 1);
        waiter.await.unwrap();
        assert_eq!(table.write_locks.lock().unwrap().len(), 0);
    }
}
