//! Content-addressed block storage
//!
//! Blocks are keyed by their SHA-256 hex digest. The store recomputes the
//! digest of every incoming block and refuses data that does not match the
//! key it was sent under.

use crate::blockstore::client::BlockStoreClient;
use crate::common::{content_hash, Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// A content block: `hash == content_hash(data)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub data: Bytes,
}

impl Block {
    /// Build a block from raw data, computing its hash
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            hash: content_hash(&data),
            data,
        }
    }

    /// Check that the hash matches the content
    pub fn verify(&self) -> Result<()> {
        let actual = content_hash(&self.data);
        if actual != self.hash {
            return Err(Error::HashMismatch {
                expected: self.hash.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Trait for key-value storage backends
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Bytes>>;
    fn put(&self, key: &str, value: Bytes) -> Result<()>;
    fn contains(&self, key: &str) -> Result<bool>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory backend (default)
#[derive(Default)]
pub struct MemBackend {
    map: RwLock<HashMap<String, Bytes>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemBackend {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, value: Bytes) -> Result<()> {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(key.to_string()).or_insert(value);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.contains_key(key))
    }

    fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Sled backend
#[cfg(feature = "sled-backend")]
pub struct SledBackend {
    db: sled::Db,
}

#[cfg(feature = "sled-backend")]
impl SledBackend {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self { db })
    }
}

#[cfg(feature = "sled-backend")]
impl KvBackend for SledBackend {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.db
            .get(key.as_bytes())
            .map(|v| v.map(|ivec| Bytes::copy_from_slice(&ivec)))
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn put(&self, key: &str, value: Bytes) -> Result<()> {
        // Content-addressed: an existing value under the same key is identical.
        self.db
            .insert(key.as_bytes(), value.as_ref())
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.db
            .contains_key(key.as_bytes())
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn len(&self) -> usize {
        self.db.len()
    }
}

/// Block store over a pluggable backend
pub struct BlockStore {
    backend: Box<dyn KvBackend>,
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl BlockStore {
    pub fn new(backend: Box<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemBackend::new()))
    }

    #[cfg(feature = "sled-backend")]
    pub fn open_sled(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(Box::new(SledBackend::open(path)?)))
    }

    pub fn has(&self, hash: &str) -> Result<bool> {
        self.backend.contains(hash)
    }

    /// Store a block after verifying its hash.
    ///
    /// Returns `true` if the block was new. Storing an existing hash is a
    /// successful no-op.
    pub fn put(&self, block: &Block) -> Result<bool> {
        block.verify()?;
        if self.backend.contains(&block.hash)? {
            return Ok(false);
        }
        self.backend.put(&block.hash, block.data.clone())?;
        Ok(true)
    }

    pub fn get(&self, hash: &str) -> Result<Option<Block>> {
        Ok(self.backend.get(hash)?.map(|data| Block {
            hash: hash.to_string(),
            data,
        }))
    }

    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }
}

#[async_trait::async_trait]
impl BlockStoreClient for BlockStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn has_block(&self, hash: &str) -> Result<bool> {
        self.has(hash)
    }

    async fn store_block(&self, block: &Block) -> Result<()> {
        self.put(block).map(|_| ())
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Block>> {
        self.get(hash)
    }
}
