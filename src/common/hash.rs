//! Content hashing for blocks
//!
//! Blocks are addressed by the lowercase hex SHA-256 digest of their bytes.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Compute SHA-256 of data, return lowercase hex string
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Whether `s` is shaped like a content hash (64 lowercase hex chars)
pub fn is_content_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
