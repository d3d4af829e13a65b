//! Content-addressed block store
//!
//! A flat `hash -> bytes` service with three operations (has, store, get).
//! The metadata tier only ever asks it whether blocks are present.

pub mod client;
pub mod http;
pub mod server;
pub mod store;

pub use client::{BlockStoreClient, HttpBlockClient};
pub use server::BlockServer;
pub use store::{Block, BlockStore, KvBackend, MemBackend};
