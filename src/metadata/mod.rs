//! Metadata replicas
//!
//! Every replica keeps its own [`FileVersionTable`]. Clients write through the
//! statically configured leader, which runs a propose/commit round over the
//! followers before a write becomes visible; followers refuse client writes.

pub mod client;
pub mod control;
pub mod coordinator;
pub mod http;
pub mod peer_client;
pub mod record;
pub mod replication;
pub mod server;
pub mod table;

pub use client::MetadataClient;
pub use control::NodeControl;
pub use coordinator::MetadataNode;
pub use record::{FileRecord, WriteOutcome, TOMBSTONE};
pub use replication::{Proposal, ReplicaClient, Replicator, StagingArea};
pub use server::MetadataServer;
pub use table::FileVersionTable;
