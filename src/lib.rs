//! Walship - Tablet Server WAL Replication
//!
//! A library for shipping tablet server write-ahead-log mutations to remote
//! replication peers. The local WAL is decoded into typed records, mutations
//! are attributed to their owning table through the tablet definitions seen
//! earlier in the stream, and the subset destined for a peer is accumulated
//! into byte-budgeted batches with a resumable cursor.
//!
//! # Architecture
//!
//! Replication runs one scan-and-ship cycle at a time per (source table, peer)
//! pair. A scan reads the log sequentially from wherever the previous scan
//! left off, producing a batch plus consumption statistics; the executor then
//! serializes the batch with cycle-avoidance tagging and ships it through an
//! injected peer client. Progress is committed only between cycles, so a
//! crashed or cancelled cycle reships the same batch.
//!
//! # Features
//!
//! - Versioned, checksummed binary record codec with byte-exact round trips
//! - Incremental tablet-to-table identity tracking across resumed scans
//! - Qualifying-mutation watermarks independent of physical log layout
//! - Replication-source tagging to break multi-master replication loops
//! - Cluster configuration flattening and random volume selection utilities

pub mod cluster;
pub mod config;
pub mod error;
pub mod replication;
pub mod volume;
pub mod wal;

pub use config::ReplicationConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{PeerCredentials, ReplicationConfig};
    pub use crate::error::{Error, Result};
    pub use crate::replication::{
        ReplicaClient, ReplicaExecutor, ReplicationStats, ReplicationTarget, Status, TabletMap,
        WalReplication, WalScanner,
    };
    pub use crate::wal::{Mutation, RecordReader, TableExtent, WalRecord};
}
