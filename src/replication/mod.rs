//! Replication Module
//!
//! Scans the local write-ahead log for mutations owed to a replication peer
//! and ships them in byte-budgeted, cycle-safe batches.

pub mod executor;
pub mod scanner;
pub mod tablet_map;
pub mod writer;

pub use executor::{ReplicaClient, ReplicaExecutor, ReplicationStats};
pub use scanner::{ReplicationTarget, Status, WalReplication, WalScanner, FULLY_CONSUMED};
pub use tablet_map::TabletMap;
pub use writer::{read_batch, write_batch, BatchSummary};
