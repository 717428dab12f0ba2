//! Replication Executor
//!
//! Drives one scan-and-ship attempt against a peer. The network client is
//! injected, so the executor stays independent of the wire protocol and can
//! skip the round trip entirely when a scan yields nothing to send.

use std::collections::HashSet;
use std::io::Read;

use super::scanner::{ReplicationTarget, Status, WalScanner};
use super::writer::write_batch;
use crate::config::PeerCredentials;
use crate::error::Result;
use crate::wal::RecordReader;

/// Capability to ship one serialized edit batch to a remote table.
///
/// Implementations own connection handling and the send timeout; a failed
/// send surfaces as an error and the caller reships the same batch later.
/// Delivery is at least once, with batch boundaries stable across retries.
pub trait ReplicaClient {
    /// Ship a batch, returning the bytes the peer acknowledged
    fn replicate_log(
        &mut self,
        remote_identifier: &str,
        credentials: &PeerCredentials,
        batch: &[u8],
    ) -> Result<u64>;
}

/// Aggregate outcome of one replication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplicationStats {
    /// Mutations actually transmitted to the peer
    pub mutations_sent: u64,
    /// Serialized bytes transmitted
    pub bytes_sent: u64,
    /// Qualifying records consumed by the scan but not transmitted
    pub consumed_but_unsent: u64,
}

/// One replication attempt for a (source table, peer) pair.
///
/// Borrows the session state owned by the caller; nothing here persists
/// between attempts, so the caller commits cursor progress only after an
/// attempt returns successfully.
pub struct ReplicaExecutor<'a, R> {
    scanner: &'a mut WalScanner,
    reader: &'a mut RecordReader<R>,
    target: &'a ReplicationTarget,
    status: &'a Status,
    byte_budget: u64,
    known_tablets: &'a mut HashSet<u32>,
    local_name: &'a str,
    credentials: &'a PeerCredentials,
}

impl<'a, R: Read> ReplicaExecutor<'a, R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: &'a mut WalScanner,
        reader: &'a mut RecordReader<R>,
        target: &'a ReplicationTarget,
        status: &'a Status,
        byte_budget: u64,
        known_tablets: &'a mut HashSet<u32>,
        local_name: &'a str,
        credentials: &'a PeerCredentials,
    ) -> Self {
        Self {
            scanner,
            reader,
            target,
            status,
            byte_budget,
            known_tablets,
            local_name,
            credentials,
        }
    }

    /// Scan one batch and ship it if there is anything to send.
    pub fn execute<C: ReplicaClient>(&mut self, client: &mut C) -> Result<ReplicationStats> {
        let batch = self.scanner.scan(
            self.target,
            self.reader,
            self.status,
            self.byte_budget,
            self.known_tablets,
        )?;

        if batch.edits.is_empty() {
            // Nothing to transmit; the peer is never contacted for an empty
            // batch. The stats still carry the consumed-and-filtered volume.
            tracing::debug!(
                peer = %self.target.peer_name,
                consumed = batch.size_in_records,
                "scan produced no edits, skipping peer call"
            );
            return Ok(ReplicationStats {
                mutations_sent: 0,
                bytes_sent: 0,
                consumed_but_unsent: batch.size_in_records,
            });
        }

        let mut payload = Vec::new();
        let summary = write_batch(&mut payload, &batch.edits, self.target, self.local_name)?;
        if summary.mutations_written == 0 {
            // Every edit had already traversed this peer.
            return Ok(ReplicationStats {
                mutations_sent: 0,
                bytes_sent: 0,
                consumed_but_unsent: batch.size_in_records,
            });
        }

        client.replicate_log(&self.target.remote_identifier, self.credentials, &payload)?;
        tracing::debug!(
            peer = %self.target.peer_name,
            mutations = summary.mutations_written,
            bytes = summary.bytes_written,
            "shipped edit batch"
        );

        Ok(ReplicationStats {
            mutations_sent: summary.mutations_written,
            bytes_sent: summary.bytes_written,
            consumed_but_unsent: batch
                .size_in_records
                .saturating_sub(summary.mutations_written),
        })
    }
}
