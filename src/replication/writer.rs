//! Cycle-Avoidance Batch Writer
//!
//! Serializes an edit batch for a peer while enforcing the loop-avoidance
//! rule of multi-master replication: a mutation never returns to a cluster
//! it has already traversed, and every shipped mutation is stamped with the
//! local cluster's name so downstream clusters can apply the same rule.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::scanner::ReplicationTarget;
use crate::error::Result;
use crate::wal::Mutation;

/// What a batch serialization produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Mutations that survived the cycle filter and were written
    pub mutations_written: u64,
    /// Bytes written, including the count prefix
    pub bytes_written: u64,
}

/// Write `mutations` to `out` for shipment to `target`.
///
/// Mutations whose source set already names the peer are dropped; survivors
/// gain `local_name` in their source set before encoding. The output is a
/// `u32` survivor count followed by each mutation's standard encoding, so it
/// round-trips through [`read_batch`].
pub fn write_batch<W: Write>(
    out: &mut W,
    mutations: &[Mutation],
    target: &ReplicationTarget,
    local_name: &str,
) -> Result<BatchSummary> {
    let mut survivors: Vec<Mutation> = Vec::with_capacity(mutations.len());
    for mutation in mutations {
        if mutation.replication_sources.contains(&target.peer_name) {
            tracing::trace!(
                peer = %target.peer_name,
                "dropping mutation that already traversed the peer"
            );
            continue;
        }
        let mut mutation = mutation.clone();
        mutation.add_replication_source(local_name);
        survivors.push(mutation);
    }

    if survivors.len() < mutations.len() {
        tracing::debug!(
            dropped = mutations.len() - survivors.len(),
            peer = %target.peer_name,
            "suppressed mutations to avoid a replication cycle"
        );
    }

    out.write_u32::<LittleEndian>(survivors.len() as u32)?;
    let mut bytes_written = 4u64;
    for mutation in &survivors {
        mutation.write_to(out)?;
        bytes_written += mutation.serialized_size();
    }

    Ok(BatchSummary {
        mutations_written: survivors.len() as u64,
        bytes_written,
    })
}

/// Decode a batch produced by [`write_batch`]
pub fn read_batch<R: Read>(input: &mut R) -> Result<Vec<Mutation>> {
    let count = input.read_u32::<LittleEndian>()?;
    let mut mutations = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        mutations.push(Mutation::read_from(input)?);
    }
    Ok(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutations_not_rereplicated_to_peers() {
        let mut plain = Mutation::new("row");
        plain.put("", "", 1, "v");

        let mut seen_by_peer = Mutation::new("row2");
        seen_by_peer.put("", "", 1, "v");
        seen_by_peer.add_replication_source("peer");

        let target = ReplicationTarget::new("peer", "1", "1");
        let mut bytes = Vec::new();
        let summary =
            write_batch(&mut bytes, &[plain, seen_by_peer], &target, "source").unwrap();

        assert_eq!(summary.mutations_written, 1);
        assert_eq!(summary.bytes_written, bytes.len() as u64);

        let shipped = read_batch(&mut bytes.as_slice()).unwrap();
        assert_eq!(shipped.len(), 1);
        assert_eq!(shipped[0].row, b"row");
        assert!(shipped[0].replication_sources.contains("source"));
        assert_eq!(shipped[0].replication_sources.len(), 1);
    }

    #[test]
    fn test_every_written_mutation_gains_local_name() {
        let mut tagged = Mutation::new("row");
        tagged.put("", "", 1, "v");
        tagged.add_replication_source("elsewhere");

        let target = ReplicationTarget::new("peer", "1", "1");
        let mut bytes = Vec::new();
        write_batch(&mut bytes, &[tagged], &target, "source").unwrap();

        let shipped = read_batch(&mut bytes.as_slice()).unwrap();
        assert!(shipped[0].replication_sources.contains("elsewhere"));
        assert!(shipped[0].replication_sources.contains("source"));
    }

    #[test]
    fn test_empty_batch_round_trip() {
        let target = ReplicationTarget::new("peer", "1", "1");
        let mut bytes = Vec::new();
        let summary = write_batch(&mut bytes, &[], &target, "source").unwrap();

        assert_eq!(summary.mutations_written, 0);
        assert_eq!(bytes.len(), 4);
        assert!(read_batch(&mut bytes.as_slice()).unwrap().is_empty());
    }
}
