//! WAL Replication Scanner
//!
//! The core of replication: a single forward pass over a log stream that
//! attributes each mutation to its owning table, filters for one replication
//! target, and accumulates a byte-budgeted batch together with a resumable
//! cursor position.

use std::collections::HashSet;
use std::io::Read;

use super::tablet_map::TabletMap;
use crate::error::Result;
use crate::wal::{Mutation, RecordReader, WalRecord};

/// Sentinel value for `entries_consumed` meaning the file is permanently
/// drained: end of stream was reached and the file is closed, so no further
/// data will ever arrive from it.
pub const FULLY_CONSUMED: u64 = u64::MAX;

/// Identifies which peer a source table replicates to, and as what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationTarget {
    /// Name of the remote cluster
    pub peer_name: String,
    /// Table identifier on the remote cluster
    pub remote_identifier: String,
    /// Table identifier on this cluster
    pub source_table_id: String,
}

impl ReplicationTarget {
    pub fn new(
        peer_name: impl Into<String>,
        remote_identifier: impl Into<String>,
        source_table_id: impl Into<String>,
    ) -> Self {
        Self {
            peer_name: peer_name.into(),
            remote_identifier: remote_identifier.into(),
            source_table_id: source_table_id.into(),
        }
    }
}

/// Replication cursor for one (source table, peer) pair.
///
/// `begin` and `end` are ordinals in the sequence of qualifying mutation
/// records, not byte or record offsets. Administrative records and mutations
/// for other tables interleave freely in a log, so only the qualifying
/// sequence gives a watermark that is stable for this target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Qualifying records already shipped to the peer
    pub begin: u64,
    /// Last qualifying ordinal that must be shipped; ignored when
    /// `infinite_end` is set
    pub end: u64,
    /// Ship everything available, with no upper ordinal bound
    pub infinite_end: bool,
    /// The physical file will receive no further writes
    pub closed: bool,
}

impl Status {
    pub fn new(begin: u64, end: u64, infinite_end: bool, closed: bool) -> Self {
        Self {
            begin,
            end,
            infinite_end,
            closed,
        }
    }
}

/// The outcome of one scan invocation.
#[derive(Debug, Clone, Default)]
pub struct WalReplication {
    /// Mutations to ship, in log order
    pub edits: Vec<Mutation>,
    /// Physical records read in this call, or [`FULLY_CONSUMED`] when a
    /// closed file reached end of stream
    pub entries_consumed: u64,
    /// Qualifying mutation records seen in this call, shipped or not
    pub size_in_records: u64,
    /// Total serialized size of `edits`
    pub size_in_bytes: u64,
}

/// Scan session for one physical log.
///
/// Owns the tablet identity map, which is only correct when records are fed
/// in strict log order. One scanner and one reader per log at a time; the
/// caller enforces that exclusivity.
#[derive(Debug, Default)]
pub struct WalScanner {
    tablets: TabletMap,
}

impl WalScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tablet identities learned so far in this session
    pub fn tablets(&self) -> &TabletMap {
        &self.tablets
    }

    /// Read records from `reader` until end of stream, the cursor's end
    /// ordinal, or the byte budget stops the pass, collecting the mutations
    /// that belong to `target`'s source table.
    ///
    /// `known_tablets` carries tablet ids already identified as belonging to
    /// the source table. Matching definitions seen in this call are added to
    /// it, and it backstops identity resolution when a definition was only
    /// seen by an earlier session of the same log. The caller persists it
    /// alongside the cursor.
    ///
    /// The byte budget is a soft cap checked after each inclusion: one
    /// qualifying record is always accepted even if it alone exceeds it.
    pub fn scan<R: Read>(
        &mut self,
        target: &ReplicationTarget,
        reader: &mut RecordReader<R>,
        status: &Status,
        byte_budget: u64,
        known_tablets: &mut HashSet<u32>,
    ) -> Result<WalReplication> {
        let mut qualifying_seen = 0u64;
        let mut entries_consumed = 0u64;
        let mut edits: Vec<Mutation> = Vec::new();
        let mut size_in_records = 0u64;
        let mut size_in_bytes = 0u64;

        loop {
            let record = match reader.read_record()? {
                Some(record) => record,
                None => {
                    if status.closed {
                        // Nothing more will ever be appended to this file.
                        entries_consumed = FULLY_CONSUMED;
                    }
                    break;
                }
            };
            entries_consumed += 1;

            match record {
                WalRecord::DefineTablet { tablet_id, extent } => {
                    if extent.table_id == target.source_table_id {
                        known_tablets.insert(tablet_id);
                    }
                    self.tablets.bind(tablet_id, extent);
                }
                WalRecord::Mutation {
                    tablet_id,
                    mutations,
                    ..
                } => {
                    let owned = match self.tablets.resolve(tablet_id) {
                        Some(extent) => extent.table_id == target.source_table_id,
                        // Definition may have been consumed by an earlier
                        // session of this log.
                        None => known_tablets.contains(&tablet_id),
                    };
                    if !owned {
                        tracing::trace!(tablet_id, "mutation does not belong to target table");
                        continue;
                    }

                    qualifying_seen += 1;
                    if qualifying_seen <= status.begin {
                        // Already shipped by a prior call.
                        size_in_records += 1;
                        continue;
                    }
                    if !status.infinite_end && qualifying_seen > status.end {
                        break;
                    }

                    size_in_records += 1;
                    for mutation in mutations {
                        size_in_bytes += mutation.serialized_size();
                        edits.push(mutation);
                    }
                    if size_in_bytes >= byte_budget {
                        tracing::debug!(
                            size_in_bytes,
                            byte_budget,
                            "byte budget reached, ending scan"
                        );
                        break;
                    }
                }
                WalRecord::Open { .. }
                | WalRecord::CompactionStart { .. }
                | WalRecord::CompactionFinish { .. } => {}
                WalRecord::Unknown { kind, .. } => {
                    tracing::debug!(kind, "skipping unrecognized record kind");
                }
            }
        }

        Ok(WalReplication {
            edits,
            entries_consumed,
            size_in_records,
            size_in_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::TableExtent;

    fn mutation(row: &str) -> Mutation {
        let mut m = Mutation::new(row);
        m.put("", "", 1, "v");
        m
    }

    fn define(tablet_id: u32, table_id: &str) -> WalRecord {
        WalRecord::DefineTablet {
            tablet_id,
            extent: TableExtent::full_range(table_id),
        }
    }

    fn mutation_record(tablet_id: u32, row: &str) -> WalRecord {
        WalRecord::Mutation {
            tablet_id,
            filename: format!("/wals/host+9997/{}", uuid::Uuid::new_v4()),
            mutations: vec![mutation(row)],
        }
    }

    fn encode(records: &[WalRecord]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for record in records {
            record.write_to(&mut bytes).unwrap();
        }
        bytes
    }

    /// Nine records interleaving two tables, an unbound tablet id, and
    /// administrative markers.
    fn mixed_log() -> Vec<u8> {
        encode(&[
            define(1, "1"),
            mutation_record(1, "row"),
            define(2, "2"),
            WalRecord::Open {
                tserver_session: "foobar".to_string(),
            },
            mutation_record(99, "badrow"),
            WalRecord::CompactionStart {
                tablet_id: 2,
                filename: "/tables/1/t-000001/A000001.rf".to_string(),
            },
            define(3, "1"),
            WalRecord::CompactionFinish { tablet_id: 6 },
            mutation_record(3, "row"),
        ])
    }

    #[test]
    fn test_only_chooses_mutations_for_desired_table() {
        let log = mixed_log();
        let mut reader = RecordReader::new(log.as_slice());
        let mut scanner = WalScanner::new();
        let mut tids = HashSet::new();

        let status = Status::new(0, 0, true, false);
        let target = ReplicationTarget::new("peer", "1", "1");
        let repl = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();

        assert_eq!(repl.entries_consumed, 9);
        assert_eq!(repl.edits.len(), 2);
        assert_eq!(repl.size_in_records, 2);
        assert_ne!(repl.size_in_bytes, 0);
        assert!(repl.edits.iter().all(|m| m.row == b"row"));
        assert_eq!(tids, HashSet::from([1, 3]));
    }

    #[test]
    fn test_closed_file_reports_drained_sentinel() {
        let log = mixed_log();
        let mut reader = RecordReader::new(log.as_slice());
        let mut scanner = WalScanner::new();
        let mut tids = HashSet::new();

        let status = Status::new(0, 0, true, true);
        let target = ReplicationTarget::new("peer", "1", "1");
        let repl = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();

        assert_eq!(repl.entries_consumed, FULLY_CONSUMED);
        assert_eq!(repl.edits.len(), 2);
        assert_eq!(repl.size_in_records, 2);
        assert_ne!(repl.size_in_bytes, 0);
    }

    #[test]
    fn test_end_of_stream_on_closed_empty_file() {
        let mut reader = RecordReader::new(&[] as &[u8]);
        let mut scanner = WalScanner::new();
        let mut tids = HashSet::new();

        let status = Status::new(100, 0, true, true);
        let target = ReplicationTarget::new("peer", "1", "1");
        let repl = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();

        assert_eq!(repl.entries_consumed, FULLY_CONSUMED);
        assert!(repl.edits.is_empty());
        assert_eq!(repl.size_in_records, 0);
        assert_eq!(repl.size_in_bytes, 0);
    }

    #[test]
    fn test_end_of_stream_on_open_empty_file() {
        let mut reader = RecordReader::new(&[] as &[u8]);
        let mut scanner = WalScanner::new();
        let mut tids = HashSet::new();

        let status = Status::new(100, 0, true, false);
        let target = ReplicationTarget::new("peer", "1", "1");
        let repl = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();

        assert_eq!(repl.entries_consumed, 0);
        assert!(repl.edits.is_empty());
    }

    #[test]
    fn test_byte_budget_accepts_one_oversized_record() {
        let log = mixed_log();
        let mut reader = RecordReader::new(log.as_slice());
        let mut scanner = WalScanner::new();
        let mut tids = HashSet::new();

        let status = Status::new(0, 0, true, false);
        let target = ReplicationTarget::new("peer", "1", "1");
        let repl = scanner
            .scan(&target, &mut reader, &status, 1, &mut tids)
            .unwrap();

        // The first qualifying mutation alone exceeds the one byte budget
        // but is still shipped; the scan stops right after it.
        assert_eq!(repl.edits.len(), 1);
        assert_eq!(repl.entries_consumed, 2);
        assert!(repl.size_in_bytes > 1);
    }

    #[test]
    fn test_restart_in_file_knows_about_previous_defines() {
        let log = encode(&[
            define(1, "1"),
            mutation_record(1, "row"),
            mutation_record(1, "row"),
        ]);
        let mut reader = RecordReader::new(log.as_slice());
        let mut tids = HashSet::new();

        let status = Status::new(0, 0, true, false);
        let target = ReplicationTarget::new("peer", "1", "1");

        // First pass stops at the byte budget after one mutation.
        let mut scanner = WalScanner::new();
        let repl = scanner
            .scan(&target, &mut reader, &status, 1, &mut tids)
            .unwrap();
        assert_eq!(repl.entries_consumed, 2);
        assert_eq!(repl.edits.len(), 1);
        assert_eq!(repl.size_in_records, 1);

        // A fresh session (map lost) picks up from the same stream and
        // attributes the remaining mutation through the carried tablet ids.
        let mut scanner = WalScanner::new();
        let repl = scanner
            .scan(&target, &mut reader, &status, 1, &mut tids)
            .unwrap();
        assert_eq!(repl.entries_consumed, 1);
        assert_eq!(repl.edits.len(), 1);
        assert_eq!(repl.size_in_records, 1);
    }

    #[test]
    fn test_reopened_stream_resume_is_contiguous() {
        let records = vec![
            define(1, "1"),
            mutation_record(1, "a"),
            mutation_record(1, "b"),
            mutation_record(1, "c"),
        ];
        let log = encode(&records);
        let target = ReplicationTarget::new("peer", "1", "1");

        // First call ships the first two qualifying records.
        let mut tids = HashSet::new();
        let mut scanner = WalScanner::new();
        let mut reader = RecordReader::new(log.as_slice());
        let status = Status::new(0, 2, false, false);
        let first = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();
        assert_eq!(first.edits.len(), 2);
        assert_eq!(first.edits[0].row, b"a");
        assert_eq!(first.edits[1].row, b"b");

        // After a restart the file is reread from the start with the begin
        // watermark advanced; the next slice follows with no gap or overlap.
        let mut scanner = WalScanner::new();
        let mut reader = RecordReader::new(log.as_slice());
        let status = Status::new(2, 0, true, false);
        let second = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();
        assert_eq!(second.edits.len(), 1);
        assert_eq!(second.edits[0].row, b"c");
        // The skipped prefix still counts as seen.
        assert_eq!(second.size_in_records, 3);
    }

    #[test]
    fn test_finite_end_stops_the_scan() {
        let log = encode(&[
            define(1, "1"),
            mutation_record(1, "a"),
            mutation_record(1, "b"),
            mutation_record(1, "c"),
            mutation_record(1, "d"),
        ]);
        let mut reader = RecordReader::new(log.as_slice());
        let mut scanner = WalScanner::new();
        let mut tids = HashSet::new();

        let status = Status::new(1, 3, false, false);
        let target = ReplicationTarget::new("peer", "1", "1");
        let repl = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();

        assert_eq!(repl.edits.len(), 2);
        assert_eq!(repl.edits[0].row, b"b");
        assert_eq!(repl.edits[1].row, b"c");
        // Stopped while reading the fourth qualifying record.
        assert_eq!(repl.entries_consumed, 5);
        assert_eq!(repl.size_in_records, 3);
    }

    #[test]
    fn test_rebound_tablet_no_longer_qualifies() {
        let log = encode(&[
            define(1, "1"),
            define(1, "2"),
            mutation_record(1, "row"),
        ]);
        let mut reader = RecordReader::new(log.as_slice());
        let mut scanner = WalScanner::new();
        let mut tids = HashSet::new();

        let status = Status::new(0, 0, true, false);
        let target = ReplicationTarget::new("peer", "1", "1");
        let repl = scanner
            .scan(&target, &mut reader, &status, u64::MAX, &mut tids)
            .unwrap();

        // The redefinition is authoritative even though the id was matched
        // earlier in the stream.
        assert!(repl.edits.is_empty());
        assert_eq!(repl.entries_consumed, 3);
        assert_eq!(repl.size_in_records, 0);
    }
}
