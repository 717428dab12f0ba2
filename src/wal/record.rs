//! WAL Record Types
//!
//! Defines the records that make up a tablet server write-ahead log and their
//! binary encoding. Each record is framed as
//! `[length: u32][payload][checksum: u32]` where the payload begins with a
//! format version byte and an event kind byte. Encoding is deterministic, so
//! well-formed records round-trip byte for byte.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Current record format version. Decoding any other version is rejected.
pub const RECORD_VERSION: u8 = 2;

/// Event kind codes
pub mod event_kind {
    pub const OPEN: u8 = 0;
    pub const DEFINE_TABLET: u8 = 1;
    pub const MUTATION: u8 = 2;
    pub const COMPACTION_START: u8 = 3;
    pub const COMPACTION_FINISH: u8 = 4;
}

/// The identity of a tablet: its table plus the row range it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExtent {
    /// Identifier of the table this tablet belongs to
    pub table_id: String,
    /// Exclusive upper row bound, `None` for the last tablet of the table
    pub end_row: Option<Vec<u8>>,
    /// End row of the preceding tablet, `None` for the first tablet
    pub prev_end_row: Option<Vec<u8>>,
}

impl TableExtent {
    /// Create an extent covering the full row range of a table
    pub fn full_range(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            end_row: None,
            prev_end_row: None,
        }
    }
}

/// A single column write or delete within a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnUpdate {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: u64,
    pub deleted: bool,
    pub value: Vec<u8>,
}

/// A row mutation destined for a table.
///
/// `replication_sources` lists the clusters this mutation has already
/// traversed. The set is ordered so that encoding stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mutation {
    pub row: Vec<u8>,
    pub updates: Vec<ColumnUpdate>,
    pub replication_sources: BTreeSet<String>,
}

impl Mutation {
    /// Create an empty mutation for a row
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            updates: Vec::new(),
            replication_sources: BTreeSet::new(),
        }
    }

    /// Append a column write
    pub fn put(
        &mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: u64,
        value: impl Into<Vec<u8>>,
    ) {
        self.updates.push(ColumnUpdate {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            deleted: false,
            value: value.into(),
        });
    }

    /// Append a column delete
    pub fn delete(
        &mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: u64,
    ) {
        self.updates.push(ColumnUpdate {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            deleted: true,
            value: Vec::new(),
        });
    }

    /// Record that this mutation has passed through the named cluster
    pub fn add_replication_source(&mut self, name: impl Into<String>) {
        self.replication_sources.insert(name.into());
    }

    /// Serialized size in bytes, without encoding
    pub fn serialized_size(&self) -> u64 {
        let mut size = 4 + self.row.len() as u64 + 4;
        for update in &self.updates {
            size += 4
                + update.family.len() as u64
                + 4
                + update.qualifier.len() as u64
                + 8
                + 1
                + 4
                + update.value.len() as u64;
        }
        size += 4;
        for source in &self.replication_sources {
            size += 4 + source.len() as u64;
        }
        size
    }

    /// Encode this mutation to a writer
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        write_bytes(out, &self.row)?;
        out.write_u32::<LittleEndian>(self.updates.len() as u32)?;
        for update in &self.updates {
            write_bytes(out, &update.family)?;
            write_bytes(out, &update.qualifier)?;
            out.write_u64::<LittleEndian>(update.timestamp)?;
            out.write_u8(update.deleted as u8)?;
            write_bytes(out, &update.value)?;
        }
        out.write_u32::<LittleEndian>(self.replication_sources.len() as u32)?;
        for source in &self.replication_sources {
            write_string(out, source)?;
        }
        Ok(())
    }

    /// Decode one mutation from a reader
    pub fn read_from<R: Read>(input: &mut R) -> Result<Self> {
        let row = read_bytes(input)?;
        let update_count = input.read_u32::<LittleEndian>()?;
        let mut updates = Vec::with_capacity(update_count.min(1024) as usize);
        for _ in 0..update_count {
            let family = read_bytes(input)?;
            let qualifier = read_bytes(input)?;
            let timestamp = input.read_u64::<LittleEndian>()?;
            let deleted = match input.read_u8()? {
                0 => false,
                1 => true,
                other => {
                    return Err(Error::RecordPayload(format!(
                        "invalid delete flag: {}",
                        other
                    )))
                }
            };
            let value = read_bytes(input)?;
            updates.push(ColumnUpdate {
                family,
                qualifier,
                timestamp,
                deleted,
                value,
            });
        }
        let source_count = input.read_u32::<LittleEndian>()?;
        let mut replication_sources = BTreeSet::new();
        for _ in 0..source_count {
            replication_sources.insert(read_string(input)?);
        }
        Ok(Self {
            row,
            updates,
            replication_sources,
        })
    }
}

/// One decoded WAL record.
///
/// The tablet id carried by a record is exactly what was written on that
/// record; attributing a mutation to a table from earlier definitions is the
/// scanner's job, not the codec's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Start of a logical log segment for a server session
    Open { tserver_session: String },

    /// Binds a compact tablet id to a table identity until redefined
    DefineTablet { tablet_id: u32, extent: TableExtent },

    /// Row mutations belonging to the tablet bound to `tablet_id`
    Mutation {
        tablet_id: u32,
        filename: String,
        mutations: Vec<Mutation>,
    },

    /// Minor compaction began for a tablet
    CompactionStart { tablet_id: u32, filename: String },

    /// Minor compaction finished for a tablet
    CompactionFinish { tablet_id: u32 },

    /// Event kind from a newer format; carried opaquely and skippable
    Unknown { kind: u8, body: Vec<u8> },
}

impl WalRecord {
    /// Get the event kind code
    pub fn kind(&self) -> u8 {
        match self {
            WalRecord::Open { .. } => event_kind::OPEN,
            WalRecord::DefineTablet { .. } => event_kind::DEFINE_TABLET,
            WalRecord::Mutation { .. } => event_kind::MUTATION,
            WalRecord::CompactionStart { .. } => event_kind::COMPACTION_START,
            WalRecord::CompactionFinish { .. } => event_kind::COMPACTION_FINISH,
            WalRecord::Unknown { kind, .. } => *kind,
        }
    }

    /// Encode this record, framed and checksummed, to a writer
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let payload = self.encode_payload()?;
        out.write_u32::<LittleEndian>(payload.len() as u32)?;
        out.write_all(&payload)?;
        out.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
        Ok(())
    }

    fn encode_payload(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        payload.write_u8(RECORD_VERSION)?;
        payload.write_u8(self.kind())?;
        match self {
            WalRecord::Open { tserver_session } => {
                write_string(&mut payload, tserver_session)?;
            }
            WalRecord::DefineTablet { tablet_id, extent } => {
                payload.write_u32::<LittleEndian>(*tablet_id)?;
                write_string(&mut payload, &extent.table_id)?;
                write_opt_bytes(&mut payload, extent.end_row.as_deref())?;
                write_opt_bytes(&mut payload, extent.prev_end_row.as_deref())?;
            }
            WalRecord::Mutation {
                tablet_id,
                filename,
                mutations,
            } => {
                payload.write_u32::<LittleEndian>(*tablet_id)?;
                write_string(&mut payload, filename)?;
                payload.write_u32::<LittleEndian>(mutations.len() as u32)?;
                for mutation in mutations {
                    mutation.write_to(&mut payload)?;
                }
            }
            WalRecord::CompactionStart {
                tablet_id,
                filename,
            } => {
                payload.write_u32::<LittleEndian>(*tablet_id)?;
                write_string(&mut payload, filename)?;
            }
            WalRecord::CompactionFinish { tablet_id } => {
                payload.write_u32::<LittleEndian>(*tablet_id)?;
            }
            WalRecord::Unknown { body, .. } => {
                payload.write_all(body)?;
            }
        }
        Ok(payload)
    }

    /// Decode a record from a checksum-verified frame payload
    pub(crate) fn decode_payload(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let version = input
            .read_u8()
            .map_err(|_| Error::RecordPayload("empty payload".into()))?;
        if version != RECORD_VERSION {
            return Err(Error::RecordVersion(version));
        }
        let kind = input
            .read_u8()
            .map_err(|_| Error::RecordPayload("missing event kind".into()))?;

        let record = match kind {
            event_kind::OPEN => WalRecord::Open {
                tserver_session: read_string(&mut input).map_err(payload_err)?,
            },
            event_kind::DEFINE_TABLET => {
                let tablet_id = read_u32(&mut input)?;
                let table_id = read_string(&mut input).map_err(payload_err)?;
                let end_row = read_opt_bytes(&mut input).map_err(payload_err)?;
                let prev_end_row = read_opt_bytes(&mut input).map_err(payload_err)?;
                WalRecord::DefineTablet {
                    tablet_id,
                    extent: TableExtent {
                        table_id,
                        end_row,
                        prev_end_row,
                    },
                }
            }
            event_kind::MUTATION => {
                let tablet_id = read_u32(&mut input)?;
                let filename = read_string(&mut input).map_err(payload_err)?;
                let count = read_u32(&mut input)?;
                let mut mutations = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    mutations.push(Mutation::read_from(&mut input).map_err(payload_err)?);
                }
                WalRecord::Mutation {
                    tablet_id,
                    filename,
                    mutations,
                }
            }
            event_kind::COMPACTION_START => WalRecord::CompactionStart {
                tablet_id: read_u32(&mut input)?,
                filename: read_string(&mut input).map_err(payload_err)?,
            },
            event_kind::COMPACTION_FINISH => WalRecord::CompactionFinish {
                tablet_id: read_u32(&mut input)?,
            },
            kind => {
                let record = WalRecord::Unknown {
                    kind,
                    body: input.to_vec(),
                };
                input = &[];
                record
            }
        };

        if !input.is_empty() {
            return Err(Error::RecordPayload(format!(
                "{} trailing bytes after record body",
                input.len()
            )));
        }
        Ok(record)
    }
}

fn payload_err(err: Error) -> Error {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Error::RecordPayload("record body ends early".into())
        }
        other => other,
    }
}

fn read_u32(input: &mut &[u8]) -> Result<u32> {
    input
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::RecordPayload("record body ends early".into()))
}

fn write_bytes<W: Write>(out: &mut W, data: &[u8]) -> Result<()> {
    out.write_u32::<LittleEndian>(data.len() as u32)?;
    out.write_all(data)?;
    Ok(())
}

fn read_bytes<R: Read>(input: &mut R) -> Result<Vec<u8>> {
    let len = input.read_u32::<LittleEndian>()? as usize;
    let mut data = vec![0u8; len];
    input.read_exact(&mut data)?;
    Ok(data)
}

fn write_string<W: Write>(out: &mut W, value: &str) -> Result<()> {
    write_bytes(out, value.as_bytes())
}

fn read_string<R: Read>(input: &mut R) -> Result<String> {
    let data = read_bytes(input)?;
    String::from_utf8(data).map_err(|_| Error::RecordPayload("invalid utf-8 string".into()))
}

fn write_opt_bytes<W: Write>(out: &mut W, data: Option<&[u8]>) -> Result<()> {
    match data {
        Some(data) => {
            out.write_u8(1)?;
            write_bytes(out, data)
        }
        None => {
            out.write_u8(0)?;
            Ok(())
        }
    }
}

fn read_opt_bytes<R: Read>(input: &mut R) -> Result<Option<Vec<u8>>> {
    match input.read_u8()? {
        0 => Ok(None),
        1 => Ok(Some(read_bytes(input)?)),
        other => Err(Error::RecordPayload(format!(
            "invalid presence flag: {}",
            other
        ))),
    }
}
