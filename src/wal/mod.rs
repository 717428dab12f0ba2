//! Write-Ahead Log Module
//!
//! Typed records for the tablet server write-ahead log, their versioned
//! binary codec, and sequential stream reading.

pub mod record;
mod reader;

pub use reader::RecordReader;
pub use record::{ColumnUpdate, Mutation, TableExtent, WalRecord, RECORD_VERSION};
