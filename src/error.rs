//! Walship Error Types

use thiserror::Error;

/// Result type alias for walship operations
pub type Result<T> = std::result::Result<T, Error>;

/// Walship error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // WAL decode errors
    #[error("Unsupported record version: {0}")]
    RecordVersion(u8),

    #[error("Record corrupted at offset {offset}: {reason}")]
    RecordCorrupted { offset: u64, reason: String },

    #[error("Truncated record at offset {offset}")]
    TruncatedRecord { offset: u64 },

    #[error("Malformed record payload: {0}")]
    RecordPayload(String),

    // Replication errors
    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Shipping batch to peer {peer} failed: {reason}")]
    PeerSend { peer: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PeerSend { .. })
    }

    /// Check if this error invalidates the current scan. The caller must not
    /// advance any persisted cursor past a scan that failed this way.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::RecordVersion(_)
                | Error::RecordCorrupted { .. }
                | Error::TruncatedRecord { .. }
                | Error::RecordPayload(_)
        )
    }
}
