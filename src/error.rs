//! Error types for kvgate
//!
//! Two layers of errors live here:
//! - [`StoreError`]: the tagged result of every storage engine call
//! - [`KvError`]: failures while starting or stopping the service
//!
//! HTTP-facing errors are defined next to the handlers in `api::error`.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Result type alias for storage engine operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a failed storage engine call
///
/// `NotFound` is a domain sentinel: callers match on the variant, never on
/// the rendered message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Storage engine is closed")]
    Closed,

    /// A failed log write could not be undone; the log accepts no more writes
    #[error("WAL writer disabled after an unrecoverable write failure")]
    WriterFailed,
}

impl StoreError {
    /// True for the not-found sentinel
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Unified error type for process-level operations
#[derive(Debug, Error)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Telemetry(String),
}
