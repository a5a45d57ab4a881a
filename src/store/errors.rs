//! # Store Errors
//!
//! Error types for Collection Store implementations.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Collection Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store cannot serve the call
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot file failed checksum or structure validation
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Row or snapshot (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Returns the error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "ARBOR_STORE_UNAVAILABLE",
            StoreError::CorruptSnapshot(_) => "ARBOR_STORE_CORRUPT_SNAPSHOT",
            StoreError::Io(_) => "ARBOR_STORE_IO",
            StoreError::Serialization(_) => "ARBOR_STORE_SERIALIZATION",
        }
    }
}
