//! # Engine Errors
//!
//! Errors surfaced to callers of the engine facade. Each variant carries a
//! stable code for API responses. Stale index entries are not errors; they
//! are repaired in place and reported through counters.

use thiserror::Error;

use crate::store::StoreError;
use crate::tree::TreeError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input (document, filter, domain, request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// By-id target does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Collection Store failure, propagated unretried
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Request was cancelled by its caller
    #[error("Request cancelled")]
    Cancelled,

    /// A store call exceeded the configured deadline
    #[error("Deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Get error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ARBOR_VALIDATION",
            Self::NotFound(_) => "ARBOR_NOT_FOUND",
            Self::StoreUnavailable(_) => "ARBOR_STORE_UNAVAILABLE",
            Self::Cancelled => "ARBOR_CANCELLED",
            Self::DeadlineExceeded(_) => "ARBOR_DEADLINE_EXCEEDED",
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::DeadlineExceeded(_))
    }
}

impl From<TreeError> for EngineError {
    fn from(err: TreeError) -> Self {
        Self::Validation(err.to_string())
    }
}
