//! # Tree Errors
//!
//! Errors raised while compiling filters or parsing predicate bodies.

use thiserror::Error;

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Path compiler and expression errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Filter shape cannot be compiled into path selectors
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Predicate body failed to parse
    #[error("Invalid expression at {position}: {message}")]
    InvalidExpression { position: usize, message: String },

    /// Path string is malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl TreeError {
    /// Create an invalid filter error
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Create an expression parse error
    pub fn expression(position: usize, msg: impl Into<String>) -> Self {
        Self::InvalidExpression {
            position,
            message: msg.into(),
        }
    }
}
