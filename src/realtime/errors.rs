//! # Real-Time Errors
//!
//! Failures reported by change subscribers. They are isolated by the
//! publisher and never reach the emitter.

use thiserror::Error;

/// Result returned by a change handler
pub type HandlerResult = Result<(), SubscriberError>;

/// Subscriber failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriberError {
    /// Handler reported a failure
    #[error("Subscriber failed: {0}")]
    Failed(String),

    /// Handler panicked
    #[error("Subscriber panicked: {0}")]
    Panicked(String),

    /// Receiving side is gone; the subscription is removed
    #[error("Subscriber disconnected")]
    Disconnected,
}

impl SubscriberError {
    /// Create a failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SubscriberError::failed("boom").to_string(), "Subscriber failed: boom");
        assert_eq!(SubscriberError::Disconnected.to_string(), "Subscriber disconnected");
    }
}
