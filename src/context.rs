//! # Rule Context
//!
//! Caller identity and request controls handed to every engine entry
//! point by the rules layer. The engine performs no authorization of its
//! own; it only reads the project id for change topics, the uid for
//! `createdBy`, the master-key bypass for reserved domains, and the
//! cancellation token for the request guard.

use tokio_util::sync::CancellationToken;

/// Per-request caller context
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    /// Project id; selects the change topic
    pub application_id: String,
    /// Authenticated user, if any
    pub uid: Option<String>,
    /// Master key bypass for reserved domains
    pub use_master_key: bool,
    /// Request cancellation
    pub cancellation: Option<CancellationToken>,
}

impl RuleContext {
    /// Anonymous context for a project
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            ..Self::default()
        }
    }

    /// Set the caller uid
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Enable the master key bypass
    pub fn with_master_key(mut self) -> Self {
        self.use_master_key = true;
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}
