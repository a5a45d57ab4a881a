//! # Change Events
//!
//! Create/update/delete announcements per `(project, domain)` topic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Document created
    Create,
    /// Document replaced or modified
    Update,
    /// Document deleted
    Delete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Create => write!(f, "create"),
            OperationType::Update => write!(f, "update"),
            OperationType::Delete => write!(f, "delete"),
        }
    }
}

/// Topic key: one per project and domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    /// Project (application) id
    pub project: String,
    /// Domain name
    pub domain: String,
}

impl Topic {
    /// Create a topic
    pub fn new(project: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            domain: domain.into(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "changes:{}:{}", self.project, self.domain)
    }
}

/// One change announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Document id
    pub id: String,

    /// Topic the event belongs to
    pub topic: Topic,

    /// Kind of change
    pub operation_type: OperationType,

    /// Stored document (create/update)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_document: Option<Value>,

    /// `{"_id": id}`
    pub document_key: Value,

    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    fn new(topic: Topic, operation_type: OperationType, id: String, full_document: Option<Value>) -> Self {
        Self {
            document_key: json!({ "_id": id }),
            id,
            topic,
            operation_type,
            full_document,
            timestamp: Utc::now(),
        }
    }

    /// Create event
    pub fn create(topic: Topic, id: impl Into<String>, document: Value) -> Self {
        Self::new(topic, OperationType::Create, id.into(), Some(document))
    }

    /// Update event
    pub fn update(topic: Topic, id: impl Into<String>, document: Value) -> Self {
        Self::new(topic, OperationType::Update, id.into(), Some(document))
    }

    /// Delete event (key only)
    pub fn delete(topic: Topic, id: impl Into<String>) -> Self {
        Self::new(topic, OperationType::Delete, id.into(), None)
    }
}
