//! Observable events for arbordb
//!
//! Events are explicit and typed; log lines carry `Event::as_str()`.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Engine constructed
    EngineStart,
    /// Configuration loaded
    ConfigLoaded,
    /// Snapshot loaded from disk
    SnapshotLoaded,
    /// Snapshot written to disk
    SnapshotSaved,

    // Write path
    /// Canonical document and index nodes written
    WriteCommit,
    /// Write failed part-way (index may be stale)
    WriteFailed,

    // Read path
    /// Query resolved
    QueryExecuted,
    /// Query rejected before touching the store
    QueryRejected,

    // Repair
    /// Tree shaker pruned stale entries
    IndexRepaired,
    /// Orphan sweep finished
    SweepComplete,

    // Delete path
    /// Purge removed identity rows
    PurgeComplete,

    // Change publisher
    /// A subscriber failed while handling an event
    SubscriberFailed,
    /// A watch channel dropped an event
    WatchDropped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::EngineStart => "ENGINE_START",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SnapshotLoaded => "SNAPSHOT_LOADED",
            Event::SnapshotSaved => "SNAPSHOT_SAVED",
            Event::WriteCommit => "WRITE_COMMIT",
            Event::WriteFailed => "WRITE_FAILED",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::IndexRepaired => "INDEX_REPAIRED",
            Event::SweepComplete => "SWEEP_COMPLETE",
            Event::PurgeComplete => "PURGE_COMPLETE",
            Event::SubscriberFailed => "SUBSCRIBER_FAILED",
            Event::WatchDropped => "WATCH_DROPPED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::WriteFailed | Event::QueryRejected | Event::SubscriberFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::EngineStart,
            Event::ConfigLoaded,
            Event::SnapshotLoaded,
            Event::SnapshotSaved,
            Event::WriteCommit,
            Event::WriteFailed,
            Event::QueryExecuted,
            Event::QueryRejected,
            Event::IndexRepaired,
            Event::SweepComplete,
            Event::PurgeComplete,
            Event::SubscriberFailed,
            Event::WatchDropped,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_failure_events() {
        assert!(Event::WriteFailed.is_failure());
        assert!(Event::SubscriberFailed.is_failure());
        assert!(!Event::IndexRepaired.is_failure());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::PurgeComplete), "PURGE_COMPLETE");
    }
}
