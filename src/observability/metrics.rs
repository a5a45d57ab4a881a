//! Metrics registry for arbordb
//!
//! Counters only, monotonic, reset on process start.
//! All counters use Relaxed atomics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    writes: AtomicU64,
    nodes_written: AtomicU64,
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    purges: AtomicU64,
    documents_deleted: AtomicU64,
    entries_pruned: AtomicU64,
    nodes_removed: AtomicU64,
    events_published: AtomicU64,
    subscriber_failures: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one canonical write and its node writes
    pub fn record_write(&self, nodes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.nodes_written.fetch_add(nodes, Ordering::Relaxed);
    }

    /// Increment queries executed
    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment queries rejected
    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one purge and the documents it removed
    pub fn record_purge(&self, deleted: u64) {
        self.purges.fetch_add(1, Ordering::Relaxed);
        self.documents_deleted.fetch_add(deleted, Ordering::Relaxed);
    }

    /// Add pruned index entries
    pub fn add_entries_pruned(&self, count: u64) {
        self.entries_pruned.fetch_add(count, Ordering::Relaxed);
    }

    /// Add removed node rows
    pub fn add_nodes_removed(&self, count: u64) {
        self.nodes_removed.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment published change events
    pub fn increment_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Add failed subscriber deliveries
    pub fn add_subscriber_failures(&self, count: u64) {
        self.subscriber_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            nodes_written: self.nodes_written.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            purges: self.purges.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
            entries_pruned: self.entries_pruned.load(Ordering::Relaxed),
            nodes_removed: self.nodes_removed.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
        }
    }

    /// Current values as a JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub writes: u64,
    pub nodes_written: u64,
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub purges: u64,
    pub documents_deleted: u64,
    pub entries_pruned: u64,
    pub nodes_removed: u64,
    pub events_published: u64,
    pub subscriber_failures: u64,
}
