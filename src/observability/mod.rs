//! Observability subsystem for arbordb
//!
//! - Structured logging (one JSON object per line)
//! - Monotonic counters
//! - Typed lifecycle events
//!
//! Observability is read-only: it never changes engine behavior and its
//! failures are swallowed.
//!
//! ```ignore
//! use arbordb::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::WriteCommit, &[("domain", "Laptop")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
