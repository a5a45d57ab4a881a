//! arbordb - a tree-indexed document store engine
//!
//! Documents are stored whole in a collection per domain and decomposed on
//! write into one secondary-index collection per field path. Queries and
//! deletes are answered by intersecting those indexes; stale entries left
//! by interrupted writes are repaired lazily on read.

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod observability;
pub mod realtime;
pub mod store;
pub mod tree;
pub mod value;

pub use config::{EngineConfig, OrphanSweep};
pub use context::RuleContext;
pub use engine::{DeleteRequest, Engine, EngineError, EngineResult, QueryRequest, QueryResult, SweepReport, UpdateRequest};
