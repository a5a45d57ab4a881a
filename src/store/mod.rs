//! # Collection Store
//!
//! The key/value capability the engine runs against: get-by-id,
//! find-by-predicate, upsert, delete over arbitrary named collections.
//!
//! ## Invariants
//!
//! - Single-call atomicity per row; no multi-row transactions
//! - Canonical documents live in a collection named after their domain
//! - Index nodes live in one collection per hashed path

mod collection;
mod errors;
mod memory;
mod snapshot;

pub use collection::{all_rows, CollectionStore, FindOptions, Mutation, RowPredicate, SortOrder, StoreFuture};
pub use errors::{StoreError, StoreResult};
pub use memory::{MemoryStore, Rows};
pub use snapshot::{compute_checksum, load_snapshot, save_snapshot, SNAPSHOT_FORMAT};
