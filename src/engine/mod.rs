//! # Engine
//!
//! Tree-indexed storage and query engine.
//!
//! ## Components
//!
//! - **Index Writer**: canonical document plus one node per `(path, value)`
//! - **Index Resolver**: filter → per-path nodes → intersected document ids
//! - **Tree Shaker**: validates nodes against live documents, prunes stale entries
//! - **Purger**: delete path over the identity collection
//! - **Update operators**: `$set` and `$inc` merge
//! - **Engine**: the facade the rules layer calls
//!
//! ## Invariants
//!
//! - The canonical document is the source of truth; the index is derived
//! - No transaction spans the canonical store and the index
//! - Every node read passes through the tree shaker before use
//! - Every store call is bounded by the request's cancellation and deadline

mod catalog;
mod domain;
mod errors;
mod facade;
mod guard;
mod increment;
mod purge;
mod resolver;
mod shaker;
mod writer;

pub use catalog::{PathCatalog, CATALOG_COLLECTION};
pub use domain::{is_node_collection, Domain};
pub use facade::{DeleteRequest, Engine, QueryRequest, QueryResult, SweepReport, UpdateRequest};
pub use errors::{EngineError, EngineResult};
pub use guard::{GuardedStore, RequestGuard};
pub use increment::{apply_increment, apply_set, split_update};
pub use purge::{PurgeReport, Purger};
pub use resolver::{project, IndexResolver, KeyRole, KeyScan, PathScanner, Resolution, ResolveOptions, ResolveReport};
pub use shaker::{ShakeOutcome, TreeShaker};
pub use writer::{IndexWriter, WriteOutcome, CREATED_AT, CREATED_BY, UPDATED_AT};
