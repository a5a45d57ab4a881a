//! Delete path
//!
//! Resolves a filter to owning documents the same way a query does, then
//! deletes their identity rows. Field-path entries are left behind; the
//! tree shaker prunes them when they are next read.

use serde_json::json;

use crate::tree::{CompiledFilter, PathCompiler};
use crate::value::encode_key;

use super::domain::Domain;
use super::errors::{EngineError, EngineResult};
use super::guard::GuardedStore;
use super::resolver::{KeyRole, PathScanner};

/// Result of a purge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Ids whose identity row existed and was deleted
    pub ids: Vec<String>,
    /// Stale entries repaired during traversal
    pub repaired: usize,
}

/// Removes matching documents from the identity path
pub struct Purger<'a> {
    store: &'a GuardedStore<'a>,
    scanner: PathScanner<'a>,
}

impl<'a> Purger<'a> {
    pub fn new(store: &'a GuardedStore<'a>, compiler: &'a dyn PathCompiler) -> Self {
        Self {
            store,
            scanner: PathScanner::new(store, compiler),
        }
    }

    /// Delete the identity rows of every document matching `compiled`
    ///
    /// An empty conjunction would delete the whole domain and is rejected.
    pub async fn purge(&self, domain: &Domain, compiled: &CompiledFilter) -> EngineResult<PurgeReport> {
        if compiled.has_empty_map() {
            return Err(EngineError::validation("Delete requires a non-empty filter"));
        }

        let scan = self
            .scanner
            .scan(domain, compiled, KeyRole::Internal, None)
            .await?;

        let identity = domain.identity_collection();
        let mut ids = Vec::new();
        for internal in scan.keys {
            let key = encode_key(&json!(internal));
            if self.store.delete_by_id(&identity, &key).await? {
                ids.push(internal);
            }
        }
        Ok(PurgeReport {
            ids,
            repaired: scan.repaired,
        })
    }
}
