//! Path catalog
//!
//! Node collection names are one-way hashes, so the paths a domain has
//! written are recorded separately. Rows live in the `__paths` collection
//! (`{"_id": path, "domain": name}`) so a sweep in a later process still
//! finds them; an in-process set skips re-registering known paths.

use std::collections::{BTreeSet, HashSet};
use std::sync::RwLock;

use serde_json::{json, Value};

use crate::store::{FindOptions, Mutation};
use crate::tree::TreePath;

use super::domain::Domain;
use super::errors::EngineResult;
use super::guard::GuardedStore;

/// Collection holding catalog rows
pub const CATALOG_COLLECTION: &str = "__paths";

/// Paths written per domain
#[derive(Debug, Default)]
pub struct PathCatalog {
    known: RwLock<HashSet<TreePath>>,
}

impl PathCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    fn is_known(&self, path: &TreePath) -> bool {
        self.known
            .read()
            .map(|known| known.contains(path))
            .unwrap_or(false)
    }

    /// Record that `path` holds nodes of `domain`
    pub async fn register(
        &self,
        store: &GuardedStore<'_>,
        domain: &Domain,
        path: &TreePath,
    ) -> EngineResult<()> {
        if self.is_known(path) {
            return Ok(());
        }
        store
            .update(
                CATALOG_COLLECTION,
                path.as_str(),
                vec![
                    Mutation::set("_id", json!(path.as_str())),
                    Mutation::set("domain", json!(domain.as_str())),
                ],
            )
            .await?;
        if let Ok(mut known) = self.known.write() {
            known.insert(path.clone());
        }
        Ok(())
    }

    /// Every registered path of a domain, in path order
    pub async fn paths(&self, store: &GuardedStore<'_>, domain: &Domain) -> EngineResult<Vec<TreePath>> {
        let name = domain.as_str();
        let owned_by = |row: &Value| row.get("domain").and_then(Value::as_str) == Some(name);
        let rows = store.find(CATALOG_COLLECTION, &owned_by, FindOptions::all()).await?;

        let paths: BTreeSet<TreePath> = rows
            .iter()
            .filter_map(|row| row.get("_id").and_then(Value::as_str))
            .filter_map(|raw| TreePath::parse(raw).ok())
            .collect();
        Ok(paths.into_iter().collect())
    }
}
