//! In-memory Collection Store
//!
//! Rows live in `BTreeMap`s keyed by row id, so unsorted scans are
//! deterministic. Each call takes the lock once, giving per-call atomicity.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::{Map, Value};

use crate::value::compare_values;

use super::collection::{CollectionStore, FindOptions, Mutation, RowPredicate, SortOrder, StoreFuture};
use super::errors::{StoreError, StoreResult};

/// Rows of one collection, keyed by row id
pub type Rows = BTreeMap<String, Value>;

/// Collection Store held entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Rows>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from exported collections
    pub fn from_collections(collections: BTreeMap<String, Rows>) -> Self {
        Self {
            collections: RwLock::new(collections.into_iter().collect()),
        }
    }

    /// Copy every collection out of the store
    pub fn export(&self) -> StoreResult<BTreeMap<String, Rows>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::unavailable("Lock poisoned"))?;
        Ok(collections
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(name, rows)| (name.clone(), rows.clone()))
            .collect())
    }

    /// Number of rows in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map(|rows| rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Whether the store holds no rows at all
    pub fn is_empty(&self) -> bool {
        self.collections
            .read()
            .map(|c| c.values().all(|rows| rows.is_empty()))
            .unwrap_or(true)
    }

    fn get_sync(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::unavailable("Lock poisoned"))?;
        Ok(collections.get(collection).and_then(|rows| rows.get(id)).cloned())
    }

    fn find_sync(
        &self,
        collection: &str,
        predicate: RowPredicate<'_>,
        options: FindOptions,
    ) -> StoreResult<Vec<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::unavailable("Lock poisoned"))?;

        let mut rows: Vec<Value> = collections
            .get(collection)
            .map(|rows| rows.values().filter(|row| predicate(row)).cloned().collect())
            .unwrap_or_default();
        drop(collections);

        if let Some(order) = options.sort {
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get("_id").unwrap_or(&Value::Null),
                    b.get("_id").unwrap_or(&Value::Null),
                );
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }

        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(skip).take(limit).collect())
    }

    fn update_sync(
        &self,
        collection: &str,
        id: &str,
        mutations: Vec<Mutation>,
    ) -> StoreResult<Option<Value>> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::unavailable("Lock poisoned"))?;

        let rows = collections.entry(collection.to_string()).or_default();
        let exists = rows.contains_key(id);
        if !exists && mutations.iter().all(Mutation::is_unset) {
            return Ok(None);
        }

        let row = rows
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !row.is_object() {
            *row = Value::Object(Map::new());
        }
        if let Value::Object(map) = row {
            for mutation in &mutations {
                mutation.apply(map);
            }
        }
        Ok(Some(row.clone()))
    }

    fn delete_sync(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::unavailable("Lock poisoned"))?;
        Ok(collections
            .get_mut(collection)
            .map(|rows| rows.remove(id).is_some())
            .unwrap_or(false))
    }

    fn collections_sync(&self) -> StoreResult<Vec<String>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::unavailable("Lock poisoned"))?;
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl CollectionStore for MemoryStore {
    fn get_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { self.get_sync(collection, id) })
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        predicate: RowPredicate<'a>,
        options: FindOptions,
    ) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(async move { self.find_sync(collection, predicate, options) })
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        mutations: Vec<Mutation>,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { self.update_sync(collection, id, mutations) })
    }

    fn delete_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { self.delete_sync(collection, id) })
    }

    fn collections(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { self.collections_sync() })
    }
}
