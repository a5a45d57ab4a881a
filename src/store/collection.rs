//! Collection Store capability
//!
//! A key/value collection abstraction over arbitrary named collections.
//! Implementations must give single-call atomicity per row; nothing spans
//! more than one call.

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use super::errors::StoreResult;

/// Boxed future returned by store calls
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Row predicate applied by `find` before sorting and pagination
pub type RowPredicate<'a> = &'a (dyn Fn(&Value) -> bool + Send + Sync);

/// Predicate accepting every row
pub fn all_rows(_: &Value) -> bool {
    true
}

/// Sort direction over the row `_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Cursor options for `find`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort by row `_id` (None = store order)
    pub sort: Option<SortOrder>,
    /// Maximum rows returned
    pub limit: Option<usize>,
    /// Rows skipped after sorting
    pub skip: Option<usize>,
}

impl FindOptions {
    /// Options with no sorting or pagination
    pub fn all() -> Self {
        Self::default()
    }

    /// Set skip and limit
    pub fn paginate(mut self, skip: Option<usize>, limit: Option<usize>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    /// Set sort order
    pub fn sorted(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }
}

/// A single field mutation applied by `update`
///
/// Paths are segment lists so keys containing dots are addressed safely.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Set the value at the path, creating intermediate objects
    Set(Vec<String>, Value),
    /// Remove the value at the path (no-op when absent)
    Unset(Vec<String>),
}

impl Mutation {
    /// Set a top-level field
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Mutation::Set(vec![field.into()], value)
    }

    /// Set a nested field
    pub fn set_path<S: AsRef<str>>(path: &[S], value: Value) -> Self {
        Mutation::Set(path.iter().map(|s| s.as_ref().to_string()).collect(), value)
    }

    /// Remove a top-level field
    pub fn unset(field: impl Into<String>) -> Self {
        Mutation::Unset(vec![field.into()])
    }

    /// Remove a nested field
    pub fn unset_path<S: AsRef<str>>(path: &[S]) -> Self {
        Mutation::Unset(path.iter().map(|s| s.as_ref().to_string()).collect())
    }

    /// Apply this mutation to a row object
    pub fn apply(&self, row: &mut Map<String, Value>) {
        match self {
            Mutation::Set(path, value) => set_at(row, path, value.clone()),
            Mutation::Unset(path) => unset_at(row, path),
        }
    }

    /// Whether this mutation removes data
    pub fn is_unset(&self) -> bool {
        matches!(self, Mutation::Unset(_))
    }
}

fn set_at(row: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = row;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.clone(), value);
}

fn unset_at(row: &mut Map<String, Value>, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = row;
    for segment in parents {
        current = match current.get_mut(segment) {
            Some(Value::Object(map)) => map,
            _ => return,
        };
    }
    current.remove(last);
}

/// Key/value collection capability consumed by the engine
pub trait CollectionStore: Send + Sync {
    /// Fetch one row by id
    fn get_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, Option<Value>>;

    /// Rows matching the predicate, then sorted by `_id`, skipped and limited
    fn find<'a>(
        &'a self,
        collection: &'a str,
        predicate: RowPredicate<'a>,
        options: FindOptions,
    ) -> StoreFuture<'a, Vec<Value>>;

    /// Apply mutations to a row, creating it when absent (upsert)
    ///
    /// A call containing only unsets does not create a missing row.
    /// Returns the row after the update, or None if nothing exists.
    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        mutations: Vec<Mutation>,
    ) -> StoreFuture<'a, Option<Value>>;

    /// Delete one row; returns whether it existed
    fn delete_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, bool>;

    /// Names of all non-empty collections
    fn collections(&self) -> StoreFuture<'_, Vec<String>>;
}
