//! Index Resolver
//!
//! Turns a compiled filter into a set of document ids by intersecting the
//! keys each path's nodes reference. A key survives a conjunction only if
//! every path produced it; disjunctions union their conjunctions.
//!
//! Every node read here passes through the tree shaker first, so stale
//! entries never reach the intersection.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::store::{all_rows, FindOptions, SortOrder};
use crate::tree::{CompiledFilter, ConjunctionMap, IndexNode, PathCompiler, Selector, TreePath, IDENTITY_FIELD};
use crate::value::encode_key;

use super::domain::Domain;
use super::errors::EngineResult;
use super::guard::GuardedStore;
use super::shaker::TreeShaker;

/// Which side of an entry a scan collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Owning document (delete path)
    Internal,
    /// Resolved document (query path)
    External,
}

impl KeyRole {
    fn pick(self, (internal, external): (String, String)) -> String {
        match self {
            KeyRole::Internal => internal,
            KeyRole::External => external,
        }
    }
}

/// Pagination and shape of a resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub skip: Option<usize>,
    pub size: Option<usize>,
    /// Return the number of matches instead of documents
    pub count: bool,
    /// Top-level fields to keep (`_id` is always kept)
    pub projection: Option<Vec<String>>,
}

/// Matched documents or their count
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Documents(Vec<Value>),
    Count(usize),
}

/// Resolution plus the number of stale entries repaired on the way
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveReport {
    pub resolution: Resolution,
    pub repaired: usize,
}

/// Keys produced by a scan, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyScan {
    pub keys: Vec<String>,
    pub repaired: usize,
    /// Whether skip/size were already applied at the store cursor
    pub paginated: bool,
}

/// Shared path traversal for queries and deletes
pub struct PathScanner<'a> {
    store: &'a GuardedStore<'a>,
    shaker: TreeShaker<'a>,
}

impl<'a> PathScanner<'a> {
    pub fn new(store: &'a GuardedStore<'a>, compiler: &'a dyn PathCompiler) -> Self {
        Self {
            store,
            shaker: TreeShaker::new(store, compiler),
        }
    }

    /// Keys matching `compiled`
    ///
    /// `cursor` is applied at the identity collection when the filter is a
    /// single empty map; otherwise the caller paginates.
    pub async fn scan(
        &self,
        domain: &Domain,
        compiled: &CompiledFilter,
        role: KeyRole,
        cursor: Option<(Option<usize>, Option<usize>)>,
    ) -> EngineResult<KeyScan> {
        if compiled.is_match_all() {
            let options = match cursor {
                Some((skip, size)) => FindOptions::all().sorted(SortOrder::Ascending).paginate(skip, size),
                None => FindOptions::all().sorted(SortOrder::Ascending),
            };
            let (keys, repaired) = self.scan_identity(domain, role, options).await?;
            return Ok(KeyScan {
                keys,
                repaired,
                paginated: cursor.is_some(),
            });
        }

        let mut result = KeyScan::default();
        let mut seen = HashSet::new();
        for map in compiled.maps() {
            let (keys, repaired) = if map.is_empty() {
                self.scan_identity(domain, role, FindOptions::all().sorted(SortOrder::Ascending))
                    .await?
            } else {
                self.intersect(domain, map, role).await?
            };
            result.repaired += repaired;
            for key in keys {
                if seen.insert(key.clone()) {
                    result.keys.push(key);
                }
            }
        }
        Ok(result)
    }

    async fn scan_identity(
        &self,
        domain: &Domain,
        role: KeyRole,
        options: FindOptions,
    ) -> EngineResult<(Vec<String>, usize)> {
        let path = domain.identity_path();
        let rows = self
            .store
            .find(&path.collection_name(), &all_rows, options)
            .await?;
        let (pairs, repaired) = self.shake_rows(rows, &path, domain).await?;
        Ok((pairs.into_iter().map(|pair| role.pick(pair)).collect(), repaired))
    }

    /// Frequency intersection over one conjunction map
    async fn intersect(
        &self,
        domain: &Domain,
        map: &ConjunctionMap,
        role: KeyRole,
    ) -> EngineResult<(Vec<String>, usize)> {
        let mut frequency: HashMap<String, usize> = HashMap::new();
        let mut order = Vec::new();
        let mut repaired = 0;

        for (path, selector) in map {
            let rows = self.nodes_for(path, selector).await?;
            let (pairs, pruned) = self.shake_rows(rows, path, domain).await?;
            repaired += pruned;

            let mut on_path = HashSet::new();
            for pair in pairs {
                let key = role.pick(pair);
                if on_path.insert(key.clone()) {
                    let count = frequency.entry(key.clone()).or_insert(0);
                    if *count == 0 {
                        order.push(key);
                    }
                    *count += 1;
                }
            }
            if on_path.is_empty() {
                return Ok((Vec::new(), repaired));
            }
        }

        let paths = map.len();
        let keys = order
            .into_iter()
            .filter(|key| frequency.get(key) == Some(&paths))
            .collect();
        Ok((keys, repaired))
    }

    async fn nodes_for(&self, path: &TreePath, selector: &Selector) -> EngineResult<Vec<Value>> {
        let collection = path.collection_name();
        match selector {
            Selector::Literal(value) => {
                let key = encode_key(value);
                Ok(self.store.get_by_id(&collection, &key).await?.into_iter().collect())
            }
            Selector::Expression(expression) => {
                // Directives shape the cursor; the predicate filters what it yields.
                let predicate = expression.predicate()?;
                let mut rows = self
                    .store
                    .find(&collection, &all_rows, expression.find_options())
                    .await?;
                rows.retain(|row| row.get(IDENTITY_FIELD).map(|id| predicate.test(id)).unwrap_or(false));
                Ok(rows)
            }
        }
    }

    async fn shake_rows(
        &self,
        rows: Vec<Value>,
        path: &TreePath,
        domain: &Domain,
    ) -> EngineResult<(Vec<(String, String)>, usize)> {
        let mut pairs = Vec::new();
        let mut repaired = 0;
        for row in rows {
            let Some(node) = IndexNode::from_row(&row) else {
                continue;
            };
            let outcome = self.shaker.repair(node, path, domain).await?;
            repaired += outcome.pruned;
            pairs.extend(outcome.pairs());
        }
        Ok((pairs, repaired))
    }
}

/// Query-side resolution
pub struct IndexResolver<'a> {
    store: &'a GuardedStore<'a>,
    scanner: PathScanner<'a>,
}

impl<'a> IndexResolver<'a> {
    pub fn new(store: &'a GuardedStore<'a>, compiler: &'a dyn PathCompiler) -> Self {
        Self {
            store,
            scanner: PathScanner::new(store, compiler),
        }
    }

    /// Resolve `compiled` to documents (or a count) in `domain`
    pub async fn resolve(
        &self,
        domain: &Domain,
        compiled: &CompiledFilter,
        options: &ResolveOptions,
    ) -> EngineResult<ResolveReport> {
        let cursor = (!options.count).then_some((options.skip, options.size));
        let scan = self
            .scanner
            .scan(domain, compiled, KeyRole::External, cursor)
            .await?;

        if options.count {
            return Ok(ResolveReport {
                resolution: Resolution::Count(scan.keys.len()),
                repaired: scan.repaired,
            });
        }

        let ids: Vec<String> = if scan.paginated {
            scan.keys
        } else {
            scan.keys
                .into_iter()
                .skip(options.skip.unwrap_or(0))
                .take(options.size.unwrap_or(usize::MAX))
                .collect()
        };

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(document) = self.store.get_by_id(domain.as_str(), &id).await? {
                documents.push(project(document, options.projection.as_deref()));
            }
        }
        Ok(ResolveReport {
            resolution: Resolution::Documents(documents),
            repaired: scan.repaired,
        })
    }
}

/// Keep only the listed top-level fields plus `_id`
pub fn project(document: Value, fields: Option<&[String]>) -> Value {
    match (fields, document) {
        (Some(fields), Value::Object(map)) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| key == IDENTITY_FIELD || fields.contains(key))
                .collect::<Map<String, Value>>(),
        ),
        (_, document) => document,
    }
}
