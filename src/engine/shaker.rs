//! Tree Shaker
//!
//! Validates an index node against the live canonical documents before the
//! node is trusted. An entry survives only if its owning document still
//! exists and a fresh decomposition of it records the same entry on the
//! same path and value. Prunes are written back before the node is
//! returned, so repairing a node twice changes nothing the second time.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::observability::{log_event_with_fields, Event};
use crate::store::Mutation;
use crate::tree::{CollectingSink, IndexNode, NodeValue, PathCompiler, TreePath};
use crate::value::encode_key;

use super::domain::Domain;
use super::errors::EngineResult;
use super::guard::GuardedStore;

/// Result of repairing one node
#[derive(Debug, Clone, PartialEq)]
pub struct ShakeOutcome {
    /// The node after repair; None if its row was deleted
    pub node: Option<IndexNode>,
    /// Entries removed (a deleted scalar node counts as one)
    pub pruned: usize,
    /// Whether the node row was deleted
    pub removed: bool,
}

impl ShakeOutcome {
    fn kept(node: IndexNode, pruned: usize) -> Self {
        Self {
            node: Some(node),
            pruned,
            removed: false,
        }
    }

    /// `(internal, external)` pairs still recorded on the node
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.node.as_ref().map(IndexNode::pairs).unwrap_or_default()
    }
}

/// Lazy index repair
pub struct TreeShaker<'a> {
    store: &'a GuardedStore<'a>,
    compiler: &'a dyn PathCompiler,
}

impl<'a> TreeShaker<'a> {
    pub fn new(store: &'a GuardedStore<'a>, compiler: &'a dyn PathCompiler) -> Self {
        Self { store, compiler }
    }

    /// Repair `node`, stored on `path` of `domain`
    pub async fn repair(&self, node: IndexNode, path: &TreePath, domain: &Domain) -> EngineResult<ShakeOutcome> {
        match node.value.clone() {
            NodeValue::Reference(id) => self.repair_reference(node, &id, path, domain).await,
            NodeValue::Entries(entries) => {
                let mut fresh_by_owner: HashMap<String, Vec<IndexNode>> = HashMap::new();
                let mut stale = Vec::new();
                for (internal, external) in &entries {
                    if !fresh_by_owner.contains_key(internal) {
                        let fresh = self.fresh_nodes(internal, path, domain, true).await?;
                        fresh_by_owner.insert(internal.clone(), fresh);
                    }
                    let confirmed = fresh_by_owner
                        .get(internal)
                        .map(|fresh| {
                            fresh
                                .iter()
                                .any(|f| f.same_value(&node) && f.records(internal, external))
                        })
                        .unwrap_or(false);
                    if !confirmed {
                        stale.push(internal.clone());
                    }
                }

                if stale.is_empty() {
                    return Ok(ShakeOutcome::kept(node, 0));
                }

                let mutations = stale
                    .iter()
                    .map(|internal| Mutation::unset_path(&["value", internal]))
                    .collect();
                self.store
                    .update(&path.collection_name(), &node.key(), mutations)
                    .await?;
                self.log_repair(path, &node, stale.len(), false);

                let remaining = entries
                    .into_iter()
                    .filter(|(internal, _)| !stale.contains(internal))
                    .collect();
                let pruned = stale.len();
                Ok(ShakeOutcome::kept(
                    IndexNode::new(node.id, NodeValue::Entries(remaining)),
                    pruned,
                ))
            }
        }
    }

    async fn repair_reference(
        &self,
        node: IndexNode,
        reference: &str,
        path: &TreePath,
        domain: &Domain,
    ) -> EngineResult<ShakeOutcome> {
        let internal = node.id_string();
        let fresh = self.fresh_nodes(reference, path, domain, false).await?;
        if fresh
            .iter()
            .any(|f| f.same_value(&node) && f.records(&internal, reference))
        {
            return Ok(ShakeOutcome::kept(node, 0));
        }

        self.store
            .delete_by_id(&path.collection_name(), &node.key())
            .await?;
        self.log_repair(path, &node, 1, true);
        Ok(ShakeOutcome {
            node: None,
            pruned: 1,
            removed: true,
        })
    }

    /// Nodes a fresh decomposition of the live document puts on `path`
    ///
    /// Empty when the document (or, if `check_identity`, its identity
    /// node) is gone.
    async fn fresh_nodes(
        &self,
        document_id: &str,
        path: &TreePath,
        domain: &Domain,
        check_identity: bool,
    ) -> EngineResult<Vec<IndexNode>> {
        if check_identity {
            let key = encode_key(&json!(document_id));
            if self
                .store
                .get_by_id(&domain.identity_collection(), &key)
                .await?
                .is_none()
            {
                return Ok(Vec::new());
            }
        }

        let Some(document) = self.store.get_by_id(domain.as_str(), document_id).await? else {
            return Ok(Vec::new());
        };
        Ok(self.decompose_on(&document, document_id, path, domain))
    }

    fn decompose_on(&self, document: &Value, document_id: &str, path: &TreePath, domain: &Domain) -> Vec<IndexNode> {
        let mut sink = CollectingSink::new(document_id);
        self.compiler.decompose(document, domain.as_str(), &mut sink);
        sink.into_nodes()
            .into_iter()
            .filter(|(p, _)| p == path)
            .map(|(_, node)| node)
            .collect()
    }

    fn log_repair(&self, path: &TreePath, node: &IndexNode, pruned: usize, removed: bool) {
        let pruned = pruned.to_string();
        let key = node.key();
        log_event_with_fields(
            Event::IndexRepaired,
            &[
                ("path", path.as_str()),
                ("node", &key),
                ("pruned", &pruned),
                ("removed", if removed { "true" } else { "false" }),
            ],
        );
    }
}
