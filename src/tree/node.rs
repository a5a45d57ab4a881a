//! Index nodes
//!
//! One row in a path's collection: the indexed value (`_id`) and the
//! document references recorded for it (`value`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::value::{encode_key, values_equal};

/// References recorded on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeValue {
    /// Scalar reference: the canonical document id (identity path)
    Reference(String),
    /// Internal key (owning document) → external key (resolved document)
    Entries(BTreeMap<String, String>),
}

impl NodeValue {
    /// Single-entry map where both keys are the document id
    pub fn owned_by(document_id: &str) -> Self {
        NodeValue::Entries(BTreeMap::from([(document_id.to_string(), document_id.to_string())]))
    }

    /// `(internal, external)` pairs; a scalar pairs with the node's own key
    pub fn pairs(&self, node_key: &str) -> Vec<(String, String)> {
        match self {
            NodeValue::Reference(id) => vec![(node_key.to_string(), id.clone())],
            NodeValue::Entries(entries) => entries
                .iter()
                .map(|(internal, external)| (internal.clone(), external.clone()))
                .collect(),
        }
    }

    /// Whether no references remain
    pub fn is_empty(&self) -> bool {
        match self {
            NodeValue::Reference(_) => false,
            NodeValue::Entries(entries) => entries.is_empty(),
        }
    }
}

/// One index node row
#[derive(Debug, Clone, PartialEq)]
pub struct IndexNode {
    /// The indexed value at this path
    pub id: Value,
    /// Document references for the indexed value
    pub value: NodeValue,
}

impl IndexNode {
    /// Create a node
    pub fn new(id: Value, value: NodeValue) -> Self {
        Self { id, value }
    }

    /// Identity node for a document
    pub fn identity(document_id: &str) -> Self {
        Self::new(json!(document_id), NodeValue::Reference(document_id.to_string()))
    }

    /// Row key inside the path collection
    pub fn key(&self) -> String {
        encode_key(&self.id)
    }

    /// The string form of the indexed value used as an internal key for
    /// scalar references
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// `(internal, external)` pairs recorded on this node
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.value.pairs(&self.id_string())
    }

    /// Whether this node has the same indexed value
    pub fn same_value(&self, other: &IndexNode) -> bool {
        values_equal(&self.id, &other.id)
    }

    /// Whether this node records `internal → external`
    pub fn records(&self, internal: &str, external: &str) -> bool {
        match &self.value {
            NodeValue::Reference(id) => self.id_string() == internal && id == external,
            NodeValue::Entries(entries) => entries.get(internal).map(String::as_str) == Some(external),
        }
    }

    /// Decode a stored row; rows without `_id` or with malformed `value`
    /// yield None
    pub fn from_row(row: &Value) -> Option<Self> {
        let id = row.get("_id")?.clone();
        let value = match row.get("value") {
            Some(Value::String(s)) => NodeValue::Reference(s.clone()),
            Some(Value::Object(map)) => NodeValue::Entries(
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect(),
            ),
            None => NodeValue::Entries(BTreeMap::new()),
            Some(_) => return None,
        };
        Some(Self { id, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_pairs_use_node_id() {
        let node = IndexNode::identity("d1");
        assert_eq!(node.pairs(), vec![("d1".to_string(), "d1".to_string())]);
        assert!(node.records("d1", "d1"));
    }

    #[test]
    fn test_entry_pairs() {
        let node = IndexNode::new(json!("xps"), NodeValue::owned_by("d1"));
        assert_eq!(node.pairs(), vec![("d1".to_string(), "d1".to_string())]);
        assert!(node.records("d1", "d1"));
        assert!(!node.records("d1", "d2"));
    }

    #[test]
    fn test_row_decodes_entries() {
        let node = IndexNode::new(json!(20), NodeValue::owned_by("d1"));
        let row = json!({"_id": 20, "value": {"d1": "d1"}});
        assert_eq!(IndexNode::from_row(&row), Some(node));
    }

    #[test]
    fn test_row_without_value_is_empty() {
        let node = IndexNode::from_row(&json!({"_id": "x"})).unwrap();
        assert!(node.value.is_empty());
    }

    #[test]
    fn test_numeric_key_normalized() {
        let a = IndexNode::new(json!(20.0), NodeValue::owned_by("d1"));
        let b = IndexNode::new(json!(20), NodeValue::owned_by("d1"));
        assert_eq!(a.key(), b.key());
        assert!(a.same_value(&b));
    }
}
