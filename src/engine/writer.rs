//! Index Writer
//!
//! Persists the canonical document, then one row per decomposed node.
//! The two steps are separate store calls with no transaction between
//! them; an interrupted write leaves stale or missing entries that the
//! tree shaker repairs on the next read.

use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::realtime::{ChangeEvent, Topic};
use crate::store::Mutation;
use crate::tree::{CollectingSink, IndexNode, NodeValue, PathCompiler, TreePath, IDENTITY_FIELD};

use super::catalog::PathCatalog;
use super::domain::Domain;
use super::errors::{EngineError, EngineResult};
use super::guard::GuardedStore;

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const CREATED_BY: &str = "createdBy";

/// Result of one write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Stored canonical document
    pub document: Value,
    /// Whether no document existed under the id before
    pub created: bool,
    /// Node rows written
    pub nodes_written: usize,
}

impl WriteOutcome {
    /// Document id
    pub fn id(&self) -> &str {
        self.document
            .get(IDENTITY_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Change event announcing this write
    pub fn event(&self, topic: Topic) -> ChangeEvent {
        if self.created {
            ChangeEvent::create(topic, self.id(), self.document.clone())
        } else {
            ChangeEvent::update(topic, self.id(), self.document.clone())
        }
    }
}

/// Writes canonical documents and their index nodes
pub struct IndexWriter<'a> {
    store: &'a GuardedStore<'a>,
    compiler: &'a dyn PathCompiler,
    catalog: &'a PathCatalog,
}

impl<'a> IndexWriter<'a> {
    pub fn new(store: &'a GuardedStore<'a>, compiler: &'a dyn PathCompiler, catalog: &'a PathCatalog) -> Self {
        Self {
            store,
            compiler,
            catalog,
        }
    }

    /// Write `document` into `domain`, replacing any stored version
    pub async fn write(&self, domain: &Domain, document: Value, uid: Option<&str>) -> EngineResult<WriteOutcome> {
        let Value::Object(mut fields) = document else {
            return Err(EngineError::validation("Document must be a JSON object"));
        };
        let id = document_id(&fields)?;
        fields.insert(IDENTITY_FIELD.to_string(), json!(id));

        let existing = self.store.get_by_id(domain.as_str(), &id).await?;
        let previous = existing.as_ref().and_then(Value::as_object);
        stamp(&mut fields, previous, uid);

        let mut mutations: Vec<Mutation> = fields
            .iter()
            .map(|(field, value)| Mutation::set(field.clone(), value.clone()))
            .collect();
        if let Some(previous) = previous {
            mutations.extend(
                previous
                    .keys()
                    .filter(|field| !fields.contains_key(*field))
                    .map(|field| Mutation::unset(field.clone())),
            );
        }

        let stored = self
            .store
            .update(domain.as_str(), &id, mutations)
            .await?
            .unwrap_or_else(|| Value::Object(fields));

        let mut sink = CollectingSink::new(id.clone());
        self.compiler.decompose(&stored, domain.as_str(), &mut sink);
        let nodes = sink.into_nodes();
        let nodes_written = nodes.len();
        for (path, node) in nodes {
            self.catalog.register(self.store, domain, &path).await?;
            self.write_node(&path, &node).await?;
        }

        Ok(WriteOutcome {
            document: stored,
            created: existing.is_none(),
            nodes_written,
        })
    }

    /// Upsert one node; entries merge per internal key
    async fn write_node(&self, path: &TreePath, node: &IndexNode) -> EngineResult<()> {
        let mut mutations = vec![Mutation::set("_id", node.id.clone())];
        match &node.value {
            NodeValue::Reference(id) => mutations.push(Mutation::set("value", json!(id))),
            NodeValue::Entries(entries) => {
                mutations.extend(
                    entries
                        .iter()
                        .map(|(internal, external)| Mutation::set_path(&["value", internal], json!(external))),
                );
            }
        }
        self.store
            .update(&path.collection_name(), &node.key(), mutations)
            .await?;
        Ok(())
    }
}

/// `_id` of a new document: kept if given, generated if absent
fn document_id(fields: &Map<String, Value>) -> EngineResult<String> {
    match fields.get(IDENTITY_FIELD) {
        None | Some(Value::Null) => Ok(Uuid::new_v4().to_string()),
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(EngineError::validation(format!(
            "Document _id must be a non-empty string or number, got {}",
            other
        ))),
    }
}

/// Server timestamps; creation fields survive from the stored version
fn stamp(fields: &mut Map<String, Value>, previous: Option<&Map<String, Value>>, uid: Option<&str>) {
    let now = json!(Utc::now().to_rfc3339());
    let kept = |name: &str| previous.and_then(|p| p.get(name)).cloned();

    let created_at = kept(CREATED_AT).unwrap_or_else(|| now.clone());
    let created_by = kept(CREATED_BY).unwrap_or_else(|| uid.map(|u| json!(u)).unwrap_or(Value::Null));

    fields.insert(CREATED_AT.to_string(), created_at);
    fields.insert(UPDATED_AT.to_string(), now);
    fields.insert(CREATED_BY.to_string(), created_by);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::guard::RequestGuard;
    use crate::store::{CollectionStore, MemoryStore};
    use crate::tree::JsonTreeCompiler;
    use crate::value::encode_key;
    use std::time::Duration;

    fn guarded(store: &MemoryStore) -> GuardedStore<'_> {
        GuardedStore::new(store, RequestGuard::new(None, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_write_creates_document_and_nodes() {
        let store = MemoryStore::new();
        let guarded = guarded(&store);
        let catalog = PathCatalog::new();
        let compiler = JsonTreeCompiler::new();
        let writer = IndexWriter::new(&guarded, &compiler, &catalog);
        let domain = Domain::parse("Laptop").unwrap();

        let outcome = writer
            .write(&domain, json!({"_id": "d1", "model": "xps", "price": 20}), Some("u1"))
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.document["createdBy"], "u1");
        assert!(outcome.document["createdAt"].is_string());

        let model = TreePath::root("Laptop").child("model").collection_name();
        let key = encode_key(&json!("xps"));
        let row = store.get_by_id(&model, &key).await.unwrap().unwrap();
        assert_eq!(row, json!({"_id": "xps", "value": {"d1": "d1"}}));

        let identity = domain.identity_collection();
        let key = encode_key(&json!("d1"));
        let row = store.get_by_id(&identity, &key).await.unwrap().unwrap();
        assert_eq!(row["value"], "d1");
    }

    #[tokio::test]
    async fn test_entries_merge_across_documents() {
        let store = MemoryStore::new();
        let guarded = guarded(&store);
        let catalog = PathCatalog::new();
        let compiler = JsonTreeCompiler::new();
        let writer = IndexWriter::new(&guarded, &compiler, &catalog);
        let domain = Domain::parse("Laptop").unwrap();

        writer.write(&domain, json!({"_id": "d1", "model": "xps"}), None).await.unwrap();
        writer.write(&domain, json!({"_id": "d2", "model": "xps"}), None).await.unwrap();

        let model = TreePath::root("Laptop").child("model").collection_name();
        let key = encode_key(&json!("xps"));
        let row = store.get_by_id(&model, &key).await.unwrap().unwrap();
        assert_eq!(row["value"], json!({"d1": "d1", "d2": "d2"}));
    }

    #[tokio::test]
    async fn test_rewrite_preserves_creation_and_unsets_removed_fields() {
        let store = MemoryStore::new();
        let guarded = guarded(&store);
        let catalog = PathCatalog::new();
        let compiler = JsonTreeCompiler::new();
        let writer = IndexWriter::new(&guarded, &compiler, &catalog);
        let domain = Domain::parse("Laptop").unwrap();

        let first = writer
            .write(&domain, json!({"_id": "d1", "model": "xps", "ram": 16}), Some("u1"))
            .await
            .unwrap();
        let second = writer
            .write(&domain, json!({"_id": "d1", "model": "xps"}), Some("u2"))
            .await
            .unwrap();

        assert!(!second.created);
        assert_eq!(second.document["createdAt"], first.document["createdAt"]);
        assert_eq!(second.document["createdBy"], "u1");
        assert!(second.document.get("ram").is_none());
    }

    #[tokio::test]
    async fn test_generated_and_numeric_ids() {
        let store = MemoryStore::new();
        let guarded = guarded(&store);
        let catalog = PathCatalog::new();
        let compiler = JsonTreeCompiler::new();
        let writer = IndexWriter::new(&guarded, &compiler, &catalog);
        let domain = Domain::parse("Laptop").unwrap();

        let generated = writer.write(&domain, json!({"model": "xps"}), None).await.unwrap();
        assert_eq!(generated.id().len(), 36);

        let numeric = writer.write(&domain, json!({"_id": 42}), None).await.unwrap();
        assert_eq!(numeric.id(), "42");
    }

    #[tokio::test]
    async fn test_rejects_non_objects() {
        let store = MemoryStore::new();
        let guarded = guarded(&store);
        let catalog = PathCatalog::new();
        let compiler = JsonTreeCompiler::new();
        let writer = IndexWriter::new(&guarded, &compiler, &catalog);
        let domain = Domain::parse("Laptop").unwrap();

        for bad in [json!([1, 2]), json!("x"), json!({"_id": true})] {
            let err = writer.write(&domain, bad, None).await.unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
    }
}
