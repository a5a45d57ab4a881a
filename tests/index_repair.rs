//! Index Repair Tests
//!
//! Simulates writes interrupted between the canonical store and the index
//! by editing the backing store directly, then checks that reads never
//! surface stale entries and that repair converges.

use std::sync::Arc;

use arbordb::config::EngineConfig;
use arbordb::context::RuleContext;
use arbordb::engine::{Engine, QueryRequest};
use arbordb::store::{CollectionStore, MemoryStore, Mutation};
use serde_json::json;

fn setup() -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Engine::new(store.clone(), EngineConfig::default()), store)
}

fn ctx() -> RuleContext {
    RuleContext::new("app")
}

fn filter(filter: serde_json::Value) -> QueryRequest {
    QueryRequest {
        filter: Some(filter),
        ..QueryRequest::default()
    }
}

// =============================================================================
// Stale Entries
// =============================================================================

/// A canonical document removed behind the engine's back is not returned.
#[tokio::test]
async fn test_document_removed_out_of_band() {
    let (engine, store) = setup();
    engine
        .create_many(
            "Laptop",
            vec![json!({"_id": "d1", "model": "xps"}), json!({"_id": "d2", "model": "xps"})],
            &ctx(),
        )
        .await
        .unwrap();

    store.delete_by_id("Laptop", "d1").await.unwrap();

    let result = engine.query("Laptop", filter(json!({"model": "xps"})), &ctx()).await.unwrap();
    let docs = result.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["_id"], "d2");

    // The prune was written back; a second read repairs nothing.
    let pruned = engine.metrics().snapshot().entries_pruned;
    engine.query("Laptop", filter(json!({"model": "xps"})), &ctx()).await.unwrap();
    assert_eq!(engine.metrics().snapshot().entries_pruned, pruned);
}

/// A canonical value changed without re-indexing is not matched on the old value.
#[tokio::test]
async fn test_value_changed_out_of_band() {
    let (engine, store) = setup();
    engine
        .create("Laptop", json!({"_id": "d1", "price": 20}), &ctx())
        .await
        .unwrap();

    store
        .update("Laptop", "d1", vec![Mutation::set("price", json!(30))])
        .await
        .unwrap();

    let old = engine.query("Laptop", filter(json!({"price": 20})), &ctx()).await.unwrap();
    assert!(old.documents().is_empty());

    let count = engine
        .query(
            "Laptop",
            QueryRequest {
                filter: Some(json!({"price": {"$gte": 0}})),
                count: true,
                ..QueryRequest::default()
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(count.to_json(), json!({"count": 0}));
}

// =============================================================================
// Sweep
// =============================================================================

/// A sweep removes nodes left empty and converges.
#[tokio::test]
async fn test_sweep_converges() {
    let (engine, store) = setup();
    engine
        .create("Laptop", json!({"_id": "d1", "model": "xps"}), &ctx())
        .await
        .unwrap();
    engine
        .create("Laptop", json!({"_id": "d2", "model": "air"}), &ctx())
        .await
        .unwrap();
    store.delete_by_id("Laptop", "d1").await.unwrap();

    let first = engine.sweep("Laptop", &ctx()).await.unwrap();
    assert!(first.nodes_removed > 0);
    assert!(first.entries_pruned > 0);

    let second = engine.sweep("Laptop", &ctx()).await.unwrap();
    assert_eq!(second.nodes_removed, 0);
    assert_eq!(second.entries_pruned, 0);

    let remaining = engine.query("Laptop", QueryRequest::default(), &ctx()).await.unwrap();
    let docs = remaining.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["_id"], "d2");
}
