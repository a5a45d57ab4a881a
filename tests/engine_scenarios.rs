//! Engine Scenario Tests
//!
//! End-to-end behavior through the engine facade:
//! - Write/read round trip by exact-match filter
//! - Intersection across paths
//! - Delete symmetry and idempotence
//! - Increment merge through update
//! - Cursor directives applied before the predicate
//! - The Laptop scenario (write, delete by price, query by model)

use std::sync::Arc;

use arbordb::config::{EngineConfig, OrphanSweep};
use arbordb::context::RuleContext;
use arbordb::engine::{DeleteRequest, Engine, EngineError, QueryRequest, QueryResult, UpdateRequest};
use arbordb::store::MemoryStore;
use serde_json::{json, Value};

// =============================================================================
// Test Utilities
// =============================================================================

fn engine_with(config: EngineConfig) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Engine::new(store.clone(), config), store)
}

fn engine() -> (Engine, Arc<MemoryStore>) {
    engine_with(EngineConfig::default())
}

fn ctx() -> RuleContext {
    RuleContext::new("app").with_uid("u1")
}

fn filter(filter: Value) -> QueryRequest {
    QueryRequest {
        filter: Some(filter),
        ..QueryRequest::default()
    }
}

fn ids(result: &QueryResult) -> Vec<String> {
    let mut ids: Vec<String> = result
        .documents()
        .iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

// =============================================================================
// Round Trip
// =============================================================================

/// A written document is found again by each of its field values.
#[tokio::test]
async fn test_write_read_round_trip() {
    let (engine, _) = engine();
    let stored = engine
        .create("Laptop", json!({"model": "xps", "spec": {"ram": 16}}), &ctx())
        .await
        .unwrap();
    let id = stored["_id"].as_str().unwrap().to_string();

    let by_model = engine.query("Laptop", filter(json!({"model": "xps"})), &ctx()).await.unwrap();
    assert_eq!(ids(&by_model), vec![id.clone()]);

    let by_nested = engine
        .query("Laptop", filter(json!({"spec": {"ram": 16}})), &ctx())
        .await
        .unwrap();
    assert_eq!(ids(&by_nested), vec![id.clone()]);

    let found = engine.find_by_id("Laptop", &id, &ctx()).await.unwrap().unwrap();
    assert_eq!(found["model"], "xps");
    assert_eq!(found["createdBy"], "u1");
}

/// Missing ids resolve to None, not an error.
#[tokio::test]
async fn test_find_missing_id() {
    let (engine, _) = engine();
    assert!(engine.find_by_id("Laptop", "nope", &ctx()).await.unwrap().is_none());

    let single = engine
        .query(
            "Laptop",
            QueryRequest {
                id: Some("nope".into()),
                ..QueryRequest::default()
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(single, QueryResult::Single(None));
}

// =============================================================================
// Intersection
// =============================================================================

/// Only documents matching every condition are returned.
#[tokio::test]
async fn test_intersection_correctness() {
    let (engine, _) = engine();
    engine
        .create_many(
            "Item",
            vec![
                json!({"_id": "both", "a": "x", "b": "y"}),
                json!({"_id": "only_a", "a": "x", "b": "n"}),
                json!({"_id": "only_b", "a": "n", "b": "y"}),
            ],
            &ctx(),
        )
        .await
        .unwrap();

    let result = engine
        .query("Item", filter(json!({"a": "x", "b": "y"})), &ctx())
        .await
        .unwrap();
    assert_eq!(ids(&result), vec!["both"]);
}

/// Range operators, counts, projection and pagination.
#[tokio::test]
async fn test_expression_queries() {
    let (engine, _) = engine();
    for (id, price) in [("a", 10), ("b", 20), ("c", 30), ("d", 40)] {
        engine
            .create("Laptop", json!({"_id": id, "price": price, "model": "m"}), &ctx())
            .await
            .unwrap();
    }

    let mid = engine
        .query("Laptop", filter(json!({"price": {"$gte": 20, "$lt": 40}})), &ctx())
        .await
        .unwrap();
    assert_eq!(ids(&mid), vec!["b", "c"]);

    let count = engine
        .query(
            "Laptop",
            QueryRequest {
                filter: Some(json!({"price": {"$gt": 10}})),
                count: true,
                ..QueryRequest::default()
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(count, QueryResult::Count(3));

    let projected = engine
        .query(
            "Laptop",
            QueryRequest {
                filter: Some(json!({"price": 20})),
                projection: Some(vec!["price".into()]),
                ..QueryRequest::default()
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(projected.documents(), vec![json!({"_id": "b", "price": 20})]);

    let page = engine
        .query(
            "Laptop",
            QueryRequest {
                skip: Some(1),
                size: Some(2),
                ..QueryRequest::default()
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["b", "c"]);
}

/// Cursor directives pick nodes before the predicate filters them.
#[tokio::test]
async fn test_cursor_directives() {
    let (engine, _) = engine();
    engine
        .create_many(
            "Laptop",
            vec![json!({"_id": "d1", "price": 20}), json!({"_id": "d2", "price": 30})],
            &ctx(),
        )
        .await
        .unwrap();

    let cheapest_over = engine
        .query(
            "Laptop",
            filter(json!({"price": {"$gt": 25, "$orderBy": 1, "$limit": 1}})),
            &ctx(),
        )
        .await
        .unwrap();
    assert!(cheapest_over.documents().is_empty());

    let dearest = engine
        .query(
            "Laptop",
            filter(json!({"price": {"$gte": 0, "$orderBy": "desc", "$limit": 1}})),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&dearest), vec!["d2"]);

    let second = engine
        .query(
            "Laptop",
            filter(json!({"price": {"$gte": 0, "$orderBy": 1, "$skip": 1}})),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&second), vec!["d2"]);
}

/// Numeric ids are found and deleted by the number they were written with.
#[tokio::test]
async fn test_numeric_id_round_trip() {
    let (engine, _) = engine();
    let stored = engine
        .create("Laptop", json!({"_id": 42, "price": 20}), &ctx())
        .await
        .unwrap();
    assert_eq!(stored["_id"], "42");

    let by_number = engine.query("Laptop", filter(json!({"_id": 42})), &ctx()).await.unwrap();
    assert_eq!(ids(&by_number), vec!["42"]);

    let by_in = engine
        .query("Laptop", filter(json!({"_id": {"$in": [42, 7]}})), &ctx())
        .await
        .unwrap();
    assert_eq!(ids(&by_in), vec!["42"]);

    let deleted = engine
        .delete(
            "Laptop",
            DeleteRequest {
                filter: Some(json!({"_id": 42, "price": 20})),
                id: None,
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(deleted, vec!["42"]);
}

/// An empty nested object is rejected rather than matching everything.
#[tokio::test]
async fn test_empty_nested_filter_rejected() {
    let (engine, _) = engine();
    engine.create("Laptop", json!({"_id": "d1", "model": "xps"}), &ctx()).await.unwrap();

    let err = engine
        .query("Laptop", filter(json!({"spec": {}})), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .delete(
            "Laptop",
            DeleteRequest {
                filter: Some(json!({"spec": {}})),
                id: None,
            },
            &ctx(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

/// Malformed filters are validation errors.
#[tokio::test]
async fn test_invalid_filter_rejected() {
    let (engine, _) = engine();
    let err = engine
        .query("Laptop", filter(json!({"price": {"$where": "1"}})), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(engine.metrics().snapshot().queries_rejected, 1);
}

// =============================================================================
// Delete
// =============================================================================

/// A delete returns the ids it removed; repeating it returns nothing.
#[tokio::test]
async fn test_delete_symmetry() {
    let (engine, store) = engine();
    engine
        .create_many(
            "Laptop",
            vec![json!({"_id": "d1", "price": 20}), json!({"_id": "d2", "price": 30})],
            &ctx(),
        )
        .await
        .unwrap();

    let request = DeleteRequest {
        filter: Some(json!({"price": 20})),
        id: None,
    };
    let first = engine.delete("Laptop", request.clone(), &ctx()).await.unwrap();
    assert_eq!(first, vec!["d1"]);
    assert_eq!(store.len("Laptop"), 1);

    let second = engine.delete("Laptop", request, &ctx()).await.unwrap();
    assert!(second.is_empty());

    let by_id = engine
        .delete(
            "Laptop",
            DeleteRequest {
                filter: None,
                id: Some("d2".into()),
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(by_id, vec!["d2"]);
}

/// An empty filter never deletes a whole domain.
#[tokio::test]
async fn test_delete_empty_filter_rejected() {
    let (engine, _) = engine();
    engine.create("Laptop", json!({"_id": "d1"}), &ctx()).await.unwrap();
    let err = engine
        .delete(
            "Laptop",
            DeleteRequest {
                filter: Some(json!({})),
                id: None,
            },
            &ctx(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

/// Laptop scenario: after deleting the 20-priced laptop, only the other
/// xps remains, and the stale model entry is pruned by the query.
#[tokio::test]
async fn test_laptop_scenario() {
    let (engine, _) = engine();
    engine
        .create("Laptop", json!({"_id": "d1", "model": "xps", "price": 20}), &ctx())
        .await
        .unwrap();
    engine
        .create("Laptop", json!({"_id": "d2", "model": "xps", "price": 30}), &ctx())
        .await
        .unwrap();

    let deleted = engine
        .delete(
            "Laptop",
            DeleteRequest {
                filter: Some(json!({"price": 20})),
                id: None,
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(deleted, vec!["d1"]);

    let before = engine.metrics().snapshot().entries_pruned;
    let result = engine.query("Laptop", filter(json!({"model": "xps"})), &ctx()).await.unwrap();
    assert_eq!(ids(&result), vec!["d2"]);
    assert_eq!(result.documents()[0]["price"], 30);
    assert!(engine.metrics().snapshot().entries_pruned > before);
}

/// With after-delete sweeping, empty nodes disappear with the delete.
#[tokio::test]
async fn test_after_delete_sweep() {
    let config = EngineConfig {
        orphan_sweep: OrphanSweep::AfterDelete,
        ..EngineConfig::default()
    };
    let (engine, _) = engine_with(config);
    engine
        .create("Laptop", json!({"_id": "d1", "model": "solo"}), &ctx())
        .await
        .unwrap();
    engine
        .delete(
            "Laptop",
            DeleteRequest {
                filter: None,
                id: Some("d1".into()),
            },
            &ctx(),
        )
        .await
        .unwrap();

    let report = engine.sweep("Laptop", &ctx()).await.unwrap();
    assert_eq!(report.nodes_visited, 0);
    assert_eq!(report.nodes_removed, 0);
}

// =============================================================================
// Update
// =============================================================================

/// $inc applied twice: 20 → 25 → 30, and the index follows.
#[tokio::test]
async fn test_increment_scenario() {
    let (engine, _) = engine();
    engine
        .create("Laptop", json!({"_id": "d1", "price": 20}), &ctx())
        .await
        .unwrap();

    for expected in [25, 30] {
        let updated = engine
            .update(
                "Laptop",
                UpdateRequest {
                    id: Some("d1".into()),
                    update: json!({"$inc": {"price": 5}}),
                    ..UpdateRequest::default()
                },
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(updated[0]["price"], expected);
    }

    let at_30 = engine.query("Laptop", filter(json!({"price": 30})), &ctx()).await.unwrap();
    assert_eq!(ids(&at_30), vec!["d1"]);
    let at_20 = engine.query("Laptop", filter(json!({"price": 20})), &ctx()).await.unwrap();
    assert!(at_20.documents().is_empty());
}

/// Filter updates apply $set to every match and keep creation fields.
#[tokio::test]
async fn test_update_by_filter() {
    let (engine, _) = engine();
    let original = engine
        .create("Laptop", json!({"_id": "d1", "model": "xps", "spec": {"ram": 8}}), &ctx())
        .await
        .unwrap();

    let updated = engine
        .update(
            "Laptop",
            UpdateRequest {
                filter: Some(json!({"model": "xps"})),
                update: json!({"$set": {"spec.ram": 16}}),
                ..UpdateRequest::default()
            },
            &RuleContext::new("app").with_uid("u2"),
        )
        .await
        .unwrap();
    assert_eq!(updated[0]["spec"]["ram"], 16);
    assert_eq!(updated[0]["createdAt"], original["createdAt"]);
    assert_eq!(updated[0]["createdBy"], "u1");

    let none = engine
        .update(
            "Laptop",
            UpdateRequest {
                filter: Some(json!({"model": "air"})),
                update: json!({"color": "red"}),
                ..UpdateRequest::default()
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}
