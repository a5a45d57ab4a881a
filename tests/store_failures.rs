//! Store Failure Tests
//!
//! - A store error surfaces as StoreUnavailable, unretried
//! - A slow store call is cut off at the configured deadline
//! - Cancellation aborts a request in flight

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbordb::config::EngineConfig;
use arbordb::context::RuleContext;
use arbordb::engine::{Engine, EngineError, QueryRequest};
use arbordb::store::{CollectionStore, FindOptions, MemoryStore, Mutation, RowPredicate, StoreError, StoreFuture};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Stores
// =============================================================================

/// Memory store that can be switched into failing or stalling mode
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    stall: AtomicBool,
    calls: AtomicUsize,
}

impl FaultyStore {
    fn fault<'a, T: Send + 'a>(&'a self, call: StoreFuture<'a, T>) -> StoreFuture<'a, T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.load(Ordering::SeqCst);
        let stall = self.stall.load(Ordering::SeqCst);
        Box::pin(async move {
            if failing {
                return Err(StoreError::unavailable("backend offline"));
            }
            if stall {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            call.await
        })
    }
}

impl CollectionStore for FaultyStore {
    fn get_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, Option<Value>> {
        self.fault(self.inner.get_by_id(collection, id))
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        predicate: RowPredicate<'a>,
        options: FindOptions,
    ) -> StoreFuture<'a, Vec<Value>> {
        self.fault(self.inner.find(collection, predicate, options))
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        mutations: Vec<Mutation>,
    ) -> StoreFuture<'a, Option<Value>> {
        self.fault(self.inner.update(collection, id, mutations))
    }

    fn delete_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, bool> {
        self.fault(self.inner.delete_by_id(collection, id))
    }

    fn collections(&self) -> StoreFuture<'_, Vec<String>> {
        self.fault(self.inner.collections())
    }
}

fn setup(timeout_ms: u64) -> (Engine, Arc<FaultyStore>) {
    let store = Arc::new(FaultyStore::default());
    let config = EngineConfig {
        store_timeout_ms: timeout_ms,
        ..EngineConfig::default()
    };
    (Engine::new(store.clone(), config), store)
}

fn ctx() -> RuleContext {
    RuleContext::new("app")
}

fn by_model() -> QueryRequest {
    QueryRequest {
        filter: Some(json!({"model": "xps"})),
        ..QueryRequest::default()
    }
}

// =============================================================================
// Unavailable Store
// =============================================================================

/// One failing call fails the request after exactly one attempt.
#[tokio::test]
async fn test_unavailable_store_propagates() {
    let (engine, store) = setup(1000);
    store.failing.store(true, Ordering::SeqCst);

    let err = engine
        .create("Laptop", json!({"_id": "d1", "model": "xps"}), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable(_)));
    assert_eq!(err.code(), "ARBOR_STORE_UNAVAILABLE");
    assert!(err.is_retryable());
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

/// Reads surface the same error once the store goes away.
#[tokio::test]
async fn test_query_fails_when_store_goes_down() {
    let (engine, store) = setup(1000);
    engine
        .create("Laptop", json!({"_id": "d1", "model": "xps"}), &ctx())
        .await
        .unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = engine.query("Laptop", by_model(), &ctx()).await.unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable(_)));

    store.failing.store(false, Ordering::SeqCst);
    let result = engine.query("Laptop", by_model(), &ctx()).await.unwrap();
    assert_eq!(result.documents().len(), 1);
}

// =============================================================================
// Deadlines and Cancellation
// =============================================================================

/// A stalled call is cut off at the store timeout.
#[tokio::test]
async fn test_slow_store_hits_deadline() {
    let (engine, store) = setup(20);
    store.stall.store(true, Ordering::SeqCst);

    let err = engine.query("Laptop", by_model(), &ctx()).await.unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded(20)));
    assert_eq!(err.code(), "ARBOR_DEADLINE_EXCEEDED");
}

/// Cancelling the request token aborts a stalled call.
#[tokio::test]
async fn test_cancellation_aborts_request() {
    let (engine, store) = setup(10_000);
    store.stall.store(true, Ordering::SeqCst);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = engine
        .query("Laptop", by_model(), &ctx().with_cancellation(token))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}
