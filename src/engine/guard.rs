//! Request guard
//!
//! Every Collection Store call made on behalf of a request races the
//! caller's cancellation token and a per-call deadline. The first to
//! finish decides the outcome; a cancelled or timed-out call is dropped.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::store::{CollectionStore, FindOptions, Mutation, RowPredicate, StoreResult};

use super::errors::{EngineError, EngineResult};

/// Cancellation and deadline for one request
#[derive(Debug, Clone)]
pub struct RequestGuard {
    cancellation: Option<CancellationToken>,
    timeout: Duration,
}

impl RequestGuard {
    /// Guard with an optional cancellation token and a per-call deadline
    pub fn new(cancellation: Option<CancellationToken>, timeout: Duration) -> Self {
        Self {
            cancellation,
            timeout,
        }
    }

    /// Whether the request has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Fail fast if the request has been cancelled
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Await a store call under the guard
    pub async fn run<T, F>(&self, call: F) -> EngineResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check()?;
        let deadline = tokio::time::timeout(self.timeout, call);
        let outcome = match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(EngineError::Cancelled),
                outcome = deadline => outcome,
            },
            None => deadline.await,
        };
        match outcome {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::DeadlineExceeded(self.timeout.as_millis() as u64)),
        }
    }
}

/// A store borrowed for one request, with every call guarded
pub struct GuardedStore<'s> {
    store: &'s dyn CollectionStore,
    guard: RequestGuard,
}

impl<'s> GuardedStore<'s> {
    /// Wrap a store
    pub fn new(store: &'s dyn CollectionStore, guard: RequestGuard) -> Self {
        Self { store, guard }
    }

    pub async fn get_by_id(&self, collection: &str, id: &str) -> EngineResult<Option<Value>> {
        self.guard.run(self.store.get_by_id(collection, id)).await
    }

    pub async fn find(
        &self,
        collection: &str,
        predicate: RowPredicate<'_>,
        options: FindOptions,
    ) -> EngineResult<Vec<Value>> {
        self.guard.run(self.store.find(collection, predicate, options)).await
    }

    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        mutations: Vec<Mutation>,
    ) -> EngineResult<Option<Value>> {
        self.guard.run(self.store.update(collection, id, mutations)).await
    }

    pub async fn delete_by_id(&self, collection: &str, id: &str) -> EngineResult<bool> {
        self.guard.run(self.store.delete_by_id(collection, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};

    #[tokio::test]
    async fn test_passes_result_through() {
        let guard = RequestGuard::new(None, Duration::from_secs(1));
        let value = guard.run(async { Ok::<_, StoreError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_store_error_maps() {
        let guard = RequestGuard::new(None, Duration::from_secs(1));
        let err = guard
            .run(async { Err::<(), _>(StoreError::unavailable("down")) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let token = CancellationToken::new();
        token.cancel();
        let guard = RequestGuard::new(Some(token), Duration::from_secs(1));
        let err = guard.run(async { Ok::<_, StoreError>(()) }).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_while_pending() {
        let token = CancellationToken::new();
        let guard = RequestGuard::new(Some(token.clone()), Duration::from_secs(30));
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let err = guard
            .run(std::future::pending::<StoreResult<()>>())
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let guard = RequestGuard::new(None, Duration::from_millis(10));
        let err = guard
            .run(std::future::pending::<StoreResult<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DeadlineExceeded(10)));
    }

    #[tokio::test]
    async fn test_guarded_store_round_trip() {
        let store = MemoryStore::new();
        let guarded = GuardedStore::new(&store, RequestGuard::new(None, Duration::from_secs(1)));
        guarded
            .update("Laptop", "d1", vec![Mutation::set("_id", serde_json::json!("d1"))])
            .await
            .unwrap();
        assert!(guarded.get_by_id("Laptop", "d1").await.unwrap().is_some());
        assert!(guarded.delete_by_id("Laptop", "d1").await.unwrap());
        assert!(!guarded.delete_by_id("Laptop", "d1").await.unwrap());
    }
}
