//! # Change Publisher
//!
//! In-process pub/sub keyed by `(project, domain)`.
//!
//! Delivery is at-most-once and best effort: no persistence, no replay.
//! Handlers run in registration order for each `publish` call. The
//! subscriber list is copied before delivery, so handlers may subscribe or
//! unsubscribe while an emission is in progress. A handler that errors or
//! panics affects neither the emitter nor the other handlers.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::observability::{log_event_with_fields, Event};

use super::errors::{HandlerResult, SubscriberError};
use super::event::{ChangeEvent, Topic};

/// Handler invoked for every event on a topic
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) -> HandlerResult + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: u64,
    handler: ChangeHandler,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    topics: RwLock<HashMap<Topic, Vec<Subscriber>>>,
}

impl Registry {
    fn remove(&self, topic: &Topic, id: u64) -> bool {
        let Ok(mut topics) = self.topics.write() else {
            return false;
        };
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        removed
    }
}

/// Outcome of one `publish` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers that returned Ok
    pub delivered: usize,
    /// Handlers that failed, by subscription id
    pub failed: Vec<(u64, SubscriberError)>,
}

/// Handle returned by `subscribe`
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    topic: Topic,
    registry: Weak<Registry>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

impl Subscription {
    /// Subscription id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Subscribed topic
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Stop receiving events; returns whether the subscription was active
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.topic, self.id),
            None => false,
        }
    }
}

/// Constructed pub/sub service shared by `Arc` or `clone`
#[derive(Clone)]
pub struct ChangePublisher {
    inner: Arc<Registry>,
}

impl Default for ChangePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePublisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangePublisher {
    /// Create a publisher with no subscribers
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry::default()),
        }
    }

    /// Register a handler for a topic
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let registry = &self.inner;
        let id = registry.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut topics) = registry.topics.write() {
            topics.entry(topic.clone()).or_default().push(Subscriber {
                id,
                handler: Arc::new(handler),
            });
        }
        Subscription {
            id,
            topic,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Register a bounded channel for a topic
    ///
    /// A full channel drops the event; a closed receiver ends the
    /// subscription on the next publish.
    pub fn watch(&self, topic: Topic, capacity: usize) -> (Subscription, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscription = self.subscribe(topic, move |event| match tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(dropped)) => {
                log_event_with_fields(
                    Event::WatchDropped,
                    &[("id", dropped.id.as_str()), ("topic", &dropped.topic.to_string())],
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SubscriberError::Disconnected),
        });
        (subscription, rx)
    }

    /// Deliver an event to every current subscriber of its topic
    pub fn publish(&self, event: &ChangeEvent) -> PublishReport {
        let registry = &self.inner;
        let snapshot: Vec<Subscriber> = match registry.topics.read() {
            Ok(topics) => topics.get(&event.topic).cloned().unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        let mut report = PublishReport::default();
        for subscriber in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event)));
            let failure = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(err)) => err,
                Err(payload) => SubscriberError::Panicked(panic_message(payload.as_ref())),
            };

            let topic = event.topic.to_string();
            let reason = failure.to_string();
            log_event_with_fields(
                Event::SubscriberFailed,
                &[("topic", &topic), ("subscription", &subscriber.id.to_string()), ("reason", &reason)],
            );
            if failure == SubscriberError::Disconnected {
                registry.remove(&event.topic, subscriber.id);
            }
            report.failed.push((subscriber.id, failure));
        }
        report
    }

    /// Number of subscribers across all topics
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .topics
            .read()
            .map(|topics| topics.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Number of subscribers on one topic
    pub fn topic_subscribers(&self, topic: &Topic) -> usize {
        self.inner
            .topics
            .read()
            .map(|topics| topics.get(topic).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
