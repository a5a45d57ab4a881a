//! # Real-Time Module
//!
//! Change notifications for document writes.
//!
//! - **Events**: create/update/delete announcements per `(project, domain)`
//! - **Publisher**: in-process subscribe/publish with handler isolation
//!
//! Delivery is best effort. Nothing is persisted or replayed, and a failing
//! subscriber never fails the write that produced the event.

pub mod errors;
pub mod event;
pub mod publisher;

pub use errors::{HandlerResult, SubscriberError};
pub use event::{ChangeEvent, OperationType, Topic};
pub use publisher::{ChangeHandler, ChangePublisher, PublishReport, Subscription};
