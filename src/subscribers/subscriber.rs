//! # Lifecycle observers.
//!
//! [`Subscribe`] lets user code watch `init.*`, `stop.*` and `error` events without taking
//! part in the orchestration. Subscribers are attached through
//! [`OrchestratorBuilder::with_subscriber`](crate::OrchestratorBuilder::with_subscriber) and
//! receive events from the start of `init_all` until `stop` finishes.
//!
//! A subscriber never slows a service task down: it reads from its own bounded queue on its
//! own worker. When the queue is full the event is dropped for that subscriber and
//! `Topic::SubscriberOverflow` is published; a panic inside `on_event` is reported as
//! `Topic::SubscriberPanicked` and the worker carries on with the next event.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use servicevisor::{Event, Subscribe, Topic};
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.is_error() {
//!             // bump a counter, page someone, ...
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failure-counter" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! # let _ = Topic::InitEnd;
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of lifecycle events.
///
/// Implementations should use async I/O and report their own errors; events arrive in bus
/// order for each subscriber.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event on the subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and in overflow/panic events.
    ///
    /// Defaults to `type_name::<Self>()`; a short name reads better in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Bound of this subscriber's queue (at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
