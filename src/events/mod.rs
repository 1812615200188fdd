//! Lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/await lifecycle notifications emitted by the orchestrator and service tasks.
//!
//! ## Contents
//! - [`Topic`], [`Event`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast` with one-shot topic waits
//!
//! ## Quick reference
//! - **Publishers**: `Orchestrator::init_all`, per-service init/stop tasks,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: dependency `Waiter`s, the subscriber listener, user code.

mod bus;
mod event;

pub use bus::{Bus, Recv, Subscription};
pub use event::{Event, Topic};
