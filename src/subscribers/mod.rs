//! # Event subscribers for the servicevisor runtime.
//!
//! This module provides the [`Subscribe`] trait and the internal fan-out the orchestrator
//! uses to deliver bus events to user code.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   service task ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//!                                                                  ┌────────┼────────┐
//!                                                                  ▼        ▼        ▼
//!                                                              LogWriter  Metrics  Custom
//! ```
//!
//! The listener runs from the start of `init_all` until the end of `stop` (or until
//! `init_all` fails), then the set drains its queues and shuts down.

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub(crate) use subscriber_set::SubscriberSet;
