//! # Lifecycle events emitted by the orchestrator.
//!
//! The [`Topic`] enum names every notification the runtime publishes:
//! - **Init events**: `init.start`, `init.<service>`, `init.end`
//! - **Stop events**: `stop.start`, `stop.<service>`, `stop.end`
//! - **Error events**: `error` (carries the failing service and its error message)
//! - **Subscriber events**: overflow/panic reports from the subscriber workers
//!
//! The [`Event`] struct carries the payload: the service name, the realized
//! instance for readiness events and the error message for error events.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use servicevisor::{Event, Topic};
//!
//! let ev = Event::new(Topic::Error)
//!     .with_service("db")
//!     .with_error("connection refused");
//!
//! assert_eq!(ev.topic, Topic::Error);
//! assert_eq!(ev.service.as_deref(), Some("db"));
//! assert_eq!(ev.topic.to_string(), "error");
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::OrchestratorError;
use crate::services::ServiceRef;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Named lifecycle topic.
///
/// Per-service topics carry the service name, so a service called `start`
/// never collides with [`Topic::InitStart`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Initialization of the batch began (`init.start`).
    InitStart,
    /// One service is constructed and stored (`init.<service>`).
    ///
    /// Sets `service` and `instance`.
    ServiceReady(Arc<str>),
    /// Every service is ready (`init.end`).
    InitEnd,
    /// Shutdown began (`stop.start`).
    StopStart,
    /// One service has stopped (`stop.<service>`).
    ///
    /// Sets `service`.
    ServiceStopped(Arc<str>),
    /// Every service has stopped (`stop.end`).
    StopEnd,
    /// A service failed during init or stop (`error`).
    ///
    /// Sets `service`, `error`.
    Error,
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `service` (subscriber name), `error` (reason).
    SubscriberOverflow,
    /// Subscriber panicked while processing an event.
    ///
    /// Sets `service` (subscriber name), `error` (panic message).
    SubscriberPanicked,
}

impl Topic {
    /// Readiness topic for `service`.
    pub fn ready(service: impl Into<Arc<str>>) -> Self {
        Topic::ServiceReady(service.into())
    }

    /// Stop-completion topic for `service`.
    pub fn stopped(service: impl Into<Arc<str>>) -> Self {
        Topic::ServiceStopped(service.into())
    }

    /// Service name embedded in per-service topics.
    pub fn service(&self) -> Option<&str> {
        match self {
            Topic::ServiceReady(s) | Topic::ServiceStopped(s) => Some(&**s),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::InitStart => f.write_str("init.start"),
            Topic::ServiceReady(s) => write!(f, "init.{s}"),
            Topic::InitEnd => f.write_str("init.end"),
            Topic::StopStart => f.write_str("stop.start"),
            Topic::ServiceStopped(s) => write!(f, "stop.{s}"),
            Topic::StopEnd => f.write_str("stop.end"),
            Topic::Error => f.write_str("error"),
            Topic::SubscriberOverflow => f.write_str("subscriber.overflow"),
            Topic::SubscriberPanicked => f.write_str("subscriber.panicked"),
        }
    }
}

/// Lifecycle event with optional payload.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`Topic`]
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event topic.
    pub topic: Topic,
    /// Name of the service, if applicable.
    pub service: Option<Arc<str>>,
    /// Realized instance (readiness events only).
    pub instance: Option<ServiceRef>,
    /// Human-readable error message.
    pub error: Option<Arc<str>>,
    /// Stable error label (see `OrchestratorError::as_label`).
    pub label: Option<&'static str>,
}

impl Event {
    /// Creates a new event with current timestamp and next sequence number.
    pub fn new(topic: Topic) -> Self {
        let service = topic.service().map(Arc::from);
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            topic,
            service,
            instance: None,
            error: None,
            label: None,
        }
    }

    /// Readiness event for `service` carrying its instance.
    pub fn ready(service: &str, instance: ServiceRef) -> Self {
        Event::new(Topic::ready(service)).with_instance(instance)
    }

    /// Stop-completion event for `service`.
    pub fn stopped(service: &str) -> Self {
        Event::new(Topic::stopped(service))
    }

    /// Error event describing `err`, attributed to its service when it has one.
    pub fn failure(err: &OrchestratorError) -> Self {
        let ev = Event::new(Topic::Error)
            .with_error(err.to_string())
            .with_label(err.as_label());
        match err.service() {
            Some(service) => ev.with_service(service),
            None => ev,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches an error message.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches a stable error label.
    #[inline]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Attaches a realized service instance.
    #[inline]
    pub fn with_instance(mut self, instance: ServiceRef) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(Topic::SubscriberOverflow)
            .with_service(subscriber)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(Topic::SubscriberPanicked)
            .with_service(subscriber)
            .with_error(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.topic, Topic::SubscriberOverflow)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self.topic, Topic::Error)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("seq", &self.seq)
            .field("topic", &self.topic)
            .field("service", &self.service)
            .field("has_instance", &self.instance.is_some())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        assert_eq!(Topic::InitStart.to_string(), "init.start");
        assert_eq!(Topic::ready("db").to_string(), "init.db");
        assert_eq!(Topic::InitEnd.to_string(), "init.end");
        assert_eq!(Topic::StopStart.to_string(), "stop.start");
        assert_eq!(Topic::stopped("db").to_string(), "stop.db");
        assert_eq!(Topic::StopEnd.to_string(), "stop.end");
    }

    #[test]
    fn service_named_like_a_phase_does_not_collide() {
        assert_ne!(Topic::ready("end"), Topic::InitEnd);
        assert_eq!(Topic::ready("end").to_string(), Topic::InitEnd.to_string());
    }

    #[test]
    fn per_service_topics_fill_service_field() {
        let ev = Event::stopped("cache");
        assert_eq!(ev.service.as_deref(), Some("cache"));
        assert!(Event::new(Topic::StopEnd).service.is_none());
    }

    #[test]
    fn failure_carries_service_and_label() {
        let err = OrchestratorError::UnknownDependency {
            service: "a".into(),
            dependency: "missing".into(),
        };
        let ev = Event::failure(&err);
        assert!(ev.is_error());
        assert_eq!(ev.service.as_deref(), Some("a"));
        assert_eq!(ev.label, Some("unknown_dependency"));
        assert!(ev.error.as_deref().unwrap().contains("missing"));
    }

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(Topic::InitStart);
        let b = Event::new(Topic::InitStart);
        assert!(b.seq > a.seq);
    }
}
