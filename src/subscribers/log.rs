//! # LogWriter: tracing-backed event logger
//!
//! A minimal subscriber that renders every [`Event`] through `tracing`.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO servicevisor: init started
//! INFO servicevisor: service ready service="db" ty="app::Db"
//! WARN servicevisor: service error service="cache" label="initialization_failure" error="..."
//! INFO servicevisor: all services stopped
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, Topic};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        match &e.topic {
            Topic::InitStart => info!(target: "servicevisor", seq = e.seq, "init started"),
            Topic::ServiceReady(_) => info!(
                target: "servicevisor",
                seq = e.seq,
                service,
                ty = e.instance.as_ref().map(|s| s.type_name()).unwrap_or("-"),
                "service ready"
            ),
            Topic::InitEnd => info!(target: "servicevisor", seq = e.seq, "all services ready"),
            Topic::StopStart => info!(target: "servicevisor", seq = e.seq, "stop started"),
            Topic::ServiceStopped(_) => {
                info!(target: "servicevisor", seq = e.seq, service, "service stopped")
            }
            Topic::StopEnd => info!(target: "servicevisor", seq = e.seq, "all services stopped"),
            Topic::Error => warn!(
                target: "servicevisor",
                seq = e.seq,
                service,
                label = e.label.unwrap_or("-"),
                error = e.error.as_deref().unwrap_or("unknown"),
                "service error"
            ),
            Topic::SubscriberOverflow => warn!(
                target: "servicevisor",
                subscriber = service,
                reason = e.error.as_deref().unwrap_or("unknown"),
                "subscriber overflow"
            ),
            Topic::SubscriberPanicked => warn!(
                target: "servicevisor",
                subscriber = service,
                info = e.error.as_deref().unwrap_or("unknown"),
                "subscriber panicked"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
