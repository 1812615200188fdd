use std::sync::Arc;

use crate::core::config::OrchestratorConfig;
use crate::core::orchestrator::Orchestrator;
use crate::subscribers::Subscribe;

/// Builder for constructing an [`Orchestrator`] with optional features.
pub struct OrchestratorBuilder {
    app_name: Arc<str>,
    cfg: OrchestratorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl OrchestratorBuilder {
    /// Creates a builder with default configuration and no subscribers.
    pub fn new(app_name: impl Into<Arc<str>>) -> Self {
        Self {
            app_name: app_name.into(),
            cfg: OrchestratorConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: OrchestratorConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every lifecycle event (init, stop, errors)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Appends one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the orchestrator and its event bus.
    ///
    /// Subscriber workers are spawned lazily by `init_all`, so this does not need a runtime.
    pub fn build(self) -> Orchestrator {
        Orchestrator::new_internal(self.app_name, self.cfg, self.subscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn builder_applies_config() {
        let orch = OrchestratorBuilder::new("app")
            .with_config(OrchestratorConfig {
                init_timeout: Duration::from_secs(3),
                ..OrchestratorConfig::default()
            })
            .build();
        assert_eq!(orch.app_name(), "app");
        assert_eq!(orch.config().init_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(orch.config().stop_timeout(), None);
    }
}
