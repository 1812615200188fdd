//! Error types used by the servicevisor runtime and services.
//!
//! This module defines two main error types:
//!
//! - [`OrchestratorError`]: errors raised by the orchestration runtime itself
//!   (registry validation, failed initialization/teardown, timeouts).
//! - [`ServiceError`]: errors raised by individual initializers and lifecycle hooks.
//!
//! Every per-service failure is wrapped with the owning service name before it leaves
//! the runtime, so callers always know which service broke the batch.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Lifecycle phase a runtime error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `Orchestrator::init_all`.
    Init,
    /// `Shutdown::stop`.
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => f.write_str("init"),
            Phase::Stop => f.write_str("stop"),
        }
    }
}

/// # Errors produced by the servicevisor runtime.
///
/// `init_all` and `stop` reject with the **first** error observed; later failures of
/// sibling services are still published on the bus but are not returned.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A declared dependency is absent from the registry. Detected before any task starts.
    #[error("service `{service}` depends on unknown service `{dependency}`")]
    UnknownDependency {
        /// Service that declared the dependency.
        service: String,
        /// Name that could not be resolved.
        dependency: String,
    },

    /// The dependency relation contains at least one cycle.
    #[error("dependency cycle detected between services {cycle:?}")]
    DependencyCycle {
        /// Services on a dependency cycle (sorted).
        cycle: Vec<String>,
    },

    /// An initializer or post-init hook failed.
    #[error("service `{service}` failed to initialize: {source}")]
    Initialization {
        /// Owning service.
        service: String,
        /// Underlying failure.
        #[source]
        source: ServiceError,
    },

    /// A stop hook failed.
    #[error("service `{service}` failed to stop: {source}")]
    Teardown {
        /// Owning service.
        service: String,
        /// Underlying failure.
        #[source]
        source: ServiceError,
    },

    /// A dependency failed to initialize, so this service never ran its initializer.
    #[error("service `{service}` not initialized: dependency `{dependency}` failed")]
    DependencyFailed {
        /// Service that was waiting.
        service: String,
        /// Dependency that failed.
        dependency: String,
    },

    /// A resolved dependency has a different concrete type than requested.
    #[error("service `{service}`: dependency `{dependency}` is not a `{expected}`")]
    DependencyMismatch {
        /// Service performing the lookup.
        service: String,
        /// Dependency being looked up.
        dependency: String,
        /// Requested type name.
        expected: &'static str,
    },

    /// The configured phase timeout elapsed before every service settled.
    #[error("{phase} timeout {timeout:?} exceeded; pending: {pending:?}")]
    DeadlockTimeout {
        /// Phase that timed out.
        phase: Phase,
        /// The configured timeout.
        timeout: Duration,
        /// Services that had not settled (sorted).
        pending: Vec<String>,
    },

    /// A service task was cancelled or panicked before settling.
    #[error("service `{service}` task aborted: {reason}")]
    Aborted {
        /// Owning service.
        service: String,
        /// Cancellation or panic message.
        reason: String,
    },
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servicevisor::OrchestratorError;
    ///
    /// let err = OrchestratorError::UnknownDependency {
    ///     service: "api".into(),
    ///     dependency: "db".into(),
    /// };
    /// assert_eq!(err.as_label(), "unknown_dependency");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::UnknownDependency { .. } => "unknown_dependency",
            OrchestratorError::DependencyCycle { .. } => "dependency_cycle",
            OrchestratorError::Initialization { .. } => "initialization_failure",
            OrchestratorError::Teardown { .. } => "teardown_failure",
            OrchestratorError::DependencyFailed { .. } => "dependency_failed",
            OrchestratorError::DependencyMismatch { .. } => "dependency_mismatch",
            OrchestratorError::DeadlockTimeout { .. } => "deadlock_timeout",
            OrchestratorError::Aborted { .. } => "aborted",
        }
    }

    /// Returns the service this error is attributed to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            OrchestratorError::UnknownDependency { service, .. }
            | OrchestratorError::Initialization { service, .. }
            | OrchestratorError::Teardown { service, .. }
            | OrchestratorError::DependencyFailed { service, .. }
            | OrchestratorError::DependencyMismatch { service, .. }
            | OrchestratorError::Aborted { service, .. } => Some(service),
            OrchestratorError::DependencyCycle { .. }
            | OrchestratorError::DeadlockTimeout { .. } => None,
        }
    }
}

/// # Errors produced by initializers and lifecycle hooks.
///
/// Service code returns this type; the runtime wraps it into
/// [`OrchestratorError::Initialization`] or [`OrchestratorError::Teardown`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Plain failure message.
    #[error("{error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// Any other error raised by service code.
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A runtime error surfaced inside service code (e.g. a typed dependency lookup).
    #[error(transparent)]
    Runtime(Box<OrchestratorError>),
}

impl ServiceError {
    /// Creates a [`ServiceError::Failed`] from a message.
    ///
    /// ```
    /// use servicevisor::ServiceError;
    ///
    /// let err = ServiceError::msg("connection refused");
    /// assert_eq!(err.to_string(), "connection refused");
    /// ```
    pub fn msg(error: impl Into<String>) -> Self {
        ServiceError::Failed {
            error: error.into(),
        }
    }

    /// Wraps any error type.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ServiceError::Other(Box::new(err))
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl From<OrchestratorError> for ServiceError {
    fn from(err: OrchestratorError) -> Self {
        ServiceError::Runtime(Box::new(err))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::other(err)
    }
}
