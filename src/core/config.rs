//! # Orchestrator configuration.
//!
//! Provides [`OrchestratorConfig`] centralized settings for one orchestration.
//!
//! ## Sentinel values
//! - `init_timeout = 0s` → no timeout (a hung dependency wait blocks forever)
//! - `stop_timeout = 0s` → no timeout
//! - `bus_capacity` is clamped to at least 1

use std::time::Duration;

/// Configuration for the [`Orchestrator`](crate::Orchestrator).
///
/// ## Field semantics
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `init_timeout`: upper bound for the whole `init_all` call (`0s` = unbounded)
/// - `stop_timeout`: upper bound for the whole `stop` call (`0s` = unbounded)
/// - `detect_cycles`: reject cyclic registries before launching any task
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Dependency waiters never miss a readiness event on lag (they fall back to the
    /// live table), but user subscribers lagging behind more than `bus_capacity` events
    /// skip older items.
    pub bus_capacity: usize,

    /// Maximum time `init_all` may take before failing with `DeadlockTimeout`.
    pub init_timeout: Duration,

    /// Maximum time `stop` may take before failing with `DeadlockTimeout`.
    pub stop_timeout: Duration,

    /// Run the acyclicity check during registry validation.
    ///
    /// With `false`, a cycle deadlocks every service on it; only `init_timeout` bounds the wait.
    pub detect_cycles: bool,
}

impl OrchestratorConfig {
    /// Returns the init timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn init_timeout(&self) -> Option<Duration> {
        non_zero(self.init_timeout)
    }

    /// Returns the stop timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn stop_timeout(&self) -> Option<Duration> {
        non_zero(self.stop_timeout)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d == Duration::ZERO {
        None
    } else {
        Some(d)
    }
}

impl Default for OrchestratorConfig {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `init_timeout = 0s` (unbounded)
    /// - `stop_timeout = 0s` (unbounded)
    /// - `detect_cycles = true`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            init_timeout: Duration::ZERO,
            stop_timeout: Duration::ZERO,
            detect_cycles: true,
        }
    }
}
