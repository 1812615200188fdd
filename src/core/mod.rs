//! Runtime core: orchestration and lifecycle.
//!
//! The public API from this module is [`Orchestrator`] (built with [`OrchestratorBuilder`]),
//! the [`ServiceTable`] it produces and the [`Shutdown`] handle that reverses it.
//!
//! Internal modules:
//! - [`orchestrator`]: validation, one task per service, first-error settlement;
//! - [`shutdown`]: reverse-dependency stop and the signal-driven variant;
//! - [`waiter`]: wait-sets over per-service topics;
//! - [`table`]: live service table and dependents index;
//! - [`signal`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod orchestrator;
mod shutdown;
mod signal;
mod table;
mod waiter;

pub use builder::OrchestratorBuilder;
pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
pub use shutdown::Shutdown;
pub use table::{DependentsIndex, ServiceTable};
