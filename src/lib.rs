//! # servicevisor
//!
//! **Servicevisor** is a dependency-aware lifecycle orchestrator for async services.
//!
//! Each service is registered under a name together with an async initializer and the
//! names of the services it depends on. The runtime starts every service concurrently,
//! holds each one back until its dependencies are ready, and later stops them in the
//! reverse order. No graph traversal is scheduled up front: ordering emerges from services
//! publishing readiness events on a shared bus and waiting for each other's events.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  ServiceDef  │   │  ServiceDef  │   │  ServiceDef  │
//!     │  "config"    │   │  "db"        │   │  "api"       │
//!     │  deps: []    │   │  deps:[cfg]  │   │ deps:[cfg,db]│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry (name → definition, validated before launch)            │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator::init_all                                           │
//! │  - Bus (broadcast events)                                         │
//! │  - ServiceTable (write-once name → instance)                      │
//! │  - DependentsIndex (name → services that depend on it)            │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ service task │   │ service task │   │ service task │   │
//!     │  (config)    │   │  (db)        │   │  (api)       │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ waits: -         │ waits: init.cfg  │ waits: init.cfg │
//!      │                  │                  │        init.db  │
//!      │ publishes:       │ publishes:       │ publishes:      │
//!      │ init.config      │ init.db          │ init.api        │
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │            (capacity: OrchestratorConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                          ┌────────┼────────┐
//!                          ▼        ▼        ▼
//!                       worker1  worker2  workerN
//! ```
//!
//! ### Lifecycle
//! ```text
//! init_all(registry)
//!   ├─► publish init.start
//!   ├─► validate: unknown dependencies, cycles ─► Err, nothing started
//!   ├─► per service, concurrently:
//!   │     wait init.<dep>* ─► initialize ─► start hook ─► table write ─► publish init.<svc>
//!   ├─► first failure ─► publish error, cancel waits, Err
//!   └─► all ready     ─► publish init.end ─► Ok((ServiceTable, Shutdown))
//!
//! Shutdown::stop()
//!   ├─► publish stop.start
//!   ├─► per service, concurrently:
//!   │     wait stop.<dependent>* ─► stop hook ─► publish stop.<svc> (even on failure)
//!   └─► all settled ─► publish stop.end ─► first error or Ok
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                           |
//! |-------------------|----------------------------------------------------------------|----------------------------------------------|
//! | **Services**      | Define services with args, initializer, dependencies and hooks.| [`ServiceDef`], [`Service`], [`Stoppable`]   |
//! | **Registry**      | Static name → definition map with eager validation.            | [`Registry`]                                 |
//! | **Orchestration** | Concurrent dependency-ordered init, reverse-ordered stop.      | [`Orchestrator`], [`Shutdown`]               |
//! | **Events**        | Observe lifecycle topics on a broadcast bus.                   | [`Bus`], [`Event`], [`Topic`]                |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom).         | [`Subscribe`]                                |
//! | **Errors**        | Typed errors for orchestration and service code.               | [`OrchestratorError`], [`ServiceError`]      |
//! | **Configuration** | Timeouts, bus capacity, cycle detection.                       | [`OrchestratorConfig`]                       |
//!
//! ## Optional features
//! - `logging`: exports the tracing-backed [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use servicevisor::{InitContext, Orchestrator, Registry, Service, ServiceDef, ServiceError};
//!
//! struct Config { url: String }
//! impl Service for Config {}
//!
//! struct Db { url: String }
//! impl Service for Db {}
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new()
//!         .with_service(
//!             "config",
//!             ServiceDef::new("mem://".to_string(), |ctx: InitContext<String, Config>| async move {
//!                 Ok::<_, ServiceError>(Config { url: ctx.args().clone() })
//!             }),
//!         )
//!         .with_service(
//!             "db",
//!             ServiceDef::new((), |ctx: InitContext<(), Db>| async move {
//!                 let cfg: Arc<Config> = ctx.dependency("config")?;
//!                 Ok(Db { url: cfg.url.clone() })
//!             })
//!             .with_deps(["config"]),
//!         );
//!
//!     let (services, shutdown) = Orchestrator::new("demo").init_all(registry).await?;
//!     assert_eq!(services.get::<Db>("db").map(|db| db.url.clone()).as_deref(), Some("mem://"));
//!
//!     shutdown.stop().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod services;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    DependentsIndex, Orchestrator, OrchestratorBuilder, OrchestratorConfig, ServiceTable,
    Shutdown,
};
pub use error::{OrchestratorError, Phase, ServiceError};
pub use events::{Bus, Event, Recv, Subscription, Topic};
pub use services::{
    Ctor, Definition, InitContext, InitScope, Registry, Service, ServiceDef, ServiceRef,
    Startable, Stoppable,
};
pub use subscribers::Subscribe;

// Optional: expose the tracing-backed logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
