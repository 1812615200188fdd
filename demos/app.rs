//! Starts a small service graph, waits for Ctrl-C (or SIGTERM) and stops it again.
//!
//! ```text
//! config ──► db ──► api
//!    └─────► cache ─┘
//! ```
//!
//! Run with `RUST_LOG=info cargo run --example app --features logging`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use servicevisor::{
    InitContext, LogWriter, Orchestrator, OrchestratorConfig, Registry, Service, ServiceDef,
    ServiceError, Startable, Stoppable,
};
use tracing_subscriber::EnvFilter;

struct Settings {
    db_url: String,
    cache_size: usize,
}
impl Service for Settings {}

struct Db {
    url: String,
}

impl Service for Db {
    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }
}

#[async_trait]
impl Stoppable for Db {
    async fn stop(&self) -> Result<(), ServiceError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracing::info!(url = %self.url, "db connections closed");
        Ok(())
    }
}

struct Cache {
    size: usize,
}
impl Service for Cache {}

struct Api {
    db: Arc<Db>,
    cache: Arc<Cache>,
}

impl Service for Api {
    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }
}

#[async_trait]
impl Startable for Api {
    async fn start(&self) -> Result<(), ServiceError> {
        tracing::info!(db = %self.db.url, cache = self.cache.size, "api listening");
        Ok(())
    }
}

#[async_trait]
impl Stoppable for Api {
    async fn stop(&self) -> Result<(), ServiceError> {
        tracing::info!("api draining requests");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = Registry::new()
        .with_service(
            "config",
            ServiceDef::new((), |_ctx: InitContext<(), Settings>| async {
                Ok(Settings {
                    db_url: "postgres://localhost/app".into(),
                    cache_size: 512,
                })
            }),
        )
        .with_service(
            "db",
            ServiceDef::new((), |ctx: InitContext<(), Db>| async move {
                let settings = ctx.dependency::<Settings>("config")?;
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Db {
                    url: settings.db_url.clone(),
                })
            })
            .with_deps(["config"]),
        )
        .with_service(
            "cache",
            ServiceDef::new((), |ctx: InitContext<(), Cache>| async move {
                let settings = ctx.dependency::<Settings>("config")?;
                Ok(Cache {
                    size: settings.cache_size,
                })
            })
            .with_deps(["config"]),
        )
        .with_service(
            "api",
            ServiceDef::new((), |ctx: InitContext<(), Api>| async move {
                Ok(Api {
                    db: ctx.dependency("db")?,
                    cache: ctx.dependency("cache")?,
                })
            })
            .with_deps(["db", "cache"]),
        );

    let orchestrator = Orchestrator::builder("demo")
        .with_config(OrchestratorConfig {
            init_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(10),
            ..OrchestratorConfig::default()
        })
        .with_subscriber(Arc::new(LogWriter::new()))
        .build();

    let (services, shutdown) = orchestrator.init_all(registry).await?;
    tracing::info!(services = ?services.names(), "press Ctrl-C to stop");

    shutdown.stop_on_signal().await?;
    Ok(())
}
