//! # Shutdown: reverse-dependency teardown.
//!
//! [`Shutdown`] is handed out by a successful `init_all`. Stopping mirrors initialization
//! with the relation inverted: a service stops once every service that depended on it has
//! published `stop.<dependent>`.
//!
//! ```text
//! stop():
//!   publish stop.start
//!   for each live service "a" (concurrently):
//!       wait stop.<d> for d in DependentsIndex[a]
//!       a.stop()                    (optional Stoppable hook)
//!       Err ──► publish error { a, e }
//!       publish stop.a              (also after a failed hook)
//!   all settled ──► publish stop.end ──► first error or Ok
//! ```
//!
//! A failed hook never blocks its dependencies from stopping.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::{self, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::signal::wait_for_shutdown_signal;
use crate::core::table::{DependentsIndex, NameSet, ServiceTable};
use crate::core::waiter::{stopped_name, wait_all};
use crate::error::{panic_message, OrchestratorError, Phase, ServiceError};
use crate::events::{Bus, Event, Subscription, Topic};
use crate::services::ServiceRef;

/// Stop handle of an initialized batch.
///
/// Dropping it without calling [`stop`](Self::stop) leaves every service running; subscribers
/// receive the events already published and are then shut down.
pub struct Shutdown {
    app_name: Arc<str>,
    stop_timeout: Option<Duration>,
    bus: Bus,
    table: ServiceTable,
    dependents: DependentsIndex,
    listener: CancellationToken,
}

impl Shutdown {
    pub(crate) fn new(
        app_name: Arc<str>,
        stop_timeout: Option<Duration>,
        bus: Bus,
        table: ServiceTable,
        dependents: DependentsIndex,
        listener: CancellationToken,
    ) -> Self {
        Self {
            app_name,
            stop_timeout,
            bus,
            table,
            dependents,
            listener,
        }
    }

    /// Event bus of the orchestration.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Subscribes to the lifecycle event stream; call before `stop` to see `stop.start`.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// The live service table this handle will stop.
    pub fn services(&self) -> &ServiceTable {
        &self.table
    }

    /// Services that depend on `name`, sorted. They stop before `name` does.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.dependents.dependents_of(name)
    }

    /// Stops every live service in reverse dependency order.
    ///
    /// Waits for all stop tasks to settle and returns the first failure, if any.
    pub async fn stop(self) -> Result<(), OrchestratorError> {
        self.bus.publish(Event::new(Topic::StopStart));
        info!(app = %self.app_name, services = self.table.len(), "stopping services");

        let stopped = NameSet::default();
        let token = CancellationToken::new();
        let tasks: Vec<StopTask> = self
            .table
            .snapshot()
            .into_iter()
            .map(|(name, instance)| StopTask {
                dependents: self.dependents.dependents_of(&name),
                name,
                instance,
                stopped: stopped.clone(),
                bus: self.bus.clone(),
                sub: self.bus.subscribe(),
                token: token.clone(),
            })
            .collect();

        let mut set = JoinSet::new();
        let mut names = HashMap::with_capacity(tasks.len());
        for task in tasks {
            let name = task.name.clone();
            names.insert(set.spawn(task.run()).id(), name);
        }

        let settled = match self.stop_timeout {
            Some(limit) => match time::timeout(limit, settle_all(&mut set, &names)).await {
                Ok(res) => res,
                Err(_elapsed) => {
                    let err = OrchestratorError::DeadlockTimeout {
                        phase: Phase::Stop,
                        timeout: limit,
                        pending: self
                            .table
                            .names()
                            .into_iter()
                            .filter(|n| !stopped.contains(n))
                            .collect(),
                    };
                    self.bus.publish(Event::failure(&err));
                    token.cancel();
                    set.detach_all();
                    warn!(app = %self.app_name, error = %err, "shutdown timed out");
                    return Err(err);
                }
            },
            None => settle_all(&mut set, &names).await,
        };

        self.bus.publish(Event::new(Topic::StopEnd));
        match &settled {
            Ok(()) => info!(app = %self.app_name, "all services stopped"),
            Err(err) => warn!(app = %self.app_name, error = %err, "services stopped with errors"),
        }
        settled
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then [`stop`](Self::stop)s.
    ///
    /// If the signal handlers cannot be installed the services are stopped right away.
    pub async fn stop_on_signal(self) -> Result<(), OrchestratorError> {
        match wait_for_shutdown_signal().await {
            Ok(()) => info!(app = %self.app_name, "shutdown signal received"),
            Err(err) => {
                warn!(app = %self.app_name, error = %err, "signal handlers unavailable; stopping")
            }
        }
        self.stop().await
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.listener.cancel();
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("app_name", &self.app_name)
            .field("services", &self.table.names())
            .field("stop_timeout", &self.stop_timeout)
            .finish()
    }
}

/// Waits for every stop task; remembers the first error in completion order.
async fn settle_all(
    set: &mut JoinSet<Result<(), OrchestratorError>>,
    names: &HashMap<task::Id, String>,
) -> Result<(), OrchestratorError> {
    let mut first = None;
    while let Some(joined) = set.join_next_with_id().await {
        let err = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((_, Err(err))) => err,
            Err(join_err) => OrchestratorError::Aborted {
                service: names.get(&join_err.id()).cloned().unwrap_or_default(),
                reason: join_err.to_string(),
            },
        };
        first.get_or_insert(err);
    }
    first.map_or(Ok(()), Err)
}

struct StopTask {
    name: String,
    instance: ServiceRef,
    dependents: Vec<String>,
    stopped: NameSet,
    bus: Bus,
    sub: Subscription,
    token: CancellationToken,
}

impl StopTask {
    async fn run(mut self) -> Result<(), OrchestratorError> {
        let waited = wait_all(
            &mut self.sub,
            &self.dependents,
            stopped_name,
            |name| self.stopped.contains(name),
            |_| false,
            |name| debug!(service = %self.name, dependent = name, "dependent stopped"),
            &self.token,
        )
        .await;
        if waited.is_err() {
            return Err(OrchestratorError::Aborted {
                service: self.name,
                reason: "shutdown cancelled".to_string(),
            });
        }

        let hook = AssertUnwindSafe(self.instance.run_stop_hook())
            .catch_unwind()
            .await;
        let result = match hook {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(OrchestratorError::Teardown {
                service: self.name.clone(),
                source,
            }),
            Err(panic) => Err(OrchestratorError::Teardown {
                service: self.name.clone(),
                source: ServiceError::msg(panic_message(&*panic)),
            }),
        };

        if let Err(err) = &result {
            warn!(service = %self.name, error = %err, "service failed to stop");
            self.bus.publish(Event::failure(err));
        } else {
            info!(service = %self.name, "service stopped");
        }

        self.stopped.mark(&self.name);
        self.bus.publish(Event::stopped(&self.name));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OrchestratorConfig;
    use crate::core::orchestrator::Orchestrator;
    use crate::services::{InitContext, Registry, Service, ServiceDef, Stoppable};
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorded {
        name: &'static str,
        log: Log,
        fail: bool,
        hang: bool,
    }

    impl Service for Recorded {
        fn as_stoppable(&self) -> Option<&dyn Stoppable> {
            Some(self)
        }
    }

    #[async_trait]
    impl Stoppable for Recorded {
        async fn stop(&self) -> Result<(), ServiceError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(self.name.to_string());
            if self.fail {
                return Err(ServiceError::msg("flush failed"));
            }
            Ok(())
        }
    }

    #[derive(Clone)]
    struct Args {
        name: &'static str,
        log: Log,
        fail: bool,
        hang: bool,
    }

    fn def(args: Args, deps: &[&str]) -> impl crate::services::Definition {
        ServiceDef::new(args, |ctx: InitContext<Args, Recorded>| async move {
            let s = ctx.args().clone();
            Ok(Recorded {
                name: s.name,
                log: s.log,
                fail: s.fail,
                hang: s.hang,
            })
        })
        .with_deps(deps.iter().copied())
    }

    fn registry(log: &Log, fail: &str, hang: &str) -> Registry {
        let args = |name: &'static str| Args {
            name,
            log: log.clone(),
            fail: name == fail,
            hang: name == hang,
        };
        Registry::new()
            .with_service("a", def(args("a"), &[]))
            .with_service("b", def(args("b"), &["a"]))
            .with_service("c", def(args("c"), &["a"]))
    }

    #[tokio::test]
    async fn dependencies_stop_after_dependents() {
        let log: Log = Arc::default();
        let (_, shutdown) = Orchestrator::new("stop")
            .init_all(registry(&log, "", ""))
            .await
            .unwrap();
        assert_eq!(shutdown.dependents_of("a"), vec!["b", "c"]);

        let mut events = shutdown.subscribe();
        shutdown.stop().await.unwrap();

        let order = log.lock().unwrap().clone();
        assert_eq!(order.len(), 3);
        assert_eq!(order[2], "a");
        assert!(events.next_matching(&Topic::StopEnd).await.is_some());
    }

    #[tokio::test]
    async fn failed_hook_still_releases_dependencies() {
        let log: Log = Arc::default();
        let (_, shutdown) = Orchestrator::new("stop")
            .init_all(registry(&log, "b", ""))
            .await
            .unwrap();
        let mut events = shutdown.subscribe();

        match shutdown.stop().await.unwrap_err() {
            OrchestratorError::Teardown { service, source } => {
                assert_eq!(service, "b");
                assert_eq!(source.to_string(), "flush failed");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(log.lock().unwrap().contains(&"a".to_string()));

        let err = events.next_matching(&Topic::Error).await.unwrap();
        assert_eq!(err.service.as_deref(), Some("b"));
        assert!(events.next_matching(&Topic::stopped("a")).await.is_some());
        assert!(events.next_matching(&Topic::StopEnd).await.is_some());
    }

    #[tokio::test]
    async fn hung_hook_hits_stop_timeout() {
        let log: Log = Arc::default();
        let (_, shutdown) = Orchestrator::builder("stop")
            .with_config(OrchestratorConfig {
                stop_timeout: Duration::from_millis(50),
                ..OrchestratorConfig::default()
            })
            .build()
            .init_all(registry(&log, "", "c"))
            .await
            .unwrap();

        match shutdown.stop().await.unwrap_err() {
            OrchestratorError::DeadlockTimeout { phase, pending, .. } => {
                assert_eq!(phase, Phase::Stop);
                assert_eq!(pending, vec!["a", "c"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    async fn dies() -> Result<(), OrchestratorError> {
        panic!("worker died")
    }

    #[tokio::test]
    async fn join_failure_is_attributed_to_its_service() {
        let mut set = JoinSet::new();
        let mut names = HashMap::new();
        names.insert(set.spawn(async { Ok(()) }).id(), "cache".to_string());
        names.insert(set.spawn(dies()).id(), "db".to_string());

        match settle_all(&mut set, &names).await.unwrap_err() {
            OrchestratorError::Aborted { service, .. } => assert_eq!(service, "db"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
