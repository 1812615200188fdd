//! # Orchestrator: dependency-aware concurrent initialization.
//!
//! The [`Orchestrator`] owns the event bus of one orchestration. [`Orchestrator::init_all`]
//! launches one task per registered service; each task blocks on the readiness events of
//! its dependencies, runs its initializer, stores the instance and announces itself ready.
//! No topological sort is computed: ordering emerges from the publish/wait pattern.
//!
//! ## High-level architecture
//! ```text
//! init_all(registry):
//!   publish init.start
//!   registry.validate()            ── UnknownDependency / DependencyCycle (no task started)
//!   subscribe one receiver per service
//!   spawn service tasks (JoinSet)
//!
//! service task "b" (deps = ["a"]):
//!   wait_dependencies ── init.a ──► DependentsIndex[a] += b
//!   definition.initialize(InitContext)
//!   instance.start()               (optional Startable hook)
//!   ServiceTable[b] = instance     (write-once)
//!   publish init.b { instance }
//!
//! all tasks Ok        ──► publish init.end ──► (ServiceTable, Shutdown)
//! first task Err(e)   ──► publish error { b, e } (from the task), detach the rest, Err(e)
//!   dependents of b   ──► wake on error, publish error { DependencyFailed }, never initialize
//!   unrelated tasks   ──► keep running and publish their own outcome
//! init_timeout hit    ──► publish error, cancel every wait, return DeadlockTimeout { pending }
//! ```
//!
//! ## Rules
//! - A service's ready event is published only after its table entry is written.
//! - Initializers of services without a dependency relation run concurrently.
//! - A service whose dependency failed never runs its initializer; the failure carries on
//!   through its own dependents.
//! - Services not downstream of a failure are not cancelled when the batch fails; their
//!   outcome is still published, but the batch result is the first error.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::{self, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::builder::OrchestratorBuilder;
use crate::core::config::OrchestratorConfig;
use crate::core::shutdown::Shutdown;
use crate::core::table::{DependentsIndex, NameSet, ServiceTable};
use crate::core::waiter::{wait_dependencies, DependencyWaitError};
use crate::error::{panic_message, OrchestratorError, Phase, ServiceError};
use crate::events::{Bus, Event, Recv, Subscription, Topic};
use crate::services::{Definition, InitScope, Registry};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Drives concurrent initialization of a [`Registry`] and hands back the shutdown path.
///
/// One orchestrator runs one batch: [`init_all`](Self::init_all) consumes it.
pub struct Orchestrator {
    app_name: Arc<str>,
    cfg: OrchestratorConfig,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Orchestrator {
    /// Creates an orchestrator with default configuration and no subscribers.
    pub fn new(app_name: impl Into<Arc<str>>) -> Self {
        Self::builder(app_name).build()
    }

    /// Returns a builder for configuring subscribers and settings.
    pub fn builder(app_name: impl Into<Arc<str>>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(app_name)
    }

    pub(crate) fn new_internal(
        app_name: Arc<str>,
        cfg: OrchestratorConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self {
            app_name,
            cfg,
            bus,
            subscribers,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.cfg
    }

    /// Event bus of this orchestration.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Subscribes to the lifecycle event stream; call before `init_all` to see `init.start`.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Initializes every registered service, respecting declared dependencies.
    ///
    /// On success returns the live [`ServiceTable`] and the [`Shutdown`] handle. On failure
    /// no handle is returned; partially constructed services are abandoned.
    pub async fn init_all(
        self,
        registry: Registry,
    ) -> Result<(ServiceTable, Shutdown), OrchestratorError> {
        let listener = self.spawn_subscriber_listener();

        self.bus.publish(Event::new(Topic::InitStart));
        info!(app = %self.app_name, services = registry.len(), "initializing services");

        if let Err(err) = registry.validate(self.cfg.detect_cycles) {
            warn!(app = %self.app_name, error = %err, "registry rejected");
            self.bus.publish(Event::failure(&err));
            listener.cancel();
            return Err(err);
        }

        let registry = Arc::new(registry);
        let table = ServiceTable::new();
        let dependents = DependentsIndex::new();
        let failures = NameSet::default();
        let token = CancellationToken::new();

        // Every receiver exists before the first task can publish.
        let tasks: Vec<InitTask> = registry
            .iter()
            .map(|(name, def)| InitTask {
                app_name: Arc::clone(&self.app_name),
                name: name.to_string(),
                def: Arc::clone(def),
                registry: Arc::clone(&registry),
                table: table.clone(),
                failures: failures.clone(),
                dependents: dependents.clone(),
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

        let settled = match self.cfg.init_timeout() {
            Some(limit) => match time::timeout(limit, first_error(&mut set, &names)).await {
                Ok(res) => res,
                Err(_elapsed) => {
                    let err = OrchestratorError::DeadlockTimeout {
                        phase: Phase::Init,
                        timeout: limit,
                        pending: registry
                            .names()
                            .filter(|n| !table.contains(n))
                            .map(str::to_string)
                            .collect(),
                    };
                    self.bus.publish(Event::failure(&err));
                    token.cancel();
                    Err(err)
                }
            },
            None => first_error(&mut set, &names).await,
        };

        match settled {
            Ok(()) => {
                self.bus.publish(Event::new(Topic::InitEnd));
                info!(app = %self.app_name, services = table.len(), "all services ready");
                let shutdown = Shutdown::new(
                    Arc::clone(&self.app_name),
                    self.cfg.stop_timeout(),
                    self.bus.clone(),
                    table.clone(),
                    dependents,
                    listener,
                );
                Ok((table, shutdown))
            }
            Err(err) => {
                warn!(app = %self.app_name, error = %err, "initialization failed");
                set.detach_all();
                listener.cancel();
                Err(err)
            }
        }
    }

    /// Forwards bus events to the configured subscribers until the returned token is cancelled.
    ///
    /// Events already queued on the bus when the token fires are still delivered.
    fn spawn_subscriber_listener(&self) -> CancellationToken {
        let stop = CancellationToken::new();
        if self.subscribers.is_empty() {
            return stop;
        }

        let mut rx = self.bus.subscribe();
        let set = SubscriberSet::new(self.subscribers.clone(), self.bus.clone());
        let done = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Recv::Event(ev) => set.emit(&ev),
                        Recv::Lagged(skipped) => {
                            warn!(skipped, "subscriber listener lagged");
                        }
                        Recv::Closed => break,
                    },
                    _ = done.cancelled() => break,
                }
            }
            set.shutdown().await;
        });
        stop
    }
}

/// Waits for every task; returns the first error in completion order.
async fn first_error(
    set: &mut JoinSet<Result<(), OrchestratorError>>,
    names: &HashMap<task::Id, String>,
) -> Result<(), OrchestratorError> {
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((_, Err(err))) => return Err(err),
            Err(join_err) => {
                return Err(OrchestratorError::Aborted {
                    service: names.get(&join_err.id()).cloned().unwrap_or_default(),
                    reason: join_err.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Outcome of one service task that did not produce an instance.
enum InitFailure {
    /// The service itself or one of its dependencies failed (published on the error topic).
    Failed(OrchestratorError),
    /// The batch timed out while this service was still waiting.
    Cancelled,
}

/// Everything one service task needs; owned by the task.
struct InitTask {
    app_name: Arc<str>,
    name: String,
    def: Arc<dyn Definition>,
    registry: Arc<Registry>,
    table: ServiceTable,
    failures: NameSet,
    dependents: DependentsIndex,
    bus: Bus,
    sub: Subscription,
    token: CancellationToken,
}

impl InitTask {
    async fn run(mut self) -> Result<(), OrchestratorError> {
        let outcome = match AssertUnwindSafe(self.init_service()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(InitFailure::Failed(OrchestratorError::Aborted {
                service: self.name.clone(),
                reason: panic_message(&*panic),
            })),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(InitFailure::Failed(err)) => {
                warn!(service = %self.name, error = %err, "service failed to initialize");
                self.failures.mark(&self.name);
                self.bus.publish(Event::failure(&err));
                Err(err)
            }
            Err(InitFailure::Cancelled) => {
                debug!(service = %self.name, "dependency wait cancelled");
                Err(OrchestratorError::Aborted {
                    service: self.name,
                    reason: "initialization cancelled".to_string(),
                })
            }
        }
    }

    async fn init_service(&mut self) -> Result<(), InitFailure> {
        let deps = self.def.dependencies();
        let instances = wait_dependencies(
            &self.name,
            deps,
            &self.registry,
            &self.table,
            &self.failures,
            &self.dependents,
            &mut self.sub,
            &self.token,
        )
        .await
        .map_err(|err| match err {
            DependencyWaitError::Invalid(err) | DependencyWaitError::Failed(err) => {
                InitFailure::Failed(err)
            }
            DependencyWaitError::Aborted => InitFailure::Cancelled,
        })?;

        debug!(service = %self.name, deps = deps.len(), "dependencies ready; initializing");
        let scope = InitScope {
            app_name: Arc::clone(&self.app_name),
            service_name: Arc::from(self.name.as_str()),
            bus: self.bus.clone(),
            dependency_names: deps.iter().map(|d| Arc::from(d.as_str())).collect(),
            dependencies: instances,
        };

        let instance = self
            .def
            .initialize(scope)
            .await
            .map_err(|source| self.failed(source))?;
        instance
            .run_start_hook()
            .await
            .map_err(|source| self.failed(source))?;

        if !self.table.insert(&self.name, instance.clone()) {
            warn!(service = %self.name, "service already present in table; keeping first instance");
        }
        self.bus.publish(Event::ready(&self.name, instance));
        info!(service = %self.name, "service ready");
        Ok(())
    }

    fn failed(&self, source: ServiceError) -> InitFailure {
        InitFailure::Failed(OrchestratorError::Initialization {
            service: self.name.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InitContext, Service, ServiceDef};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    struct Unit;
    impl Service for Unit {}

    /// Counts initializer calls, sleeps for `delay`, then succeeds.
    fn counted(calls: &Arc<AtomicUsize>, delay: Duration, deps: &[&str]) -> impl Definition {
        ServiceDef::new(
            (calls.clone(), delay),
            |ctx: InitContext<(Arc<AtomicUsize>, Duration), Unit>| async move {
                let (calls, delay) = ctx.args().clone();
                calls.fetch_add(1, Ordering::SeqCst);
                time::sleep(delay).await;
                Ok(Unit)
            },
        )
        .with_deps(deps.iter().copied())
    }

    fn unit(deps: &[&str]) -> impl Definition {
        ServiceDef::new((), |_ctx: InitContext<(), Unit>| async { Ok::<_, ServiceError>(Unit) })
            .with_deps(deps.iter().copied())
    }

    #[tokio::test]
    async fn empty_registry_initializes_nothing() {
        let orch = Orchestrator::new("empty");
        let mut events = orch.subscribe();
        let (table, shutdown) = orch.init_all(Registry::new()).await.unwrap();
        assert!(table.is_empty());

        assert!(events.next_matching(&Topic::InitEnd).await.is_some());
        shutdown.stop().await.unwrap();
    }

    #[tokio::test]
    async fn zero_dependency_services_start_concurrently() {
        let barrier = Arc::new(Barrier::new(3));
        let def = |barrier: &Arc<Barrier>| {
            ServiceDef::new(
                barrier.clone(),
                |ctx: InitContext<Arc<Barrier>, Unit>| async move {
                    ctx.args().wait().await;
                    Ok(Unit)
                },
            )
        };
        let registry = Registry::new()
            .with_service("x", def(&barrier))
            .with_service("y", def(&barrier))
            .with_service("z", def(&barrier));

        let res = time::timeout(
            Duration::from_secs(2),
            Orchestrator::new("concurrent").init_all(registry),
        )
        .await
        .expect("independent services must not be serialized");
        assert_eq!(res.unwrap().0.len(), 3);
    }

    #[tokio::test]
    async fn failed_dependency_never_runs_dependent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new()
            .with_service(
                "a",
                ServiceDef::new((), |_ctx: InitContext<(), Unit>| async {
                    Err::<Unit, _>(ServiceError::msg("disk full"))
                }),
            )
            .with_service("b", counted(&calls, Duration::ZERO, &["a"]));

        let orch = Orchestrator::new("failing");
        let mut events = orch.subscribe();
        let err = orch.init_all(registry).await.unwrap_err();

        match &err {
            OrchestratorError::Initialization { service, source } => {
                assert_eq!(service, "a");
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("unexpected: {other:?}"),
        }
        let ev = events.next_matching(&Topic::Error).await.unwrap();
        assert_eq!(ev.service.as_deref(), Some("a"));

        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_only_blocks_downstream_services() {
        let downstream = Arc::new(AtomicUsize::new(0));
        let unrelated = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new()
            .with_service(
                "a",
                ServiceDef::new((), |_ctx: InitContext<(), Unit>| async {
                    Err::<Unit, _>(ServiceError::msg("disk full"))
                }),
            )
            .with_service("b", counted(&downstream, Duration::ZERO, &["a"]))
            .with_service("c", counted(&downstream, Duration::ZERO, &["b"]))
            .with_service("x", counted(&unrelated, Duration::from_millis(50), &[]))
            .with_service("y", counted(&unrelated, Duration::ZERO, &["x"]));

        let orch = Orchestrator::new("partial");
        let mut events = orch.subscribe();
        let err = orch.init_all(registry).await.unwrap_err();
        assert_eq!(err.service(), Some("a"));

        let mut blocked = BTreeSet::new();
        let mut ready = BTreeSet::new();
        while !(ready.contains("y") && blocked.contains("c")) {
            let ev = match time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Recv::Event(ev)) => ev,
                other => panic!("batch did not settle: {other:?}"),
            };
            match &ev.topic {
                Topic::ServiceReady(name) => {
                    ready.insert(name.to_string());
                }
                Topic::Error if ev.label == Some("dependency_failed") => {
                    blocked.insert(ev.service.as_deref().unwrap_or_default().to_string());
                }
                _ => {}
            }
        }

        assert_eq!(ready, BTreeSet::from(["x".to_string(), "y".to_string()]));
        assert_eq!(blocked, BTreeSet::from(["b".to_string(), "c".to_string()]));
        assert_eq!(downstream.load(Ordering::SeqCst), 0);
        assert_eq!(unrelated.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_initializer_is_reported() {
        let registry = Registry::new().with_service(
            "p",
            ServiceDef::new((), |_ctx: InitContext<(), Unit>| async {
                if true {
                    panic!("init bug");
                }
                Ok(Unit)
            }),
        );
        let err = Orchestrator::new("panic").init_all(registry).await.unwrap_err();
        match err {
            OrchestratorError::Aborted { service, reason } => {
                assert_eq!(service, "p");
                assert_eq!(reason, "init bug");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cycle_without_detection_hits_timeout() {
        let registry = Registry::new()
            .with_service("a", unit(&["b"]))
            .with_service("b", unit(&["a"]))
            .with_service("c", unit(&[]));
        let orch = Orchestrator::builder("cyclic")
            .with_config(OrchestratorConfig {
                detect_cycles: false,
                init_timeout: Duration::from_millis(50),
                ..OrchestratorConfig::default()
            })
            .build();

        match orch.init_all(registry).await.unwrap_err() {
            OrchestratorError::DeadlockTimeout {
                phase, pending, ..
            } => {
                assert_eq!(phase, Phase::Init);
                assert_eq!(pending, vec!["a", "b"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_task() {
        let registry = Registry::new()
            .with_service("a", unit(&["b"]))
            .with_service("b", unit(&["a"]));
        let err = Orchestrator::new("cyclic").init_all(registry).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DependencyCycle { .. }));
    }

    async fn dies() -> Result<(), OrchestratorError> {
        panic!("worker died")
    }

    #[tokio::test]
    async fn join_failure_is_attributed_to_its_service() {
        let mut set = JoinSet::new();
        let mut names = HashMap::new();
        names.insert(set.spawn(dies()).id(), "db".to_string());

        match first_error(&mut set, &names).await.unwrap_err() {
            OrchestratorError::Aborted { service, reason } => {
                assert_eq!(service, "db");
                assert!(reason.contains("panic"), "{reason}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
