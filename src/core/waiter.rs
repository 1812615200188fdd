//! # Wait-sets: "block until every named precondition has fired".
//!
//! A service task waits on a set of per-service topics instead of walking a dependency
//! graph:
//! - during init, on `init.<dep>` for each declared dependency;
//! - during stop, on `stop.<dependent>` for each recorded dependent.
//!
//! ## Rules
//! - The [`Subscription`] is created by the orchestrator **before** any task is spawned, so an
//!   event published after orchestration started is always buffered for the waiter.
//! - A precondition also counts as satisfied when `done(name)` is already true; this is
//!   checked before each receive, which also covers `RecvError::Lagged`.
//! - `on_settled(name)` is called exactly once per name, in the order names resolve.
//! - A pending name for which `failed(name)` holds aborts the wait with
//!   [`WaitAborted::Failed`]; it is re-checked on every received event, including `error`.
//! - Cancellation of `token` aborts the wait with [`WaitAborted::Cancelled`].

use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;

use crate::core::table::{DependentsIndex, NameSet, ServiceTable};
use crate::error::OrchestratorError;
use crate::events::{Recv, Subscription, Topic};
use crate::services::{Registry, ServiceRef};

/// Why a wait ended before every precondition fired.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WaitAborted {
    /// The token was cancelled or the bus closed.
    Cancelled,
    /// A pending name reached a failed state.
    Failed(String),
}

/// Extracts the service name a topic signals, for the topic family being awaited.
pub(crate) type TopicName = fn(&Topic) -> Option<&str>;

pub(crate) fn ready_name(topic: &Topic) -> Option<&str> {
    match topic {
        Topic::ServiceReady(name) => Some(&**name),
        _ => None,
    }
}

pub(crate) fn stopped_name(topic: &Topic) -> Option<&str> {
    match topic {
        Topic::ServiceStopped(name) => Some(&**name),
        _ => None,
    }
}

/// Waits until every name in `names` is settled.
pub(crate) async fn wait_all<D, X, S>(
    sub: &mut Subscription,
    names: &[String],
    topic_name: TopicName,
    done: D,
    failed: X,
    mut on_settled: S,
    token: &CancellationToken,
) -> Result<(), WaitAborted>
where
    D: Fn(&str) -> bool,
    X: Fn(&str) -> bool,
    S: FnMut(&str),
{
    let mut pending: BTreeSet<&str> = names.iter().map(String::as_str).collect();

    loop {
        if let Some(name) = pending.iter().find(|name| failed(name)) {
            return Err(WaitAborted::Failed(name.to_string()));
        }
        pending.retain(|name| {
            if done(*name) {
                on_settled(*name);
                false
            } else {
                true
            }
        });
        if pending.is_empty() {
            return Ok(());
        }

        tokio::select! {
            _ = token.cancelled() => return Err(WaitAborted::Cancelled),
            msg = sub.recv() => match msg {
                Recv::Event(ev) => {
                    if let Some(name) = topic_name(&ev.topic) {
                        if pending.remove(name) {
                            on_settled(name);
                        }
                    }
                }
                Recv::Lagged(skipped) => {
                    tracing::debug!(skipped, "wait-set lagged; re-checking settled names");
                }
                Recv::Closed => return Err(WaitAborted::Cancelled),
            }
        }
    }
}

/// Why a dependency wait did not produce instances.
#[derive(Debug)]
pub(crate) enum DependencyWaitError {
    /// Declared dependency is not registered.
    Invalid(OrchestratorError),
    /// A dependency failed; the initializer must not run.
    Failed(OrchestratorError),
    /// Orchestration was cancelled while waiting.
    Aborted,
}

/// Resolves the dependencies of `service` into instances, in declaration order.
///
/// Fails fast with `UnknownDependency` before waiting, and with `DependencyFailed` as soon
/// as a pending dependency is in `failed`. As each dependency becomes ready, `service` is
/// registered as its dependent.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn wait_dependencies(
    service: &str,
    deps: &[String],
    registry: &Registry,
    table: &ServiceTable,
    failed: &NameSet,
    dependents: &DependentsIndex,
    sub: &mut Subscription,
    token: &CancellationToken,
) -> Result<Vec<ServiceRef>, DependencyWaitError> {
    if let Some(missing) = deps.iter().find(|d| !registry.contains(d)) {
        return Err(DependencyWaitError::Invalid(
            OrchestratorError::UnknownDependency {
                service: service.to_string(),
                dependency: missing.clone(),
            },
        ));
    }

    wait_all(
        sub,
        deps,
        ready_name,
        |name| table.contains(name),
        |name| failed.contains(name),
        |name| {
            tracing::trace!(service, dependency = name, "dependency ready");
            dependents.register(name, service);
        },
        token,
    )
    .await
    .map_err(|aborted| match aborted {
        WaitAborted::Failed(dependency) => {
            DependencyWaitError::Failed(OrchestratorError::DependencyFailed {
                service: service.to_string(),
                dependency,
            })
        }
        WaitAborted::Cancelled => DependencyWaitError::Aborted,
    })?;

    // Every readiness event is published after the table write.
    deps.iter()
        .map(|dep| table.get_ref(dep).ok_or(DependencyWaitError::Aborted))
        .collect()
}
