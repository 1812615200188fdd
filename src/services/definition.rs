//! # Service definitions and the per-service init context.
//!
//! [`ServiceDef`] bundles what the caller supplies for one service:
//! - construction arguments (`args`)
//! - an async initializer `F: Fn(InitContext<A, S>) -> Fut`
//! - an ordered list of dependency names (may be empty)
//! - an optional override constructor ([`Ctor`])
//!
//! The runtime only sees definitions through the object-safe [`Definition`] trait, so a
//! [`Registry`](crate::Registry) can hold services of unrelated types side by side.
//!
//! ## Example
//! ```rust
//! use servicevisor::{InitContext, Service, ServiceDef, ServiceError};
//!
//! struct Settings { url: String }
//! impl Service for Settings {}
//!
//! let def = ServiceDef::new("postgres://localhost".to_string(), |ctx: InitContext<String, Settings>| async move {
//!     Ok::<_, ServiceError>(Settings { url: ctx.args().clone() })
//! });
//! # let _ = def;
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{OrchestratorError, ServiceError};
use crate::events::Bus;
use crate::services::{Service, ServiceRef};

/// Override constructor handed to the initializer through [`InitContext::ctor`].
pub type Ctor<A, S> = Arc<dyn Fn(&A) -> Result<S, ServiceError> + Send + Sync>;

/// Runtime-provided inputs for one initializer call.
///
/// Built by the orchestrator once every dependency of the service is ready.
pub struct InitScope {
    pub(crate) app_name: Arc<str>,
    pub(crate) service_name: Arc<str>,
    pub(crate) bus: Bus,
    pub(crate) dependency_names: Vec<Arc<str>>,
    pub(crate) dependencies: Vec<ServiceRef>,
}

/// Object-safe view of a service definition.
pub trait Definition: Send + Sync + 'static {
    /// Declared dependency names, in declaration order, without duplicates.
    fn dependencies(&self) -> &[String];

    /// Runs the initializer and erases the produced instance.
    fn initialize(&self, scope: InitScope) -> BoxFuture<'static, Result<ServiceRef, ServiceError>>;
}

/// Per-service record passed to the initializer.
///
/// Read-only. Dependencies are fully constructed and ordered as declared.
pub struct InitContext<A, S> {
    app_name: Arc<str>,
    service_name: Arc<str>,
    bus: Bus,
    args: A,
    dependency_names: Vec<Arc<str>>,
    dependencies: Vec<ServiceRef>,
    ctor: Option<Ctor<A, S>>,
}

impl<A, S> InitContext<A, S> {
    /// Application name passed to the orchestrator.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Name this service is registered under.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Event bus of the running orchestration.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Construction arguments.
    pub fn args(&self) -> &A {
        &self.args
    }

    /// Resolved dependency instances, in declaration order.
    pub fn dependencies(&self) -> &[ServiceRef] {
        &self.dependencies
    }

    /// Declared dependency names, parallel to [`dependencies`](Self::dependencies).
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependency_names.iter().map(|n| &**n)
    }

    /// Override constructor, if the definition carries one.
    pub fn ctor(&self) -> Option<&Ctor<A, S>> {
        self.ctor.as_ref()
    }

    /// Builds the instance with the override constructor, falling back to `default`.
    pub fn construct<D>(&self, default: D) -> Result<S, ServiceError>
    where
        D: FnOnce(&A) -> Result<S, ServiceError>,
    {
        match &self.ctor {
            Some(ctor) => ctor(&self.args),
            None => default(&self.args),
        }
    }

    /// Returns the declared dependency `name` as a `T`.
    ///
    /// Fails with [`OrchestratorError::UnknownDependency`] if `name` was not declared and
    /// with [`OrchestratorError::DependencyMismatch`] if the instance is not a `T`.
    pub fn dependency<T: Service>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        let idx = self
            .dependency_names
            .iter()
            .position(|n| &**n == name)
            .ok_or_else(|| OrchestratorError::UnknownDependency {
                service: self.service_name.to_string(),
                dependency: name.to_string(),
            })?;

        self.dependencies[idx].downcast::<T>().ok_or_else(|| {
            OrchestratorError::DependencyMismatch {
                service: self.service_name.to_string(),
                dependency: name.to_string(),
                expected: std::any::type_name::<T>(),
            }
            .into()
        })
    }
}

/// Caller-supplied definition of one service.
pub struct ServiceDef<A, S, F> {
    args: A,
    init: F,
    deps: Vec<String>,
    ctor: Option<Ctor<A, S>>,
    _service: PhantomData<fn() -> S>,
}

impl<A, S, F> ServiceDef<A, S, F> {
    /// Creates a definition with no dependencies and no override constructor.
    pub fn new<Fut>(args: A, init: F) -> Self
    where
        F: Fn(InitContext<A, S>) -> Fut,
        Fut: Future<Output = Result<S, ServiceError>>,
    {
        Self {
            args,
            init,
            deps: Vec::new(),
            ctor: None,
            _service: PhantomData,
        }
    }

    /// Declares dependencies. Repeated names are collapsed, keeping the first occurrence.
    pub fn with_deps<I, N>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.deps.contains(&dep) {
                self.deps.push(dep);
            }
        }
        self
    }

    /// Attaches an override constructor exposed through [`InitContext::ctor`].
    pub fn with_ctor<C>(mut self, ctor: C) -> Self
    where
        C: Fn(&A) -> Result<S, ServiceError> + Send + Sync + 'static,
    {
        self.ctor = Some(Arc::new(ctor));
        self
    }

    /// Returns the declared dependencies.
    pub fn deps(&self) -> &[String] {
        &self.deps
    }
}

impl<A, S, F, Fut> Definition for ServiceDef<A, S, F>
where
    A: Clone + Send + Sync + 'static,
    S: Service,
    F: Fn(InitContext<A, S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S, ServiceError>> + Send + 'static,
{
    fn dependencies(&self) -> &[String] {
        &self.deps
    }

    fn initialize(&self, scope: InitScope) -> BoxFuture<'static, Result<ServiceRef, ServiceError>> {
        let ctx = InitContext {
            app_name: scope.app_name,
            service_name: scope.service_name,
            bus: scope.bus,
            args: self.args.clone(),
            dependency_names: scope.dependency_names,
            dependencies: scope.dependencies,
            ctor: self.ctor.clone(),
        };
        (self.init)(ctx).map(|res| res.map(ServiceRef::new)).boxed()
    }
}
