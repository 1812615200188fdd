//! # Service capability traits and the type-erased service handle.
//!
//! Every realized service implements [`Service`]. Lifecycle hooks are opt-in
//! capabilities: a service that wants a post-init hook implements [`Startable`] and
//! returns `Some(self)` from [`Service::as_startable`]; likewise [`Stoppable`] for teardown.
//! A service that exposes neither is simply stored and dropped.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use servicevisor::{Service, ServiceError, ServiceRef, Stoppable};
//!
//! struct Pool;
//!
//! impl Service for Pool {
//!     fn as_stoppable(&self) -> Option<&dyn Stoppable> { Some(self) }
//! }
//!
//! #[async_trait]
//! impl Stoppable for Pool {
//!     async fn stop(&self) -> Result<(), ServiceError> {
//!         // close connections...
//!         Ok(())
//!     }
//! }
//!
//! let svc = ServiceRef::new(Pool);
//! assert!(svc.has_stop_hook());
//! assert!(!svc.has_start_hook());
//! assert!(svc.downcast::<Pool>().is_some());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;

/// A realized service instance.
///
/// Both capability accessors default to `None`, which the runtime treats as a no-op.
pub trait Service: Send + Sync + 'static {
    /// Returns the post-init capability, if the service has one.
    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    /// Returns the teardown capability, if the service has one.
    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        None
    }
}

/// Post-construction hook, awaited before the service is declared ready.
#[async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self) -> Result<(), ServiceError>;
}

/// Teardown hook, awaited after every dependent of the service has stopped.
#[async_trait]
pub trait Stoppable: Send + Sync {
    async fn stop(&self) -> Result<(), ServiceError>;
}

/// Shared, type-erased handle to a realized service.
///
/// Cloning is cheap (two `Arc` clones). Use [`ServiceRef::downcast`] to get the concrete type back.
#[derive(Clone)]
pub struct ServiceRef {
    service: Arc<dyn Service>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ServiceRef {
    /// Wraps a service instance.
    pub fn new<S: Service>(service: S) -> Self {
        Self::from_arc(Arc::new(service))
    }

    /// Wraps an already shared service instance.
    pub fn from_arc<S: Service>(service: Arc<S>) -> Self {
        Self {
            any: service.clone(),
            service,
            type_name: std::any::type_name::<S>(),
        }
    }

    /// Returns the concrete instance if it is a `T`.
    pub fn downcast<T: Service>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.any).downcast::<T>().ok()
    }

    /// Returns `true` if the instance is a `T`.
    pub fn is<T: Service>(&self) -> bool {
        self.any.is::<T>()
    }

    /// Returns the concrete type name of the instance.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the service exposes a [`Startable`] capability.
    pub fn has_start_hook(&self) -> bool {
        self.service.as_startable().is_some()
    }

    /// Returns `true` if the service exposes a [`Stoppable`] capability.
    pub fn has_stop_hook(&self) -> bool {
        self.service.as_stoppable().is_some()
    }

    /// Runs the post-init hook; absent hook is a no-op.
    pub(crate) async fn run_start_hook(&self) -> Result<(), ServiceError> {
        match self.service.as_startable() {
            Some(hook) => hook.start().await,
            None => Ok(()),
        }
    }

    /// Runs the teardown hook; absent hook is a no-op.
    pub(crate) async fn run_stop_hook(&self) -> Result<(), ServiceError> {
        match self.service.as_stoppable() {
            Some(hook) => hook.stop().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("type", &self.type_name)
            .field("start_hook", &self.has_start_hook())
            .field("stop_hook", &self.has_stop_hook())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Plain;
    impl Service for Plain {}

    #[derive(Default)]
    struct Hooked {
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl Service for Hooked {
        fn as_startable(&self) -> Option<&dyn Startable> {
            Some(self)
        }
        fn as_stoppable(&self) -> Option<&dyn Stoppable> {
            Some(self)
        }
    }

    #[async_trait]
    impl Startable for Hooked {
        async fn start(&self) -> Result<(), ServiceError> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Stoppable for Hooked {
        async fn stop(&self) -> Result<(), ServiceError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn absent_hooks_are_noops() {
        let svc = ServiceRef::new(Plain);
        assert!(!svc.has_start_hook());
        assert!(!svc.has_stop_hook());
        assert!(svc.run_start_hook().await.is_ok());
        assert!(svc.run_stop_hook().await.is_ok());
    }

    #[tokio::test]
    async fn hooks_dispatch_to_capabilities() {
        let svc = ServiceRef::new(Hooked::default());
        svc.run_start_hook().await.unwrap();
        svc.run_stop_hook().await.unwrap();

        let inner = svc.downcast::<Hooked>().unwrap();
        assert!(inner.started.load(Ordering::SeqCst));
        assert!(inner.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn downcast_to_wrong_type_fails() {
        let svc = ServiceRef::new(Plain);
        assert!(svc.is::<Plain>());
        assert!(svc.downcast::<Hooked>().is_none());
        assert!(svc.type_name().ends_with("Plain"));
    }
}
