//! # Shared result and bookkeeping maps.
//!
//! - [`ServiceTable`]: live service table, service name → realized instance.
//! - [`DependentsIndex`]: service name → services that declared it as a dependency.
//!
//! Both are written by the per-service tasks of one orchestration and read by their
//! siblings. Entries of the live table are write-once; a task only reads a name after it
//! observed that name's ready event (or saw the entry itself), and the ready event is
//! published after the write.
//!
//! Locks are `std::sync` and never held across an `.await`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::services::{Service, ServiceRef};

/// Mapping from service name to its realized instance.
///
/// Cheap to clone; clones share the same table. The public API is read-only.
#[derive(Clone, Default)]
pub struct ServiceTable {
    inner: Arc<RwLock<HashMap<String, ServiceRef>>>,
}

impl ServiceTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `service` under `name` unless the name is already taken.
    ///
    /// Returns `false` (and leaves the table untouched) on a second write.
    pub(crate) fn insert(&self, name: &str, service: ServiceRef) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(name) {
            return false;
        }
        map.insert(name.to_string(), service);
        true
    }

    /// Returns the type-erased instance registered under `name`.
    pub fn get_ref(&self, name: &str) -> Option<ServiceRef> {
        self.read().get(name).cloned()
    }

    /// Returns the instance registered under `name` if it is a `T`.
    pub fn get<T: Service>(&self, name: &str) -> Option<Arc<T>> {
        self.get_ref(name).and_then(|s| s.downcast::<T>())
    }

    /// Returns `true` if `name` has been realized.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Realized service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Point-in-time copy of every entry, sorted by name.
    pub(crate) fn snapshot(&self) -> Vec<(String, ServiceRef)> {
        let mut entries: Vec<(String, ServiceRef)> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ServiceRef>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ServiceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Mapping from service name to the set of its dependents.
///
/// Filled during init as each dependency wait resolves; read during stop.
#[derive(Clone, Default)]
pub struct DependentsIndex {
    inner: Arc<Mutex<HashMap<String, BTreeSet<String>>>>,
}

impl DependentsIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records `dependent` as depending on `dependency`.
    pub(crate) fn register(&self, dependency: &str, dependent: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
    }

    /// Services that declared `name` as a dependency, sorted.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Set of service names that reached a terminal state in the current phase.
///
/// Used for services that stopped and for services that failed to initialize. A name is
/// marked before the matching `stop.<name>` or `error` event is published.
#[derive(Clone, Default)]
pub(crate) struct NameSet {
    inner: Arc<Mutex<BTreeSet<String>>>,
}

impl NameSet {
    pub(crate) fn mark(&self, name: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}
