//! # Service registry: the static name → definition map.
//!
//! The registry is assembled by the caller and handed to
//! [`Orchestrator::init_all`](crate::Orchestrator::init_all), which takes ownership;
//! it is never mutated once orchestration begins.
//!
//! ## Validation
//! [`Registry::validate`] runs before any service task is launched:
//! - every declared dependency must be registered ([`OrchestratorError::UnknownDependency`]);
//! - optionally, the dependency relation must be acyclic ([`OrchestratorError::DependencyCycle`]).
//!
//! Cycle detection is a topological feasibility check (Kahn's algorithm): services are peeled
//! off as their dependencies become satisfiable, then services nobody on a cycle depends on are
//! peeled off from the other side; whatever remains sits on a cycle.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use crate::error::OrchestratorError;
use crate::services::Definition;

/// Static mapping from service name to its definition.
#[derive(Clone, Default)]
pub struct Registry {
    defs: BTreeMap<String, Arc<dyn Definition>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the definition registered under `name`.
    pub fn with_service<D: Definition>(mut self, name: impl Into<String>, def: D) -> Self {
        self.insert(name, def);
        self
    }

    /// Adds (or replaces) the definition registered under `name`.
    pub fn insert<D: Definition>(&mut self, name: impl Into<String>, def: D) {
        self.defs.insert(name.into(), Arc::new(def));
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// Returns the declared dependencies of `name`.
    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.defs.get(name).map(|d| d.dependencies())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Definition>)> {
        self.defs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Checks the registry before orchestration starts.
    ///
    /// Unknown dependencies are reported first (in name order), then cycles if `detect_cycles`.
    pub fn validate(&self, detect_cycles: bool) -> Result<(), OrchestratorError> {
        for (name, def) in &self.defs {
            if let Some(missing) = def.dependencies().iter().find(|d| !self.contains(d)) {
                return Err(OrchestratorError::UnknownDependency {
                    service: name.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        if detect_cycles {
            let cycle = self.cyclic_services();
            if !cycle.is_empty() {
                return Err(OrchestratorError::DependencyCycle { cycle });
            }
        }
        Ok(())
    }

    /// Returns the (sorted) services that lie on a dependency cycle.
    ///
    /// Assumes every dependency is registered.
    fn cyclic_services(&self) -> Vec<String> {
        let mut remaining: BTreeSet<&str> = self.defs.keys().map(String::as_str).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut unmet: HashMap<&str, usize> = HashMap::new();

        for (name, def) in &self.defs {
            unmet.insert(name.as_str(), def.dependencies().len());
            for dep in def.dependencies() {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }

        // Forward pass: services whose dependencies can all become ready.
        let mut queue: VecDeque<&str> = unmet
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| *name)
            .collect();
        while let Some(name) = queue.pop_front() {
            remaining.remove(name);
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(n) = unmet.get_mut(dependent) {
                    *n -= 1;
                    if *n == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        // Backward pass: drop blocked services that nothing blocked depends on.
        loop {
            let leaves: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|name| {
                    !dependents
                        .get(name)
                        .into_iter()
                        .flatten()
                        .any(|d| remaining.contains(d))
                })
                .collect();
            if leaves.is_empty() {
                break;
            }
            for leaf in leaves {
                remaining.remove(leaf);
            }
        }

        remaining.into_iter().map(str::to_string).collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.defs.iter().map(|(k, v)| (k, v.dependencies())))
            .finish()
    }
}
