//! # Service abstractions and definitions.
//!
//! This module provides the service-related types:
//! - [`Service`] - trait every realized instance implements
//! - [`Startable`], [`Stoppable`] - optional lifecycle capabilities
//! - [`ServiceRef`] - shared, type-erased instance handle
//! - [`ServiceDef`], [`Definition`] - caller-supplied definition (args, init, deps, ctor)
//! - [`InitContext`] - per-service record handed to the initializer
//! - [`Registry`] - static name → definition map with validation

mod definition;
mod registry;
mod service;

pub use definition::{Ctor, Definition, InitContext, InitScope, ServiceDef};
pub use registry::Registry;
pub use service::{Service, ServiceRef, Startable, Stoppable};
