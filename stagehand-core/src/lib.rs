//! Stagehand core library — property model, registry, overrides, hooks.
//!
//! Public API surface:
//! - [`types`] — newtypes, values, resolution output, service descriptors
//! - [`registry`] — write-once [`PropertyRegistry`]
//! - [`overrides`] — [`OverrideStore`] layered over registry defaults
//! - [`hooks`] — packager hook function types and context
//! - [`error`] — [`CoreError`]
//!
//! This crate does no I/O; persistence and process control live in the
//! resolve and supervisor crates.

pub mod error;
pub mod hooks;
pub mod overrides;
pub mod registry;
pub mod types;

pub use error::CoreError;
pub use hooks::{DeriveFn, Environment, HookContext, HookError, ProbeContext, ProbeFn, ValidateFn};
pub use overrides::OverrideStore;
pub use registry::{PropertyDefinition, PropertyRegistry};
pub use types::{
    PropertyName, PropertyType, PropertyValue, ReadinessStrategy, Resolution, ResolutionWarning,
    ResolvedProperty, ServiceDescriptor, ServiceName, ValueSource,
};
