//! Packager hook plumbing — derivation, validation, and readiness probes.
//!
//! Hooks are plain function values (`Arc<dyn Fn … + Send + Sync>`) registered
//! on definitions and descriptors; there is no trait hierarchy to implement.
//! A hook sees the world through [`HookContext`], which only exposes
//! properties that are already settled — reading anything else fails with
//! [`HookError::NotYetResolved`], which the resolver turns into its
//! dependency-order error.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{PropertyName, PropertyValue, ResolvedProperty, ServiceName};

// ---------------------------------------------------------------------------
// Environment snapshot
// ---------------------------------------------------------------------------

/// Machine facts and process environment captured once per resolve.
///
/// Constructed literally in tests; [`Environment::capture`] reads the live
/// system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub cpu_count: usize,
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            cpu_count,
            vars: std::env::vars().collect(),
        }
    }

    /// Look up a process environment variable from the snapshot.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Hook errors
// ---------------------------------------------------------------------------

/// Failure modes for derivation and validation hooks.
#[derive(Debug, Clone, Error)]
pub enum HookError {
    /// The hook read a property that is not settled yet — a registration
    /// ordering bug, fatal to the whole resolve.
    #[error("property `{name}` is not resolved yet")]
    NotYetResolved { name: PropertyName },

    /// An ordinary hook failure; degrades to a resolution warning.
    #[error("{message}")]
    Failed { message: String, fatal: bool },
}

impl HookError {
    /// A non-fatal failure (default for validators flagging a soft problem).
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed {
            message: message.into(),
            fatal: false,
        }
    }

    /// A failure the packager marks fatal — resolution still completes, but
    /// the warning blocks service launch.
    pub fn fatal(message: impl Into<String>) -> Self {
        HookError::Failed {
            message: message.into(),
            fatal: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Hook context
// ---------------------------------------------------------------------------

/// Read-only view handed to derivation and validation hooks.
pub struct HookContext<'a> {
    environment: &'a Environment,
    settled: &'a BTreeMap<PropertyName, ResolvedProperty>,
}

impl<'a> HookContext<'a> {
    pub fn new(
        environment: &'a Environment,
        settled: &'a BTreeMap<PropertyName, ResolvedProperty>,
    ) -> Self {
        Self { environment, settled }
    }

    pub fn environment(&self) -> &Environment {
        self.environment
    }

    /// The effective value of an already-settled property.
    ///
    /// Fails with [`HookError::NotYetResolved`] for properties registered
    /// after the hook's own, and for names not registered at all.
    pub fn get(&self, name: &str) -> Result<&PropertyValue, HookError> {
        self.settled
            .get(name)
            .map(|p| &p.value)
            .ok_or_else(|| HookError::NotYetResolved {
                name: PropertyName::from(name),
            })
    }
}

// ---------------------------------------------------------------------------
// Hook function types
// ---------------------------------------------------------------------------

/// Computes a suggested value from the environment and earlier properties.
pub type DeriveFn =
    Arc<dyn Fn(&HookContext<'_>) -> Result<PropertyValue, HookError> + Send + Sync>;

/// Checks an effective value; `Err` becomes a resolution warning.
pub type ValidateFn =
    Arc<dyn Fn(&PropertyValue, &HookContext<'_>) -> Result<(), HookError> + Send + Sync>;

/// Read-only view handed to custom readiness probes.
pub struct ProbeContext<'a> {
    pub service: &'a ServiceName,
    pub properties: &'a BTreeMap<PropertyName, ResolvedProperty>,
    /// The supervisor's state directory (pidfiles, logs, ready markers).
    pub state_dir: &'a Path,
}

/// Decides whether a starting service is ready. `Ok(false)` keeps polling;
/// `Err` means the probe itself cannot run, which fails the start attempt
/// rather than polling a broken probe until the timeout.
pub type ProbeFn = Arc<dyn Fn(&ProbeContext<'_>) -> Result<bool, String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
