//! Service descriptor expansion — templates in, concrete invocation out.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use stagehand_core::types::{ReadinessStrategy, Resolution, ServiceDescriptor};

use crate::engine::PropertyScope;
use crate::error::RenderError;

/// A fully-expanded service invocation: every template rendered against the
/// resolved property map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationSpec {
    /// Concrete argv; element 0 is the executable.
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Environment overlay, applied over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Rendered PID-file path when the readiness strategy is PidFile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_pidfile: Option<PathBuf>,
}

/// Expand a descriptor against a resolution.
///
/// Pure and deterministic. Fails with [`RenderError::MissingReference`] when
/// any template references a property absent from the resolved map; the
/// caller treats that as fatal for this one service only.
pub fn expand(
    descriptor: &ServiceDescriptor,
    resolution: &Resolution,
) -> Result<InvocationSpec, RenderError> {
    let scope = PropertyScope::from_resolution(resolution);

    let argv = descriptor
        .command
        .iter()
        .map(|arg| scope.render(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let cwd = descriptor
        .cwd
        .as_deref()
        .map(|c| scope.render(c))
        .transpose()?
        .map(PathBuf::from);

    let mut env = BTreeMap::new();
    for (key, template) in &descriptor.env {
        env.insert(key.clone(), scope.render(template)?);
    }

    let ready_pidfile = match &descriptor.readiness {
        ReadinessStrategy::PidFile { path } => Some(PathBuf::from(scope.render(path)?)),
        _ => None,
    };

    Ok(InvocationSpec {
        argv,
        cwd,
        env,
        ready_pidfile,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
