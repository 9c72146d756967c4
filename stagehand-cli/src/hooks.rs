//! Built-in packager hooks, referenced from the manifest by name.
//!
//! The manifest is plain data, so it names hooks instead of containing them;
//! these tables turn those names into the function values the registry and
//! descriptors carry. An unknown name is a manifest error at load time, not
//! a runtime surprise.

use std::path::Path;
use std::sync::Arc;

use stagehand_core::{DeriveFn, HookError, ProbeFn, PropertyValue, ValidateFn};
use stagehand_supervisor::paths;

/// Look up a built-in derivation hook.
pub fn derive_fn(name: &str) -> Option<DeriveFn> {
    match name {
        // Worker count suggestion: one per CPU, capped at 8.
        "cpu_workers" => Some(Arc::new(|ctx| {
            let workers = ctx.environment().cpu_count.min(8) as i64;
            Ok(PropertyValue::Int(workers))
        })),
        // $TMPDIR when set, /tmp otherwise.
        "temp_dir" => Some(Arc::new(|ctx| {
            let dir = ctx.environment().var("TMPDIR").unwrap_or("/tmp");
            Ok(PropertyValue::from(dir))
        })),
        _ => None,
    }
}

/// Look up a built-in validation hook.
pub fn validate_fn(name: &str) -> Option<ValidateFn> {
    match name {
        "tcp_port" => Some(Arc::new(|value, _ctx| match value {
            PropertyValue::Int(port) if (1..=65_535).contains(port) => Ok(()),
            other => Err(HookError::fatal(format!(
                "`{other}` is not a usable TCP port (1-65535)"
            ))),
        })),
        "non_empty" => Some(Arc::new(|value, _ctx| match value {
            PropertyValue::Str(s) if s.trim().is_empty() => {
                Err(HookError::failed("value is empty"))
            }
            _ => Ok(()),
        })),
        "absolute_path" => Some(Arc::new(|value, _ctx| {
            if Path::new(&value.to_string()).is_absolute() {
                Ok(())
            } else {
                Err(HookError::failed(format!(
                    "`{value}` is not an absolute path"
                )))
            }
        })),
        _ => None,
    }
}

/// Look up a built-in readiness probe.
pub fn probe_fn(name: &str) -> Option<ProbeFn> {
    match name {
        // Ready once the service has written its marker file under run/.
        "ready_file" => Some(Arc::new(|ctx| {
            Ok(paths::ready_marker_path(ctx.state_dir, ctx.service).exists())
        })),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
