use std::path::{Path, PathBuf};

use stagehand_core::{CoreError, PropertyName};
use stagehand_render::RenderError;
use thiserror::Error;

/// Errors produced while resolving properties or persisting overrides.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A hook asked for a property that settles later in registration order.
    #[error("property `{property}` reads `{reference}`, which is not resolved yet")]
    DependencyOrder {
        property: PropertyName,
        reference: PropertyName,
    },

    /// Value interpolation never reached a fixpoint.
    #[error("value interpolation did not settle; check these properties for reference cycles: {properties:?}")]
    InterpolationCycle { properties: Vec<PropertyName> },

    /// Template rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Registry or override bookkeeping failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem access failed.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An overrides file line could not be parsed.
    #[error("{path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Another process holds the overrides file lock.
    #[error("overrides file `{path}` is locked by another process (remove the `.lock` directory if it is stale)")]
    Locked { path: PathBuf },
}

pub(crate) fn io_err(path: &Path, source: std::io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.to_path_buf(),
        source,
    }
}
