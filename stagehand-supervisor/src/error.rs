use std::path::PathBuf;

use stagehand_core::ServiceName;
use thiserror::Error;

/// Error surface for process launch, signalling, and state tracking.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Render(#[from] stagehand_render::RenderError),

    #[error("no service named `{name}`")]
    UnknownService { name: ServiceName },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SupervisorError {
    SupervisorError::Io {
        path: path.into(),
        source,
    }
}
