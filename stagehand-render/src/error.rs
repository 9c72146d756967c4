//! Error types for stagehand-render.

use thiserror::Error;

use stagehand_core::types::PropertyName;

/// All errors that can arise from template rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template references a property absent from the resolved map.
    #[error("template references undefined property `{name}`")]
    MissingReference { name: PropertyName },

    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),
}
