//! Error types for stagehand-core.

use thiserror::Error;

use crate::types::{PropertyName, PropertyType};

/// All errors that can arise from registry and override operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A definition with this name is already registered.
    #[error("property `{name}` is already registered")]
    DuplicateName { name: PropertyName },

    /// No definition with this name exists in the registry.
    #[error("unknown property `{name}`")]
    UnknownProperty { name: PropertyName },

    /// A value does not conform to the definition's declared type.
    #[error("property `{name}` expects {expected}, got `{value}`")]
    TypeMismatch {
        name: PropertyName,
        expected: PropertyType,
        value: String,
    },
}
