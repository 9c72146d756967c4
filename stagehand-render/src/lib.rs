//! Stagehand rendering — dotted property references and descriptor expansion.
//!
//! Public API surface:
//! - [`engine`] — [`PropertyScope`] template rendering, [`references`]
//! - [`expand`] — [`InvocationSpec`] from a descriptor + resolution
//! - [`error`] — [`RenderError`]

pub mod engine;
pub mod error;
pub mod expand;

pub use engine::{references, PropertyScope};
pub use error::RenderError;
pub use expand::{expand, InvocationSpec};
