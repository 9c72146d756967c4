//! Property resolution and override persistence for stagehand.
//!
//! This crate turns a [`stagehand_core::PropertyRegistry`] plus an
//! administrator [`stagehand_core::OverrideStore`] into a concrete
//! [`stagehand_core::Resolution`], and reads/writes the on-disk overrides
//! file.
//!
//! Key entry points:
//! - [`resolve`] — run the layering, interpolation, and hook pipeline
//! - [`props_file::load`] / [`props_file::save`] — overrides persistence
//! - [`props_file::FileLock`] — cross-process guard for read-modify-write

pub mod error;
pub mod props_file;
pub mod resolver;

pub use error::ResolveError;
pub use props_file::FileLock;
pub use resolver::{resolve, MAX_INTERPOLATION_PASSES};
