//! Tandem Core: shared types, traits, errors, and the resource handle.
//!
//! This crate provides the foundational types used across all Tandem crates.
//! It has no internal Tandem dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types, error classification and Result alias
//! - [`record`]: Source records and the schema splitting their fields
//! - [`traits`]: The [`Resource`] lifecycle trait
//! - [`handle`]: [`SharedHandle`], a lazily-opened shared connection

pub mod error;
pub mod handle;
pub mod record;
pub mod traits;

// Re-export key types at crate root for convenience
pub use error::{Error, ErrorKind, Result};
pub use handle::SharedHandle;
pub use record::{PassthroughKind, RecordSchema, Scalar, SourceRecord};
pub use traits::Resource;
