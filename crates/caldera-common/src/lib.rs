//! # Caldera Common
//!
//! Common types and shared abstractions for Caldera subsystems:
//! - Chunk and region coordinate types with lossless integer packing
//! - Schema version information for persisted formats
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::version::*;
}

pub use prelude::*;
