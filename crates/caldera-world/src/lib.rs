//! # Caldera World
//!
//! Chunk streaming for Caldera: keeps an in-memory working set of voxel
//! chunks synchronized with a moving observer.
//!
//! This crate handles:
//! - The concurrent spatial index of resident chunks
//! - Outward spiral scanning around the observer
//! - Chunk population by local generation or remote fetch
//! - Neighbor-complete promotion and render notifications
//! - Radius-based eviction with write-back region persistence

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod chunk;
pub mod events;
pub mod generation;
pub mod index;
pub mod protocol;
pub mod region;
pub mod scan;
pub mod source;
pub mod streaming;

mod evict;
mod fill;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chunk::*;
    pub use crate::events::*;
    pub use crate::generation::*;
    pub use crate::index::*;
    pub use crate::protocol::*;
    pub use crate::region::*;
    pub use crate::scan::*;
    pub use crate::source::*;
    pub use crate::streaming::*;
}

pub use prelude::*;
