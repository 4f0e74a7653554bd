//! Chunk transfer messages exchanged with a remote world authority.
//!
//! Only the message shapes live here; wire encoding and transport belong
//! to the network layer. Delivery is at-least-once: loss is repaired by
//! the next scan re-requesting still-missing coordinates.

use caldera_common::ChunkCoord;
use serde::{Deserialize, Serialize};

use crate::chunk::{Block, CHUNK_VOLUME};

/// Outbound request for the content of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    /// Chunk X coordinate
    pub x: i32,
    /// Chunk Y coordinate
    pub y: i32,
    /// Chunk Z coordinate
    pub z: i32,
}

impl ChunkRequest {
    /// Builds a request for the given coordinate.
    #[must_use]
    pub const fn new(coord: ChunkCoord) -> Self {
        Self {
            x: coord.x,
            y: coord.y,
            z: coord.z,
        }
    }

    /// Returns the requested chunk coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        ChunkCoord::new(self.x, self.y, self.z)
    }
}

/// Inbound chunk content from the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResponse {
    /// Chunk X coordinate
    pub x: i32,
    /// Chunk Y coordinate
    pub y: i32,
    /// Chunk Z coordinate
    pub z: i32,
    /// Raw material ids, `CHUNK_VOLUME` entries
    pub blocks: Vec<u16>,
}

impl ChunkResponse {
    /// Returns the answered chunk coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        ChunkCoord::new(self.x, self.y, self.z)
    }

    /// Returns whether the payload has the expected block count.
    #[must_use]
    pub fn is_well_sized(&self) -> bool {
        self.blocks.len() == CHUNK_VOLUME
    }

    /// Converts the payload into typed blocks.
    #[must_use]
    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks.into_iter().map(Block).collect()
    }
}
