//! Chunk data, lifecycle state machine, and payload serialization.

use bytemuck::{Pod, Zeroable};
use caldera_common::{ChunkCoord, MagicBytes, SchemaVersion, WorldError, WorldResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Edge length of a chunk in blocks (per axis).
pub const CHUNK_SIZE: u32 = 16;

/// Total blocks in a chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// A single voxel: a material id, opaque to the streaming subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Block(pub u16);

/// Lifecycle state of a chunk.
///
/// States only progress forward; a chunk never regresses short of full
/// removal and recreation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChunkState {
    /// Allocated, no content yet
    New,
    /// Content populated, not yet neighbor-complete
    Generated,
    /// Neighbor-complete and handed to the render consumer
    Ready,
}

/// A chunk shared across the fill, eviction, and render threads.
pub type SharedChunk = Arc<RwLock<Chunk>>;

/// Chunk payload header for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// Magic bytes for format identification
    pub magic: [u8; 4],
    /// Schema version
    pub version: SchemaVersion,
    /// Chunk X coordinate
    pub x: i32,
    /// Chunk Y coordinate
    pub y: i32,
    /// Chunk Z coordinate
    pub z: i32,
    /// Chunk edge length in blocks
    pub size: u32,
    /// Compression type (0 = none, 1 = lz4)
    pub compression: u8,
}

impl ChunkHeader {
    /// Creates a new header for the given chunk coordinate.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            magic: MagicBytes::CHUNK.0,
            version: SchemaVersion::CHUNK_PAYLOAD,
            x: coord.x,
            y: coord.y,
            z: coord.z,
            size: CHUNK_SIZE,
            compression: 1, // LZ4 by default
        }
    }

    /// Validates the header.
    pub fn validate(&self) -> WorldResult<()> {
        if self.magic != MagicBytes::CHUNK.0 {
            return Err(WorldError::InvalidFormat);
        }
        if !SchemaVersion::CHUNK_PAYLOAD.can_read(&self.version) {
            return Err(WorldError::VersionMismatch {
                expected: SchemaVersion::CHUNK_PAYLOAD.to_string(),
                actual: self.version.to_string(),
            });
        }
        Ok(())
    }
}

/// A cuboid block of voxel data, the atomic streaming unit.
///
/// Neighbor relations are never stored; they are re-derived through the
/// spatial index so a neighbor's eviction cannot leave a dangling
/// reference.
#[derive(Debug)]
pub struct Chunk {
    /// Chunk coordinate
    coord: ChunkCoord,
    /// Lifecycle state
    state: ChunkState,
    /// Set once when eviction claims the chunk; in-flight work checks it
    disposing: bool,
    /// Whether the chunk has been modified since generation
    dirty: bool,
    /// Block data (CHUNK_SIZE³ blocks)
    blocks: Vec<Block>,
}

impl Chunk {
    /// Creates a new empty chunk in the `New` state.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            state: ChunkState::New,
            disposing: false,
            dirty: false,
            blocks: vec![Block::default(); CHUNK_VOLUME],
        }
    }

    /// Creates a chunk directly in the `Generated` state from existing
    /// block data. Used when a remote authority supplies the content.
    #[must_use]
    pub fn from_blocks(coord: ChunkCoord, blocks: Vec<Block>) -> Self {
        debug_assert_eq!(blocks.len(), CHUNK_VOLUME);
        Self {
            coord,
            state: ChunkState::Generated,
            disposing: false,
            dirty: false,
            blocks,
        }
    }

    /// Returns the chunk coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ChunkState {
        self.state
    }

    /// Returns whether eviction has claimed this chunk.
    #[must_use]
    pub const fn is_disposing(&self) -> bool {
        self.disposing
    }

    /// Returns whether the chunk was modified since generation.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the chunk as disposing. Settable once; further calls are
    /// no-ops.
    pub fn begin_dispose(&mut self) {
        self.disposing = true;
    }

    /// Transitions `New -> Generated` after content population.
    ///
    /// Returns `false` (and leaves the chunk untouched) if the chunk is
    /// not `New` or is already disposing, so population happens at most
    /// once per chunk instance.
    pub fn mark_generated(&mut self) -> bool {
        if self.disposing || self.state != ChunkState::New {
            return false;
        }
        self.state = ChunkState::Generated;
        true
    }

    /// Transitions `Generated -> Ready` once neighbor-complete.
    ///
    /// Returns `false` if the chunk is not `Generated` or is disposing.
    pub fn mark_ready(&mut self) -> bool {
        if self.disposing || self.state != ChunkState::Generated {
            return false;
        }
        self.state = ChunkState::Ready;
        true
    }

    /// Returns a slice of all blocks.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Replaces the block data wholesale (population path).
    pub fn set_blocks(&mut self, blocks: Vec<Block>) {
        debug_assert_eq!(blocks.len(), CHUNK_VOLUME);
        self.blocks = blocks;
    }

    /// Gets a block at local coordinates.
    #[must_use]
    pub fn get_block(&self, x: u32, y: u32, z: u32) -> Option<Block> {
        if x >= CHUNK_SIZE || y >= CHUNK_SIZE || z >= CHUNK_SIZE {
            return None;
        }
        self.blocks.get(block_index(x, y, z)).copied()
    }

    /// Sets a block at local coordinates, marking the chunk dirty.
    pub fn set_block(&mut self, x: u32, y: u32, z: u32, block: Block) -> bool {
        if x >= CHUNK_SIZE || y >= CHUNK_SIZE || z >= CHUNK_SIZE {
            return false;
        }
        let index = block_index(x, y, z);
        if let Some(slot) = self.blocks.get_mut(index) {
            *slot = block;
            self.dirty = true;
            return true;
        }
        false
    }

    /// Serializes the chunk payload (header + LZ4-compressed blocks).
    pub fn serialize(&self) -> WorldResult<Vec<u8>> {
        let header = ChunkHeader::new(self.coord);

        let header_bytes = bincode::serialize(&header)
            .map_err(|e| WorldError::SerializationFailed(e.to_string()))?;

        let block_bytes: &[u8] = bytemuck::cast_slice(&self.blocks);
        let compressed = lz4_flex::compress_prepend_size(block_bytes);

        let mut result = Vec::with_capacity(4 + header_bytes.len() + compressed.len());
        result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        result.extend_from_slice(&header_bytes);
        result.extend_from_slice(&compressed);

        Ok(result)
    }

    /// Deserializes a chunk payload. The result is `Generated` and clean.
    pub fn deserialize(bytes: &[u8]) -> WorldResult<Self> {
        if bytes.len() < 8 {
            return Err(WorldError::DeserializationFailed("data too short".into()));
        }

        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() < 4 + header_len {
            return Err(WorldError::DeserializationFailed(
                "header length mismatch".into(),
            ));
        }

        let header: ChunkHeader = bincode::deserialize(&bytes[4..4 + header_len])
            .map_err(|e| WorldError::DeserializationFailed(e.to_string()))?;
        header.validate()?;

        let compressed = &bytes[4 + header_len..];
        let block_bytes = lz4_flex::decompress_size_prepended(compressed)
            .map_err(|e| WorldError::CompressionFailed(e.to_string()))?;

        let block_size = std::mem::size_of::<Block>();
        if block_bytes.len() != CHUNK_VOLUME * block_size {
            return Err(WorldError::DeserializationFailed(
                "block data size mismatch".into(),
            ));
        }

        let blocks: Vec<Block> = block_bytes
            .chunks_exact(block_size)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        Ok(Self::from_blocks(ChunkCoord::new(header.x, header.y, header.z), blocks))
    }
}

/// Converts local block coordinates to a linear index.
#[must_use]
const fn block_index(x: u32, y: u32, z: u32) -> usize {
    ((y * CHUNK_SIZE + z) * CHUNK_SIZE + x) as usize
}
