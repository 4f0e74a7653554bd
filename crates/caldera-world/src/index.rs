//! Concurrent spatial index over resident chunks.

use caldera_common::ChunkCoord;
use dashmap::DashMap;
use std::sync::Arc;

use crate::chunk::SharedChunk;

/// Concurrent map from chunk coordinate to resident chunk.
///
/// Keys are packed through [`ChunkCoord::pack`] so every coordinate maps
/// to a single integer. Individual operations are atomic; composite
/// sequences (check-then-create) are the caller's responsibility.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    chunks: DashMap<u64, SharedChunk>,
}

impl SpatialIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: DashMap::new(),
        }
    }

    /// Returns the chunk at the coordinate, if resident. Never fails on
    /// a miss.
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<SharedChunk> {
        self.chunks.get(&coord.pack()).map(|c| Arc::clone(c.value()))
    }

    /// Inserts a chunk, overwriting any resident chunk at the same
    /// coordinate (last-writer-wins).
    pub fn insert(&self, coord: ChunkCoord, chunk: SharedChunk) {
        self.chunks.insert(coord.pack(), chunk);
    }

    /// Removes and returns the chunk at the coordinate.
    pub fn remove(&self, coord: ChunkCoord) -> Option<SharedChunk> {
        self.chunks.remove(&coord.pack()).map(|(_, c)| c)
    }

    /// Returns whether a chunk is resident at the coordinate.
    #[must_use]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord.pack())
    }

    /// Takes a point-in-time snapshot of the resident set for sweeps.
    ///
    /// Staleness after the snapshot is acceptable; evicted chunks are
    /// safely regenerable.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ChunkCoord, SharedChunk)> {
        self.chunks
            .iter()
            .map(|entry| (ChunkCoord::unpack(*entry.key()), Arc::clone(entry.value())))
            .collect()
    }

    /// Returns the number of resident chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Removes every resident chunk without persistence (shutdown path).
    pub fn clear(&self) {
        self.chunks.clear();
    }
}
