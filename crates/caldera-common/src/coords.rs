//! Coordinate types for chunk and region space.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Edge length of a region in chunks (per axis).
pub const REGION_SIZE: i32 = 8;

/// Number of bits used per axis when packing a chunk coordinate.
const PACK_BITS: u32 = 21;
/// Mask for one packed axis.
const PACK_MASK: u64 = (1 << PACK_BITS) - 1;

/// Maximum absolute chunk coordinate that packs losslessly.
pub const MAX_CHUNK_COORD: i32 = (1 << (PACK_BITS - 1)) - 1;

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkCoord {
    /// X coordinate in chunk space
    pub x: i32,
    /// Y coordinate in chunk space
    pub y: i32,
    /// Z coordinate in chunk space
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Packs the coordinate losslessly into a single integer key.
    ///
    /// Each axis occupies 21 bits (sign-extended on unpack), so any
    /// coordinate within `±MAX_CHUNK_COORD` round-trips exactly.
    #[must_use]
    pub const fn pack(self) -> u64 {
        ((self.x as u64 & PACK_MASK) << (2 * PACK_BITS))
            | ((self.y as u64 & PACK_MASK) << PACK_BITS)
            | (self.z as u64 & PACK_MASK)
    }

    /// Reverses [`ChunkCoord::pack`].
    #[must_use]
    pub const fn unpack(key: u64) -> Self {
        Self {
            x: sign_extend((key >> (2 * PACK_BITS)) & PACK_MASK),
            y: sign_extend((key >> PACK_BITS) & PACK_MASK),
            z: sign_extend(key & PACK_MASK),
        }
    }

    /// Offsets the coordinate by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The four straight horizontal neighbors at the same Y,
    /// in N, E, S, W order.
    #[must_use]
    pub const fn neighbors4(self) -> [Self; 4] {
        [
            Self::new(self.x, self.y, self.z + 1),
            Self::new(self.x + 1, self.y, self.z),
            Self::new(self.x, self.y, self.z - 1),
            Self::new(self.x - 1, self.y, self.z),
        ]
    }

    /// Chebyshev distance to another coordinate on the X/Z plane.
    #[must_use]
    pub fn horizontal_distance(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Converts to the region coordinate owning this chunk.
    #[must_use]
    pub const fn to_region(self) -> RegionCoord {
        RegionCoord {
            x: self.x.div_euclid(REGION_SIZE),
            y: self.y.div_euclid(REGION_SIZE),
            z: self.z.div_euclid(REGION_SIZE),
        }
    }
}

/// Sign-extends a 21-bit packed axis back to i32.
const fn sign_extend(bits: u64) -> i32 {
    ((bits << (64 - PACK_BITS)) as i64 >> (64 - PACK_BITS)) as i32
}

/// Region coordinate (identifies a group of `REGION_SIZE`³ chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCoord {
    /// X coordinate in region space
    pub x: i32,
    /// Y coordinate in region space
    pub y: i32,
    /// Z coordinate in region space
    pub z: i32,
}

impl RegionCoord {
    /// Creates a new region coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Region filename stem, e.g. `r.5.-3.0`.
    #[must_use]
    pub fn filename(&self) -> String {
        format!("r.{}.{}.{}", self.x, self.y, self.z)
    }

    /// The 27-cell neighborhood of this region (itself plus one ring).
    #[must_use]
    pub fn with_padding(self) -> Vec<Self> {
        let mut out = Vec::with_capacity(27);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    out.push(Self::new(self.x + dx, self.y + dy, self.z + dz));
                }
            }
        }
        out
    }
}
