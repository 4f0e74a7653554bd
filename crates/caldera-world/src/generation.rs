//! Procedural chunk content generation.

use caldera_common::ChunkCoord;
use noise::{NoiseFn, Perlin};

use crate::chunk::{Block, CHUNK_SIZE, CHUNK_VOLUME};

/// World generator configuration.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// World seed
    pub seed: u32,
    /// Terrain scale (larger = smoother)
    pub terrain_scale: f64,
    /// Terrain height amplitude in blocks
    pub height_scale: f64,
    /// Water surface height in blocks
    pub sea_level: i32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            terrain_scale: 100.0,
            height_scale: 48.0,
            sea_level: 0,
        }
    }
}

/// Procedural world generator.
///
/// Generation is a pure function of `(chunk coordinate, world seed)`:
/// the same inputs always produce identical block data, so evicted
/// chunks can be silently regenerated on revisit.
pub struct WorldGenerator {
    /// Configuration
    config: GeneratorConfig,
    /// Terrain noise
    terrain_noise: Perlin,
    /// Detail noise
    detail_noise: Perlin,
}

impl WorldGenerator {
    /// Creates a new generator with the given config.
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        let terrain_noise = Perlin::new(config.seed);
        let detail_noise = Perlin::new(config.seed.wrapping_add(1));

        Self {
            config,
            terrain_noise,
            detail_noise,
        }
    }

    /// Creates a generator with default config and the given seed.
    #[must_use]
    pub fn with_seed(seed: u32) -> Self {
        Self::new(GeneratorConfig {
            seed,
            ..Default::default()
        })
    }

    /// Generates the block data for the chunk at the given coordinate.
    #[must_use]
    pub fn generate_blocks(&self, coord: ChunkCoord) -> Vec<Block> {
        let mut blocks = vec![Block::default(); CHUNK_VOLUME];

        let size = CHUNK_SIZE as i32;
        let base_x = f64::from(coord.x) * f64::from(CHUNK_SIZE);
        let base_z = f64::from(coord.z) * f64::from(CHUNK_SIZE);

        for z in 0..size {
            for x in 0..size {
                let wx = (base_x + f64::from(x)) / self.config.terrain_scale;
                let wz = (base_z + f64::from(z)) / self.config.terrain_scale;

                let height = self.terrain_noise.get([wx, wz]);
                let detail = self.detail_noise.get([wx * 4.0, wz * 4.0]) * 0.1;
                let surface = ((height + detail) * self.config.height_scale) as i32;

                for y in 0..size {
                    let world_y = coord.y * size + y;
                    let material = self.column_material(world_y, surface);
                    let index = ((y * size + z) * size + x) as usize;
                    blocks[index] = Block(material);
                }
            }
        }

        blocks
    }

    /// Chooses a material for a block at `world_y` under a surface height.
    #[must_use]
    fn column_material(&self, world_y: i32, surface: i32) -> u16 {
        // Material IDs:
        // 0 = air
        // 1 = water
        // 2 = sand
        // 3 = grass
        // 4 = dirt
        // 5 = stone
        if world_y > surface {
            if world_y <= self.config.sea_level {
                return 1;
            }
            return 0;
        }
        if world_y == surface {
            if surface <= self.config.sea_level + 1 {
                return 2;
            }
            return 3;
        }
        if world_y > surface - 4 {
            return 4;
        }
        5
    }

    /// Returns the generator configuration.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_deterministic() {
        let gen1 = WorldGenerator::with_seed(42);
        let gen2 = WorldGenerator::with_seed(42);

        let coord = ChunkCoord::new(3, 0, -2);
        assert_eq!(gen1.generate_blocks(coord), gen2.generate_blocks(coord));
    }

    #[test]
    fn test_different_seeds_different_terrain() {
        let gen1 = WorldGenerator::with_seed(42);
        let gen2 = WorldGenerator::with_seed(999);

        let coord = ChunkCoord::new(0, 0, 0);
        assert_ne!(gen1.generate_blocks(coord), gen2.generate_blocks(coord));
    }

    #[test]
    fn test_deep_chunks_are_solid() {
        let generator = WorldGenerator::with_seed(7);
        let blocks = generator.generate_blocks(ChunkCoord::new(0, -40, 0));
        assert!(blocks.iter().all(|b| b.0 == 5));
    }

    #[test]
    fn test_high_chunks_are_air() {
        let generator = WorldGenerator::with_seed(7);
        let blocks = generator.generate_blocks(ChunkCoord::new(0, 40, 0));
        assert!(blocks.iter().all(|b| b.0 == 0));
    }
}
