//! Procedural terrain generation.

use std::sync::atomic::{AtomicBool, Ordering};

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use voxelgrove_core::{ChunkCoord, ColorIndex, Result, Rgba8, EMPTY_COLOR};
use voxelgrove_voxel::{BufferPool, Palette, VoxelGrid};

use crate::config::{TerrainConfig, WorldConfig};

/// Octave counts above this are clamped.
pub const MAX_OCTAVES: usize = 8;

/// Palette index of water.
pub const WATER_COLOR: ColorIndex = 1;

/// Seeded 2D fractal noise remapped to `[0, 1]`.
pub struct NoiseSource {
    /// One fractal per octave count, `layers[n - 1]` has `n` octaves.
    layers: Vec<Fbm<Perlin>>,
}

impl NoiseSource {
    pub fn new(seed: u32) -> Self {
        Self {
            layers: (1..=MAX_OCTAVES)
                .map(|octaves| Fbm::<Perlin>::new(seed).set_octaves(octaves))
                .collect(),
        }
    }

    /// Fractal noise at `(x, z)` summed over `octaves` octaves, in `[0, 1]`.
    pub fn octave_2d(&self, x: f64, z: f64, octaves: usize) -> f64 {
        let layer = &self.layers[octaves.clamp(1, MAX_OCTAVES) - 1];
        ((layer.get([x, z]) + 1.0) * 0.5).clamp(0.0, 1.0)
    }
}

impl std::fmt::Debug for NoiseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseSource")
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// Terrain biome, chosen per column by a low-frequency noise channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Biome {
    Plains,
    Desert,
    Tundra,
    Forest,
}

impl Biome {
    /// Every biome, in selection order.
    pub const ALL: [Self; 4] = [Self::Desert, Self::Plains, Self::Forest, Self::Tundra];

    /// Pick the biome for a selection-noise value in `[0, 1]`.
    pub fn from_noise(value: f64) -> Self {
        let index = (value * Self::ALL.len() as f64) as usize;
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// Palette index of the ground
    pub const fn primary_color(self) -> ColorIndex {
        match self {
            Self::Plains => 2,
            Self::Desert => 3,
            Self::Tundra => 4,
            Self::Forest => 5,
        }
    }

    /// Fraction of the configured height scale this biome reaches.
    pub const fn height_factor(self) -> f64 {
        match self {
            Self::Plains => 0.6,
            Self::Desert => 0.4,
            Self::Tundra => 1.0,
            Self::Forest => 0.8,
        }
    }
}

/// Palette shared by every generated chunk.
pub fn world_palette() -> Result<Palette> {
    Palette::new(vec![
        Rgba8::TRANSPARENT,
        Rgba8::new(40, 90, 200, 180),
        Rgba8::opaque(96, 160, 64),
        Rgba8::opaque(218, 196, 128),
        Rgba8::opaque(236, 240, 244),
        Rgba8::opaque(40, 110, 48),
    ])
}

/// Procedural terrain generator using fractal noise.
#[derive(Debug)]
pub struct TerrainGenerator {
    config: TerrainConfig,
    chunk_width: u32,
    chunk_height: u32,
    voxel_size: f32,
    compression_scale: u32,
    height_noise: NoiseSource,
    biome_noise: NoiseSource,
}

impl TerrainGenerator {
    /// Create a generator producing chunks shaped by `world`.
    pub fn new(world: &WorldConfig) -> Self {
        let seed = world.terrain.seed;
        let seed = (seed ^ (seed >> 32)) as u32;
        Self {
            config: world.terrain.clone(),
            chunk_width: world.chunk_width,
            chunk_height: world.chunk_height,
            voxel_size: world.voxel_size,
            compression_scale: world.compression_scale,
            height_noise: NoiseSource::new(seed),
            biome_noise: NoiseSource::new(seed.wrapping_add(1)),
        }
    }

    /// Get the terrain configuration.
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Biome of the column at world voxel coordinates `(x, z)`.
    pub fn biome_at(&self, world_x: i64, world_z: i64) -> Biome {
        let f = self.config.biome_frequency;
        Biome::from_noise(self.biome_noise.octave_2d(world_x as f64 * f, world_z as f64 * f, 2))
    }

    /// Number of solid voxels in the column at world voxel coordinates `(x, z)`.
    pub fn height_at(&self, world_x: i64, world_z: i64) -> u32 {
        let f = self.config.frequency;
        let n = self
            .height_noise
            .octave_2d(world_x as f64 * f, world_z as f64 * f, self.config.octaves);
        let height = n * self.config.height_scale * self.biome_at(world_x, world_z).height_factor();
        (height.max(0.0) as u32).min(self.chunk_height)
    }

    /// World voxel coordinates of a chunk's minimum corner on x and z.
    fn voxel_origin(&self, coord: ChunkCoord) -> (i64, i64) {
        let w = i64::from(self.chunk_width);
        let half = w / 2;
        let corner = |c: i64| c.saturating_mul(w).saturating_sub(half);
        (corner(coord.x), corner(coord.z))
    }

    /// Fill a dense chunk grid column by column (x, then z, then y).
    ///
    /// `canceled` is polled once per column. Returns false if generation was
    /// canceled, leaving the grid partially filled.
    pub fn fill_chunk(&self, coord: ChunkCoord, grid: &mut VoxelGrid, canceled: &AtomicBool) -> bool {
        let (w, h) = (self.chunk_width as usize, self.chunk_height as usize);
        let water_level = (self.config.water_level as usize).min(h);
        let (origin_x, origin_z) = self.voxel_origin(coord);
        let Some(voxels) = grid.dense_mut() else {
            return false;
        };

        for lx in 0..w {
            for lz in 0..w {
                if canceled.load(Ordering::Relaxed) {
                    return false;
                }
                let (wx, wz) = (origin_x + lx as i64, origin_z + lz as i64);
                let height = self.height_at(wx, wz) as usize;
                let ground = self.biome_at(wx, wz).primary_color();
                for ly in 0..h {
                    let color = if ly < height {
                        ground
                    } else if ly < water_level {
                        WATER_COLOR
                    } else {
                        EMPTY_COLOR
                    };
                    voxels[lx + w * (ly + h * lz)] = color;
                }
            }
        }
        true
    }

    /// Generate and compress the chunk at `coord`, drawing buffers from `pool`.
    ///
    /// Returns `Ok(None)` when canceled; the partial buffer goes back to the pool.
    pub fn generate(
        &self,
        coord: ChunkCoord,
        pool: &BufferPool,
        canceled: &AtomicBool,
    ) -> Result<Option<VoxelGrid>> {
        let (w, h) = (self.chunk_width, self.chunk_height);
        let len = w as usize * h as usize * w as usize;
        let mut grid = VoxelGrid::with_buffer(w, h, w, self.voxel_size, pool.acquire(len));

        if !self.fill_chunk(coord, &mut grid, canceled) {
            pool.release(grid.take_buffer());
            return Ok(None);
        }

        let scale = self.compression_scale;
        let block = (scale * scale * scale) as usize;
        let (saved, dense) = grid.compress_into(scale, pool.acquire(len / block.max(1)))?;
        pool.release(dense);
        tracing::trace!(x = coord.x, z = coord.z, saved, "generated chunk");
        Ok(Some(grid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_world(seed: u64) -> WorldConfig {
        WorldConfig {
            chunk_width: 16,
            chunk_height: 32,
            compression_scale: 4,
            terrain: TerrainConfig {
                seed,
                water_level: 10,
                height_scale: 32.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn noise_stays_in_unit_range() {
        let noise = NoiseSource::new(7);
        for i in 0..200 {
            let v = noise.octave_2d(f64::from(i) * 0.37, f64::from(i) * -0.61, 4);
            assert!((0.0..=1.0).contains(&v));
        }
        // Out-of-range octave counts are clamped rather than rejected.
        let _ = noise.octave_2d(0.3, 0.3, 0);
        let _ = noise.octave_2d(0.3, 0.3, 100);
    }

    #[test]
    fn generator_deterministic() {
        let gen1 = TerrainGenerator::new(&small_world(12345));
        let gen2 = TerrainGenerator::new(&small_world(12345));
        for x in -50..50 {
            for z in -50..50 {
                assert_eq!(gen1.height_at(x, z), gen2.height_at(x, z));
                assert_eq!(gen1.biome_at(x, z), gen2.biome_at(x, z));
            }
        }
    }

    #[test]
    fn biome_selection_covers_table() {
        assert_eq!(Biome::from_noise(0.0), Biome::Desert);
        assert_eq!(Biome::from_noise(0.3), Biome::Plains);
        assert_eq!(Biome::from_noise(0.6), Biome::Forest);
        assert_eq!(Biome::from_noise(1.0), Biome::Tundra);
        assert!(world_palette().unwrap().len() > usize::from(Biome::Forest.primary_color()));
    }

    #[test]
    fn columns_are_ground_then_water_then_air() {
        let world = small_world(42);
        let generator = TerrainGenerator::new(&world);
        let mut grid = VoxelGrid::new(16, 32, 16, 1.0);
        let coord = ChunkCoord::new(3, -2);
        assert!(generator.fill_chunk(coord, &mut grid, &AtomicBool::new(false)));

        let (ox, oz) = generator.voxel_origin(coord);
        for (lx, lz) in [(0u32, 0u32), (5, 9), (15, 15)] {
            let (wx, wz) = (ox + i64::from(lx), oz + i64::from(lz));
            let height = generator.height_at(wx, wz);
            let ground = generator.biome_at(wx, wz).primary_color();
            for ly in 0..32 {
                let expected = if ly < height {
                    ground
                } else if ly < 10 {
                    WATER_COLOR
                } else {
                    EMPTY_COLOR
                };
                assert_eq!(grid.voxel(lx, ly, lz), Some(expected));
            }
        }
    }

    #[test]
    fn generate_compresses_and_recycles() {
        let world = small_world(1);
        let generator = TerrainGenerator::new(&world);
        let pool = BufferPool::new();
        let grid = generator
            .generate(ChunkCoord::new(0, 0), &pool, &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert!(grid.is_compressed());
        assert_eq!(grid.scale(), 4);
        assert_eq!(grid.voxel_dims().to_array(), [16, 32, 16]);
        // The dense fill buffer went back to the pool.
        assert_eq!(pool.stats().recycled, 1);
    }

    #[test]
    fn canceled_generation_returns_nothing() {
        let generator = TerrainGenerator::new(&small_world(1));
        let pool = BufferPool::new();
        let result = generator
            .generate(ChunkCoord::new(0, 0), &pool, &AtomicBool::new(true))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(pool.stats().recycled, 1);
    }
}
