//! World and terrain configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use voxelgrove_core::constants::{CHUNK_COMPRESSION_SCALE, CHUNK_HEIGHT, CHUNK_WIDTH};
use voxelgrove_core::{Error, Result};

use crate::WorldSeed;

/// Terrain noise configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Seed for every noise channel.
    pub seed: WorldSeed,
    /// Heightmap frequency, applied to world voxel coordinates.
    pub frequency: f64,
    /// Number of fractal octaves for the heightmap.
    pub octaves: usize,
    /// Frequency of the biome selection channel.
    pub biome_frequency: f64,
    /// Columns lower than this are topped up with water.
    pub water_level: u32,
    /// Tallest column the heightmap can produce, in voxels.
    pub height_scale: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            frequency: 0.01,
            octaves: 4,
            biome_frequency: 0.002,
            water_level: 20,
            height_scale: 48.0,
        }
    }
}

/// Chunk cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Chunks kept on each side of the center chunk.
    pub view_distance: u32,
    /// Chunk footprint in voxels along x and z.
    pub chunk_width: u32,
    /// Chunk height in voxels.
    pub chunk_height: u32,
    /// Edge length of one voxel in world units.
    pub voxel_size: f32,
    /// Block scale used to compress generated chunks.
    pub compression_scale: u32,
    /// Generation worker threads.
    pub worker_threads: usize,
    /// Location of saved world data. Accepted but never read or written.
    pub world_path: Option<PathBuf>,
    pub terrain: TerrainConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            view_distance: 4,
            chunk_width: CHUNK_WIDTH,
            chunk_height: CHUNK_HEIGHT,
            voxel_size: 1.0,
            compression_scale: CHUNK_COMPRESSION_SCALE,
            worker_threads: 4,
            world_path: None,
            terrain: TerrainConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Side length of the chunk window, `2 * view_distance + 1`.
    #[inline]
    pub fn window_size(&self) -> usize {
        2 * self.view_distance as usize + 1
    }

    /// Chunk footprint in world units.
    #[inline]
    pub fn chunk_extent(&self) -> f32 {
        self.chunk_width as f32 * self.voxel_size
    }

    /// Reject settings the cache cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_width == 0 || self.chunk_height == 0 {
            return Err(Error::InvalidData(format!(
                "chunk dimensions must be non-zero, got {}x{}",
                self.chunk_width, self.chunk_height
            )));
        }
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(Error::InvalidData(format!(
                "voxel size must be positive, got {}",
                self.voxel_size
            )));
        }
        if self.compression_scale == 0 {
            return Err(Error::InvalidData("compression scale must be > 0".into()));
        }
        if self.worker_threads == 0 {
            return Err(Error::InvalidData("at least one worker thread is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size(), 9);
        assert_relative_eq!(config.chunk_extent(), 64.0);
    }

    #[test]
    fn rejects_bad_values() {
        let config = WorldConfig {
            compression_scale: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WorldConfig {
            voxel_size: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
