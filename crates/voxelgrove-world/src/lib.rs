//! Procedural world generation and the chunk cache for Voxelgrove.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod generation;
pub mod job;

pub use cache::{CacheStats, ChunkCache, SlotState, UpdateReport};
pub use chunk::Chunk;
pub use config::{TerrainConfig, WorldConfig};
pub use generation::{world_palette, Biome, NoiseSource, TerrainGenerator, WATER_COLOR};
pub use job::{generation_thread_pool, GeneratedChunk, GenerationStatus, Job, JobPool};

/// World seed for procedural generation.
pub type WorldSeed = u64;
