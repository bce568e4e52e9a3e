//! Core types, math, and error handling for Voxelgrove.
//!
//! This crate provides the foundational types shared by every other crate:
//! - Color indices and palette colors
//! - Chunk-grid coordinates
//! - Bounding boxes, frustums and rays
//! - The common error type

pub mod coords;
pub mod error;
pub mod math;
pub mod types;

pub use coords::{ChunkCoord, COORD_LIMIT};
pub use error::{Error, Result};
pub use math::{Aabb, Frustum, Ray};
pub use types::{ColorIndex, Rgba8, EMPTY_COLOR};

/// Shared constants
pub mod constants {
    /// Default chunk footprint in voxels along x and z
    pub const CHUNK_WIDTH: u32 = 64;
    /// Default chunk height in voxels
    pub const CHUNK_HEIGHT: u32 = 64;
    /// Default block scale used when compressing generated chunks
    pub const CHUNK_COMPRESSION_SCALE: u32 = 4;
    /// Largest palette a mesh can carry (color indices are bytes)
    pub const MAX_PALETTE_COLORS: usize = 256;
}
