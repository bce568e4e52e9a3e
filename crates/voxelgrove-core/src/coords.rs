//! Coordinate systems for the chunk grid.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Chunk coordinates are clamped to `±COORD_LIMIT` so windows around any
/// viewpoint stay representable.
pub const COORD_LIMIT: i64 = 1 << 48;

/// Chunk position in chunk-grid units on the horizontal plane.
///
/// Chunks are centered on `coord * chunk_dim`, so chunk `(0, 0)` covers
/// `[-chunk_dim / 2, chunk_dim / 2)` on both axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i64,
    pub z: i64,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    #[inline]
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }

    /// Get the chunk containing a world position.
    ///
    /// `chunk_dim` is the chunk footprint in world units. Far positions clamp
    /// to [`COORD_LIMIT`]; NaN maps to 0.
    #[inline]
    pub fn from_world(pos: Vec3, chunk_dim: f32) -> Self {
        let half = chunk_dim * 0.5;
        let axis = |v: f32| {
            (((v + half) / chunk_dim).floor() as i64).clamp(-COORD_LIMIT, COORD_LIMIT)
        };
        Self::new(axis(pos.x), axis(pos.z))
    }

    /// World-space position of the chunk's minimum corner (y = 0).
    #[inline]
    pub fn world_min(self, chunk_dim: f32) -> Vec3 {
        let half = chunk_dim * 0.5;
        Vec3::new(
            self.x as f32 * chunk_dim - half,
            0.0,
            self.z as f32 * chunk_dim - half,
        )
    }

    /// Offset by a number of chunks, saturating at the `i64` range.
    #[inline]
    pub const fn offset(self, dx: i64, dz: i64) -> Self {
        Self::new(self.x.saturating_add(dx), self.z.saturating_add(dz))
    }

    /// Chebyshev (chessboard) distance in chunks
    #[inline]
    pub fn chebyshev_distance(self, other: Self) -> u64 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }

    /// Slot of this chunk in a `(2 * view_distance + 1)²` window centered on
    /// `center`, or `None` when it lies outside the window.
    #[inline]
    pub fn window_slot(self, center: Self, view_distance: u32) -> Option<(usize, usize)> {
        let vd = i64::from(view_distance);
        let ix = self.x.checked_sub(center.x)?.checked_add(vd)?;
        let iz = self.z.checked_sub(center.z)?.checked_add(vd)?;
        let size = 2 * vd + 1;
        if (0..size).contains(&ix) && (0..size).contains(&iz) {
            Some((ix as usize, iz as usize))
        } else {
            None
        }
    }
}
