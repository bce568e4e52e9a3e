//! Generated terrain chunks.

use std::sync::Arc;

use voxelgrove_core::ChunkCoord;
use voxelgrove_voxel::{BufferPool, VoxelGrid, VoxelMesh};

/// One column of terrain: a single-grid mesh at a chunk coordinate.
///
/// Dropping a chunk hands its color buffers back to the pool.
#[derive(Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    mesh: VoxelMesh,
    pool: Arc<BufferPool>,
}

impl Chunk {
    pub fn new(coord: ChunkCoord, mesh: VoxelMesh, pool: Arc<BufferPool>) -> Self {
        Self { coord, mesh, pool }
    }

    /// Position in chunk-grid units
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// The chunk's mesh asset
    pub fn mesh(&self) -> &VoxelMesh {
        &self.mesh
    }

    /// Mutable mesh access for edits
    pub fn mesh_mut(&mut self) -> &mut VoxelMesh {
        &mut self.mesh
    }

    /// The compressed terrain grid.
    pub fn grid(&self) -> Option<&VoxelGrid> {
        self.mesh.submeshes().first().map(|s| s.grid())
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        for buffer in self.mesh.take_buffers() {
            self.pool.release(buffer);
        }
    }
}
