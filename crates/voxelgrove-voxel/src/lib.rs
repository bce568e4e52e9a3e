//! Voxel grid storage for Voxelgrove.
//!
//! Grids are dense byte arrays of palette indices that can be block-compressed
//! into uniform cells. Meshes bundle one or more grids with a palette and track
//! which bytes changed since the last GPU upload.

pub mod codec;
pub mod grid;
pub mod mesh;
pub mod pool;
pub mod shape;

pub use codec::is_block_uniform;
pub use grid::{CellTable, CompressedCell, VoxelGrid, VoxelWrite};
pub use mesh::{MeshId, MeshStore, Palette, Submesh, SubmeshDirty, VoxelMesh};
pub use pool::{BufferPool, PoolStats};
pub use shape::{ProceduralShape, VoxelShape};
