//! Collision queries against voxel grids.

pub mod collision;

pub use collision::{box_query, point_query, ray_query, RayHit, VoxelHit};
