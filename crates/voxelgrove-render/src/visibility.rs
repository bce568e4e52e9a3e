//! Per-frame visibility ordering of models.

use glam::{UVec3, Vec3};
use voxelgrove_core::{Aabb, Frustum};
use voxelgrove_spatial::{Bvh, UniformGrid};

use crate::mesh_cache::VisibleModel;

/// Indices of `models` inside `frustum`, nearest to `eye` first.
///
/// The hierarchy is rebuilt from scratch on every call.
pub fn order_visible(models: &[VisibleModel], frustum: Option<&Frustum>, eye: Vec3) -> Vec<usize> {
    let bounds: Vec<Aabb> = models.iter().map(|m| m.bounds).collect();
    let bvh = Bvh::construct(&bounds);
    tracing::trace!(models = models.len(), depth = bvh.max_depth(), "visibility hierarchy built");
    bvh.front_to_back(eye, frustum)
}

/// Bucket model indices into a grid, each in its first visible cell.
///
/// Models with no visible cell are left out.
pub fn bucket_visible(
    models: &[VisibleModel],
    frustum: &Frustum,
    origin: Vec3,
    cell_size: f32,
    dims: UVec3,
) -> UniformGrid {
    let mut grid = UniformGrid::new(origin, cell_size, dims);
    for (index, model) in models.iter().enumerate() {
        grid.insert_first_visible(&model.bounds, index as u32, frustum);
    }
    grid
}
