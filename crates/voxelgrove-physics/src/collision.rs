//! Point, ray and box queries against dense or block-compressed grids.
//!
//! Queries are expressed in world space; `transform` maps grid-local space
//! (minimum corner at the origin) to world space. Empty voxels (color 0)
//! never produce hits.

use glam::{IVec3, Mat4, UVec3, Vec3};
use voxelgrove_core::{Aabb, ColorIndex, Ray, EMPTY_COLOR};
use voxelgrove_voxel::VoxelGrid;

/// A solid voxel found by a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxelHit {
    /// Byte offset into the grid's color buffer.
    pub index: usize,
    pub color: ColorIndex,
}

fn hit_at(grid: &VoxelGrid, index: usize) -> Option<VoxelHit> {
    let color = *grid.color_indices().get(index)?;
    (color != EMPTY_COLOR).then_some(VoxelHit { index, color })
}

/// The solid voxel containing `point`, if any.
pub fn point_query(point: Vec3, grid: &VoxelGrid, transform: Mat4) -> Option<VoxelHit> {
    let local = transform.inverse().transform_point3(point) / grid.fine_voxel_size();
    let voxel = local.floor();
    if voxel.cmplt(Vec3::ZERO).any() || !voxel.is_finite() {
        return None;
    }
    let voxel = voxel.as_uvec3();
    if voxel.cmpge(grid.voxel_dims()).any() {
        return None;
    }
    let index = grid.resolve(voxel.x, voxel.y, voxel.z)?;
    hit_at(grid, index)
}

/// First solid voxel along a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub hit: VoxelHit,
    /// Fine-voxel coordinate of the hit.
    pub voxel: UVec3,
    /// Ray parameter where the ray enters the voxel.
    pub distance: f32,
}

/// March `ray` through the grid's fine voxels and return the first solid one
/// within `max_distance`.
pub fn ray_query(ray: &Ray, grid: &VoxelGrid, transform: Mat4, max_distance: f32) -> Option<RayHit> {
    let dims = grid.voxel_dims();
    if dims.cmpeq(UVec3::ZERO).any() {
        return None;
    }
    let inverse = transform.inverse();
    let fine = grid.fine_voxel_size();
    // Unnormalized so the ray parameter stays in world units.
    let local = Ray {
        origin: inverse.transform_point3(ray.origin) / fine,
        direction: inverse.transform_vector3(ray.direction) / fine,
    };
    if !local.origin.is_finite() || local.direction.length_squared() == 0.0 {
        return None;
    }
    let (enter, exit) = Aabb::new(Vec3::ZERO, dims.as_vec3()).intersect_ray(&local)?;
    let exit = exit.min(max_distance);
    if enter > exit {
        return None;
    }

    let d = local.direction;
    let upper = dims.as_ivec3() - IVec3::ONE;
    let mut voxel = local.at(enter).floor().as_ivec3().clamp(IVec3::ZERO, upper);
    let step = IVec3::select(
        d.cmpgt(Vec3::ZERO),
        IVec3::ONE,
        IVec3::select(d.cmplt(Vec3::ZERO), IVec3::NEG_ONE, IVec3::ZERO),
    );
    let boundary = (voxel + step.max(IVec3::ZERO)).as_vec3();
    let mut t_max = Vec3::select(
        d.cmpeq(Vec3::ZERO),
        Vec3::INFINITY,
        (boundary - local.origin) / d,
    );
    let t_delta = d.abs().recip();

    let mut t = enter;
    loop {
        let cell = voxel.as_uvec3();
        if let Some(hit) = grid.resolve(cell.x, cell.y, cell.z).and_then(|i| hit_at(grid, i)) {
            return Some(RayHit {
                hit,
                voxel: cell,
                distance: t,
            });
        }
        let axis = if t_max.x <= t_max.y && t_max.x <= t_max.z {
            0
        } else if t_max.y <= t_max.z {
            1
        } else {
            2
        };
        t = t_max[axis];
        if t > exit {
            return None;
        }
        voxel[axis] += step[axis];
        if voxel[axis] < 0 || voxel[axis] > upper[axis] {
            return None;
        }
        t_max[axis] += t_delta[axis];
    }
}

/// Inclusive range of grid units of edge `unit` touched by `local`.
fn unit_range(local: &Aabb, unit: f32, dims: UVec3) -> Option<(UVec3, UVec3)> {
    let extent = dims.as_vec3() * unit;
    if dims.cmpeq(UVec3::ZERO).any()
        || local.max.cmplt(Vec3::ZERO).any()
        || local.min.cmpgt(extent).any()
    {
        return None;
    }
    let upper = dims - UVec3::ONE;
    let lo = (local.min / unit).floor().max(Vec3::ZERO).as_uvec3().min(upper);
    let hi = (local.max / unit).floor().max(Vec3::ZERO).as_uvec3().min(upper);
    Some((lo, hi))
}

/// Every solid voxel whose box touches `aabb`, sorted by index.
///
/// On compressed grids a uniform cell yields a single hit for its shared byte.
pub fn box_query(aabb: &Aabb, grid: &VoxelGrid, transform: Mat4) -> Vec<VoxelHit> {
    let local = aabb.transformed(transform.inverse());
    let mut hits = Vec::new();
    let Some((lo, hi)) = unit_range(&local, grid.voxel_size(), grid.dims()) else {
        return hits;
    };

    match grid.cell_table() {
        None => {
            for z in lo.z..=hi.z {
                for y in lo.y..=hi.y {
                    for x in lo.x..=hi.x {
                        if let Some(index) = grid.resolve(x, y, z) {
                            hits.extend(hit_at(grid, index));
                        }
                    }
                }
            }
        }
        Some(table) => {
            let s = table.scale();
            let fine = grid.fine_voxel_size();
            for cz in lo.z..=hi.z {
                for cy in lo.y..=hi.y {
                    for cx in lo.x..=hi.x {
                        let Some(cell_index) = grid.cell_index(cx, cy, cz) else {
                            continue;
                        };
                        let cell = table.cells()[cell_index];
                        let base = cell.voxel_offset as usize;
                        if cell.is_uniform() {
                            hits.extend(hit_at(grid, base));
                            continue;
                        }
                        let cell_min = UVec3::new(cx, cy, cz).as_vec3() * grid.voxel_size();
                        for lz in 0..s {
                            for ly in 0..s {
                                for lx in 0..s {
                                    let min = cell_min + UVec3::new(lx, ly, lz).as_vec3() * fine;
                                    let sub = Aabb::new(min, min + Vec3::splat(fine));
                                    if sub.intersects(&local) {
                                        let local_index = (lx + s * (ly + s * lz)) as usize;
                                        hits.extend(hit_at(grid, base + local_index));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    hits.sort_unstable_by_key(|h| h.index);
    hits.dedup_by_key(|h| h.index);
    hits
}
