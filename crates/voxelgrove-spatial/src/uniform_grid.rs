//! Uniform bucket grid over world-space boxes.

use glam::{IVec3, UVec3, Vec3};
use hashbrown::HashSet;
use voxelgrove_core::{Aabb, Frustum};

/// A fixed grid of cells, each holding the payloads of boxes overlapping it.
///
/// Boxes are clamped to the grid, so a box outside it lands in the border
/// cells nearest to it.
#[derive(Clone, Debug)]
pub struct UniformGrid {
    origin: Vec3,
    cell_size: f32,
    dims: UVec3,
    cells: Vec<Vec<u32>>,
}

impl UniformGrid {
    /// Create an empty grid of `dims` cells with its minimum corner at `origin`.
    pub fn new(origin: Vec3, cell_size: f32, dims: UVec3) -> Self {
        let count = dims.x as usize * dims.y as usize * dims.z as usize;
        Self {
            origin,
            cell_size,
            dims,
            cells: vec![Vec::new(); count],
        }
    }

    /// Grid dimensions in cells
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    /// Edge length of a cell
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// World-space box covered by the whole grid.
    pub fn bounds(&self) -> Aabb {
        Aabb::new(
            self.origin,
            self.origin + self.dims.as_vec3() * self.cell_size,
        )
    }

    #[inline]
    fn index(&self, cell: UVec3) -> usize {
        cell.x as usize
            + self.dims.x as usize * (cell.y as usize + self.dims.y as usize * cell.z as usize)
    }

    /// Clamped cell range `[min, max]` (inclusive) overlapped by `aabb`.
    fn cell_range(&self, aabb: &Aabb) -> Option<(UVec3, UVec3)> {
        if self.cells.is_empty() {
            return None;
        }
        let upper = self.dims.as_ivec3() - IVec3::ONE;
        let to_cell = |p: Vec3| {
            ((p - self.origin) / self.cell_size)
                .floor()
                .as_ivec3()
                .clamp(IVec3::ZERO, upper)
                .as_uvec3()
        };
        Some((to_cell(aabb.min), to_cell(aabb.max)))
    }

    /// World-space box of cell `(x, y, z)`.
    pub fn cell_bounds(&self, cell: UVec3) -> Aabb {
        let min = self.origin + cell.as_vec3() * self.cell_size;
        Aabb::new(min, min + Vec3::splat(self.cell_size))
    }

    /// Append `payload` to every cell `aabb` overlaps.
    pub fn insert(&mut self, aabb: &Aabb, payload: u32) {
        let Some((min, max)) = self.cell_range(aabb) else {
            return;
        };
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    let index = self.index(UVec3::new(x, y, z));
                    self.cells[index].push(payload);
                }
            }
        }
    }

    /// Append `payload` only to the first overlapped cell (x fastest, then y,
    /// then z) whose own box intersects `frustum`.
    ///
    /// Returns false if no overlapped cell is visible.
    pub fn insert_first_visible(&mut self, aabb: &Aabb, payload: u32, frustum: &Frustum) -> bool {
        let Some((min, max)) = self.cell_range(aabb) else {
            return false;
        };
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    let cell = UVec3::new(x, y, z);
                    if frustum.test_aabb(&self.cell_bounds(cell)) {
                        let index = self.index(cell);
                        self.cells[index].push(payload);
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Payloads of cell `(x, y, z)`, empty when out of range.
    pub fn cell(&self, cell: UVec3) -> &[u32] {
        if cell.cmpge(self.dims).any() {
            return &[];
        }
        &self.cells[self.index(cell)]
    }

    /// Payloads in every cell `aabb` overlaps, each reported once in first-seen order.
    pub fn query(&self, aabb: &Aabb) -> Vec<u32> {
        let mut out = Vec::new();
        let Some((min, max)) = self.cell_range(aabb) else {
            return out;
        };
        let mut seen = HashSet::new();
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    for &payload in &self.cells[self.index(UVec3::new(x, y, z))] {
                        if seen.insert(payload) {
                            out.push(payload);
                        }
                    }
                }
            }
        }
        out
    }

    /// Empty every cell, keeping allocations for the next frame.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }
}
