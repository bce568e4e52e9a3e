//! Voxel mesh assets and their dirty-state tracking.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use hashbrown::HashMap;
use voxelgrove_core::constants::MAX_PALETTE_COLORS;
use voxelgrove_core::{Aabb, ColorIndex, Error, Result, Rgba8};

use crate::grid::VoxelGrid;

/// Process-unique identity of a mesh asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

impl MeshId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Up to 256 colors addressed by [`ColorIndex`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgba8>,
}

impl Palette {
    /// Create a palette. Index 0 should be the empty color.
    pub fn new(colors: Vec<Rgba8>) -> Result<Self> {
        if colors.len() > MAX_PALETTE_COLORS {
            return Err(Error::CapacityExhausted(format!(
                "palette has {} colors, at most {MAX_PALETTE_COLORS} allowed",
                colors.len()
            )));
        }
        Ok(Self { colors })
    }

    /// Number of colors
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Returns true if the palette holds no colors
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color at `index`
    pub fn get(&self, index: ColorIndex) -> Option<Rgba8> {
        self.colors.get(usize::from(index)).copied()
    }

    /// Colors as raw bytes, four per entry.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }

    fn set(&mut self, index: ColorIndex, color: Rgba8) -> bool {
        match self.colors.get_mut(usize::from(index)) {
            Some(slot) if *slot != color => {
                *slot = color;
                true
            }
            _ => false,
        }
    }
}

/// Dirty state drained from a submesh after an upload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmeshDirty {
    /// Byte range of the color buffer that changed.
    pub voxels: Option<Range<usize>>,
    /// Cell indices whose table entries changed, sorted and unique.
    pub cells: Vec<u32>,
}

impl SubmeshDirty {
    /// Returns true if nothing changed
    pub fn is_empty(&self) -> bool {
        self.voxels.is_none() && self.cells.is_empty()
    }
}

/// One grid of a mesh, placed at a local offset.
#[derive(Clone, Debug)]
pub struct Submesh {
    grid: VoxelGrid,
    offset: Vec3,
    dirty: SubmeshDirty,
}

impl Submesh {
    /// Create a submesh at the mesh origin.
    pub fn new(grid: VoxelGrid) -> Self {
        Self::with_offset(grid, Vec3::ZERO)
    }

    /// Create a submesh at a local offset.
    pub fn with_offset(grid: VoxelGrid, offset: Vec3) -> Self {
        Self {
            grid,
            offset,
            dirty: SubmeshDirty::default(),
        }
    }

    /// The backing grid
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Local offset of the grid's minimum corner
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// Mesh-local bounds
    pub fn bounds(&self) -> Aabb {
        let b = self.grid.bounds();
        Aabb::new(b.min + self.offset, b.max + self.offset)
    }

    /// Write a voxel, recording the bytes and cells it touched.
    pub fn set_voxel(&mut self, x: u32, y: u32, z: u32, color: ColorIndex) -> bool {
        let len_before = self.grid.color_indices().len();
        let Some(write) = self.grid.write_voxel(x, y, z, color) else {
            return false;
        };
        self.mark_bytes(write.index..write.index + 1);
        if let Some(cell) = write.decompressed_cell {
            self.mark_bytes(len_before..self.grid.color_indices().len());
            self.mark_cell(cell as u32);
        }
        true
    }

    /// Expand a uniform cell, recording the appended bytes and the cell.
    pub fn decompress_cell(&mut self, cx: u32, cy: u32, cz: u32) -> bool {
        let len_before = self.grid.color_indices().len();
        if !self.grid.decompress_cell(cx, cy, cz) {
            return false;
        }
        let len_after = self.grid.color_indices().len();
        self.mark_bytes(len_before..len_after);
        if let Some(index) = self.grid.cell_index(cx, cy, cz) {
            self.mark_cell(index as u32);
        }
        true
    }

    /// Collapse a literal cell that became uniform, recording the change.
    pub fn recompress_cell(&mut self, cx: u32, cy: u32, cz: u32) -> bool {
        if !self.grid.recompress_cell(cx, cy, cz) {
            return false;
        }
        if let Some(index) = self.grid.cell_index(cx, cy, cz) {
            let cell = self.grid.cells()[index];
            let slot = cell.voxel_offset as usize;
            self.mark_bytes(slot..slot + 1);
            self.mark_cell(index as u32);
        }
        true
    }

    fn mark_bytes(&mut self, range: Range<usize>) {
        self.dirty.voxels = Some(match self.dirty.voxels.take() {
            Some(r) => r.start.min(range.start)..r.end.max(range.end),
            None => range,
        });
    }

    fn mark_cell(&mut self, index: u32) {
        self.dirty.cells.push(index);
    }

    /// Returns true if anything changed since the last drain
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Peek at the pending dirty state.
    pub fn dirty(&self) -> &SubmeshDirty {
        &self.dirty
    }

    /// Drain the pending dirty state.
    pub fn take_dirty(&mut self) -> SubmeshDirty {
        let mut dirty = std::mem::take(&mut self.dirty);
        dirty.cells.sort_unstable();
        dirty.cells.dedup();
        dirty
    }

    /// Give up the grid's color buffer (for recycling).
    pub fn take_buffer(&mut self) -> Vec<ColorIndex> {
        self.dirty = SubmeshDirty::default();
        self.grid.take_buffer()
    }
}

/// A voxel model asset: grids plus the palette they index.
///
/// Not `Clone`: the identity keys GPU allocations and must stay unique.
#[derive(Debug)]
pub struct VoxelMesh {
    id: MeshId,
    submeshes: Vec<Submesh>,
    palette: Palette,
    palette_dirty: bool,
}

impl VoxelMesh {
    /// Create a mesh with a fresh identity.
    pub fn new(palette: Palette, submeshes: Vec<Submesh>) -> Self {
        Self {
            id: MeshId::next(),
            submeshes,
            palette,
            palette_dirty: false,
        }
    }

    /// Create a single-grid mesh.
    pub fn from_grid(palette: Palette, grid: VoxelGrid) -> Self {
        Self::new(palette, vec![Submesh::new(grid)])
    }

    /// Asset identity
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// All submeshes
    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    /// Mutable submesh access for edits
    pub fn submesh_mut(&mut self, index: usize) -> Option<&mut Submesh> {
        self.submeshes.get_mut(index)
    }

    /// The palette
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Change a palette entry. Returns true if the color changed.
    pub fn set_palette_color(&mut self, index: ColorIndex, color: Rgba8) -> bool {
        let changed = self.palette.set(index, color);
        self.palette_dirty |= changed;
        changed
    }

    /// Returns true if the palette changed since the last drain
    pub fn palette_dirty(&self) -> bool {
        self.palette_dirty
    }

    /// Drain the palette dirty flag.
    pub fn take_palette_dirty(&mut self) -> bool {
        std::mem::take(&mut self.palette_dirty)
    }

    /// Drain every submesh's dirty state, in submesh order.
    pub fn take_submesh_dirty(&mut self) -> Vec<SubmeshDirty> {
        self.submeshes.iter_mut().map(Submesh::take_dirty).collect()
    }

    /// Total color bytes across submeshes.
    pub fn voxel_bytes(&self) -> usize {
        self.submeshes
            .iter()
            .map(|s| s.grid.color_indices().len())
            .sum()
    }

    /// Total compressed cells across submeshes.
    pub fn cell_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.grid.cells().len()).sum()
    }

    /// Mesh-local bounds of all submeshes.
    pub fn bounds(&self) -> Aabb {
        self.submeshes
            .iter()
            .map(Submesh::bounds)
            .reduce(|a, b| a.merge(&b))
            .unwrap_or_default()
    }

    /// Give up every submesh color buffer (for recycling).
    pub fn take_buffers(&mut self) -> Vec<Vec<ColorIndex>> {
        self.submeshes
            .iter_mut()
            .map(Submesh::take_buffer)
            .filter(|b| b.capacity() > 0)
            .collect()
    }
}

/// Lookup of mesh assets by identity.
pub trait MeshStore {
    /// Shared access to a mesh.
    fn mesh(&self, id: MeshId) -> Option<&VoxelMesh>;
    /// Exclusive access to a mesh, used to drain dirty state after upload.
    fn mesh_mut(&mut self, id: MeshId) -> Option<&mut VoxelMesh>;
}

impl MeshStore for HashMap<MeshId, VoxelMesh> {
    fn mesh(&self, id: MeshId) -> Option<&VoxelMesh> {
        self.get(&id)
    }

    fn mesh_mut(&mut self, id: MeshId) -> Option<&mut VoxelMesh> {
        self.get_mut(&id)
    }
}
