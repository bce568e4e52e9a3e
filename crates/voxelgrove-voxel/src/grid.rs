//! Dense voxel grids with an optional block-compression cell table.

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};
use voxelgrove_core::{Aabb, ColorIndex, Error, Result, EMPTY_COLOR};

/// One compressed block of `scale³` voxels.
///
/// `voxel_count == 1` means the block is a single color stored once at
/// `voxel_offset`. Any other count (always `scale³`) means the block is stored
/// voxel-by-voxel starting at `voxel_offset`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct CompressedCell {
    pub voxel_count: u32,
    pub voxel_offset: u32,
}

impl CompressedCell {
    /// Returns true if the block collapsed to one color
    #[inline]
    pub const fn is_uniform(&self) -> bool {
        self.voxel_count == 1
    }
}

/// Cell table of a compressed grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellTable {
    pub(crate) scale: u32,
    pub(crate) cells: Vec<CompressedCell>,
    /// Single-byte slots orphaned by cell decompression, available for reuse.
    pub(crate) free_slots: Vec<u32>,
}

impl CellTable {
    /// Block edge length in voxels.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Voxels per non-uniform block.
    pub fn block_voxels(&self) -> u32 {
        self.scale * self.scale * self.scale
    }

    /// Cells in raster order `cx + cw * (cy + ch * cz)`.
    pub fn cells(&self) -> &[CompressedCell] {
        &self.cells
    }

    /// Orphaned byte slots in the color buffer.
    pub fn free_slots(&self) -> &[u32] {
        &self.free_slots
    }
}

/// A `width × height × depth` grid of palette indices.
///
/// When compressed, `width/height/depth` count cells rather than voxels and
/// `voxel_size` is the cell edge length.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) voxel_size: f32,
    pub(crate) color_indices: Vec<ColorIndex>,
    pub(crate) compression: Option<CellTable>,
}

impl VoxelGrid {
    /// Create an empty (all zero) grid.
    pub fn new(width: u32, height: u32, depth: u32, voxel_size: f32) -> Self {
        Self::with_buffer(width, height, depth, voxel_size, Vec::new())
    }

    /// Create an empty grid reusing `buffer`'s allocation.
    pub fn with_buffer(
        width: u32,
        height: u32,
        depth: u32,
        voxel_size: f32,
        mut buffer: Vec<ColorIndex>,
    ) -> Self {
        let len = width as usize * height as usize * depth as usize;
        buffer.clear();
        buffer.resize(len, EMPTY_COLOR);
        Self {
            width,
            height,
            depth,
            voxel_size,
            color_indices: buffer,
            compression: None,
        }
    }

    /// Wrap existing dense color indices.
    pub fn from_indices(
        width: u32,
        height: u32,
        depth: u32,
        voxel_size: f32,
        color_indices: Vec<ColorIndex>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * depth as usize;
        if color_indices.len() != expected {
            return Err(Error::InvalidData(format!(
                "grid {width}x{height}x{depth} needs {expected} voxels, got {}",
                color_indices.len()
            )));
        }
        Ok(Self {
            width,
            height,
            depth,
            voxel_size,
            color_indices,
            compression: None,
        })
    }

    /// Grid width (cells when compressed)
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height (cells when compressed)
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Grid depth (cells when compressed)
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Grid dimensions (cells when compressed)
    #[inline]
    pub fn dims(&self) -> UVec3 {
        UVec3::new(self.width, self.height, self.depth)
    }

    /// Edge length of one grid unit (a cell when compressed).
    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Block scale, 1 for dense grids.
    #[inline]
    pub fn scale(&self) -> u32 {
        self.compression.as_ref().map_or(1, |c| c.scale)
    }

    /// Dimensions in individual voxels.
    #[inline]
    pub fn voxel_dims(&self) -> UVec3 {
        self.dims() * self.scale()
    }

    /// Edge length of an individual voxel.
    #[inline]
    pub fn fine_voxel_size(&self) -> f32 {
        self.voxel_size / self.scale() as f32
    }

    /// Raw color bytes (block-ordered when compressed).
    #[inline]
    pub fn color_indices(&self) -> &[ColorIndex] {
        &self.color_indices
    }

    /// Returns true if the grid carries a cell table
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// The cell table, if compressed
    #[inline]
    pub fn cell_table(&self) -> Option<&CellTable> {
        self.compression.as_ref()
    }

    /// Cells of a compressed grid, empty for dense grids.
    #[inline]
    pub fn cells(&self) -> &[CompressedCell] {
        self.compression
            .as_ref()
            .map_or(&[][..], |c| c.cells.as_slice())
    }

    /// Local-space bounds, minimum corner at the origin.
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec3::ZERO, self.dims().as_vec3() * self.voxel_size)
    }

    /// Returns true if every byte is the empty color
    pub fn is_empty(&self) -> bool {
        self.color_indices.iter().all(|&c| c == EMPTY_COLOR)
    }

    /// Give up the color buffer (for recycling). The grid is left with no voxels.
    pub fn take_buffer(&mut self) -> Vec<ColorIndex> {
        self.width = 0;
        self.height = 0;
        self.depth = 0;
        self.compression = None;
        std::mem::take(&mut self.color_indices)
    }

    /// Index of cell `(cx, cy, cz)` in the cell table.
    #[inline]
    pub fn cell_index(&self, cx: u32, cy: u32, cz: u32) -> Option<usize> {
        if !self.is_compressed() || cx >= self.width || cy >= self.height || cz >= self.depth {
            return None;
        }
        Some(self.linear_index(cx, cy, cz))
    }

    #[inline]
    pub(crate) fn linear_index(&self, x: u32, y: u32, z: u32) -> usize {
        x as usize + self.width as usize * (y as usize + self.height as usize * z as usize)
    }

    /// Byte offset into `color_indices` holding voxel `(x, y, z)`.
    ///
    /// Coordinates are in individual voxels. Uniform cells resolve every voxel
    /// to the same byte.
    pub fn resolve(&self, x: u32, y: u32, z: u32) -> Option<usize> {
        match &self.compression {
            None => {
                if x >= self.width || y >= self.height || z >= self.depth {
                    return None;
                }
                Some(self.linear_index(x, y, z))
            }
            Some(table) => {
                let s = table.scale;
                let (cx, cy, cz) = (x / s, y / s, z / s);
                if cx >= self.width || cy >= self.height || cz >= self.depth {
                    return None;
                }
                let cell = table.cells[self.linear_index(cx, cy, cz)];
                if cell.is_uniform() {
                    Some(cell.voxel_offset as usize)
                } else {
                    let (lx, ly, lz) = (x % s, y % s, z % s);
                    let local = lx + s * (ly + s * lz);
                    Some(cell.voxel_offset as usize + local as usize)
                }
            }
        }
    }

    /// Color of voxel `(x, y, z)`, `None` when out of bounds.
    #[inline]
    pub fn voxel(&self, x: u32, y: u32, z: u32) -> Option<ColorIndex> {
        self.resolve(x, y, z).map(|i| self.color_indices[i])
    }

    /// Dense read used during compression; out-of-range reads as empty.
    #[inline]
    pub(crate) fn sample_dense(&self, x: u32, y: u32, z: u32) -> ColorIndex {
        if x >= self.width || y >= self.height || z >= self.depth {
            EMPTY_COLOR
        } else {
            self.color_indices[self.linear_index(x, y, z)]
        }
    }

    /// Write one voxel.
    ///
    /// A uniform cell receiving a different color is decompressed first.
    /// Returns the byte offset written, or `None` when out of bounds or when
    /// the voxel already had that color.
    pub fn set_voxel(&mut self, x: u32, y: u32, z: u32, color: ColorIndex) -> Option<usize> {
        self.write_voxel(x, y, z, color).map(|write| write.index)
    }

    /// Like [`VoxelGrid::set_voxel`], also reporting the cell expanded on the
    /// way.
    pub fn write_voxel(&mut self, x: u32, y: u32, z: u32, color: ColorIndex) -> Option<VoxelWrite> {
        let index = self.resolve(x, y, z)?;
        if self.color_indices[index] == color {
            return None;
        }
        let mut write = VoxelWrite {
            index,
            decompressed_cell: None,
        };
        if let Some(s) = self.compression.as_ref().map(|t| t.scale) {
            let (cx, cy, cz) = (x / s, y / s, z / s);
            if self.decompress_cell(cx, cy, cz) {
                write.index = self.resolve(x, y, z)?;
                write.decompressed_cell = self.cell_index(cx, cy, cz);
            }
        }
        self.color_indices[write.index] = color;
        Some(write)
    }

    /// Mutable access for generators filling a dense grid.
    ///
    /// Returns `None` for compressed grids, whose byte layout is block-ordered.
    pub fn dense_mut(&mut self) -> Option<&mut [ColorIndex]> {
        if self.is_compressed() {
            None
        } else {
            Some(&mut self.color_indices)
        }
    }
}

/// Outcome of [`VoxelGrid::write_voxel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxelWrite {
    /// Byte offset written.
    pub index: usize,
    /// Cell that was expanded from uniform to literal first, if any.
    pub decompressed_cell: Option<usize>,
}
