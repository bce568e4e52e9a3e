//! Uniform-block compression of voxel grids.
//!
//! A grid compressed at `scale` is split into `scale³` blocks. Blocks whose
//! voxels all share one color are stored as a single byte; every other block
//! is stored verbatim in block-local order `x + scale * (y + scale * z)`.
//! Colors survive exactly; only the repetition inside uniform blocks is lost.

use voxelgrove_core::{ColorIndex, Error, Result};

use crate::grid::{CellTable, CompressedCell, VoxelGrid};

/// Check whether the `scale³` block with minimum corner `(bx, by, bz)` of a
/// dense grid holds a single color. Voxels outside the grid read as empty.
pub fn is_block_uniform(grid: &VoxelGrid, bx: u32, by: u32, bz: u32, scale: u32) -> bool {
    let first = grid.sample_dense(bx, by, bz);
    for z in bz..bz + scale {
        for y in by..by + scale {
            for x in bx..bx + scale {
                if grid.sample_dense(x, y, z) != first {
                    return false;
                }
            }
        }
    }
    true
}

impl VoxelGrid {
    /// Compress in place at the given block scale.
    ///
    /// Returns the number of bytes saved, which is negative when the grid has
    /// almost no uniform blocks.
    pub fn compress(&mut self, scale: u32) -> Result<i64> {
        let (saved, _dense) = self.compress_into(scale, Vec::new())?;
        Ok(saved)
    }

    /// Compress into `out`, returning the bytes saved and the previous dense
    /// buffer so the caller can recycle it.
    pub fn compress_into(
        &mut self,
        scale: u32,
        mut out: Vec<ColorIndex>,
    ) -> Result<(i64, Vec<ColorIndex>)> {
        if scale == 0 {
            return Err(Error::InvalidData("compression scale must be > 0".into()));
        }
        if self.is_compressed() {
            return Err(Error::InvalidData("grid is already compressed".into()));
        }

        let cw = self.width.div_ceil(scale);
        let ch = self.height.div_ceil(scale);
        let cd = self.depth.div_ceil(scale);
        let block_voxels = scale * scale * scale;

        out.clear();
        let mut cells = Vec::with_capacity(cw as usize * ch as usize * cd as usize);

        for cz in 0..cd {
            for cy in 0..ch {
                for cx in 0..cw {
                    let (bx, by, bz) = (cx * scale, cy * scale, cz * scale);
                    let voxel_offset = out.len() as u32;
                    if is_block_uniform(self, bx, by, bz, scale) {
                        out.push(self.sample_dense(bx, by, bz));
                        cells.push(CompressedCell {
                            voxel_count: 1,
                            voxel_offset,
                        });
                    } else {
                        for lz in 0..scale {
                            for ly in 0..scale {
                                for lx in 0..scale {
                                    out.push(self.sample_dense(bx + lx, by + ly, bz + lz));
                                }
                            }
                        }
                        cells.push(CompressedCell {
                            voxel_count: block_voxels,
                            voxel_offset,
                        });
                    }
                }
            }
        }

        let saved = self.color_indices.len() as i64 - out.len() as i64;
        let dense = std::mem::replace(&mut self.color_indices, out);
        self.width = cw;
        self.height = ch;
        self.depth = cd;
        self.voxel_size *= scale as f32;
        self.compression = Some(CellTable {
            scale,
            cells,
            free_slots: Vec::new(),
        });

        tracing::trace!(scale, saved, cells = cw * ch * cd, "compressed voxel grid");
        Ok((saved, dense))
    }

    /// Expand uniform cell `(cx, cy, cz)` into `scale³` literal voxels.
    ///
    /// The expanded block is appended to the color buffer and the old
    /// single-byte slot goes on the free list; nothing is compacted. Returns
    /// `false` if the grid is dense, the cell is out of range, or the cell is
    /// already decompressed.
    pub fn decompress_cell(&mut self, cx: u32, cy: u32, cz: u32) -> bool {
        let Some(index) = self.cell_index(cx, cy, cz) else {
            return false;
        };
        let Some(table) = self.compression.as_mut() else {
            return false;
        };
        let cell = table.cells[index];
        if !cell.is_uniform() {
            return false;
        }

        let color = self.color_indices[cell.voxel_offset as usize];
        let block_voxels = table.scale * table.scale * table.scale;
        let voxel_offset = self.color_indices.len() as u32;
        self.color_indices
            .resize(self.color_indices.len() + block_voxels as usize, color);

        table.free_slots.push(cell.voxel_offset);
        table.cells[index] = CompressedCell {
            voxel_count: block_voxels,
            voxel_offset,
        };
        true
    }

    /// Collapse a literal cell whose voxels became uniform back to one byte.
    ///
    /// The byte is taken from the free list when possible; the literal
    /// block's bytes are released to the free list. Returns `false` if the
    /// cell is uniform already or still holds several colors.
    pub fn recompress_cell(&mut self, cx: u32, cy: u32, cz: u32) -> bool {
        let Some(index) = self.cell_index(cx, cy, cz) else {
            return false;
        };
        let Some(table) = self.compression.as_mut() else {
            return false;
        };
        let cell = table.cells[index];
        if cell.is_uniform() {
            return false;
        }

        let start = cell.voxel_offset as usize;
        let block = &self.color_indices[start..start + cell.voxel_count as usize];
        let color = block[0];
        if block.iter().any(|&c| c != color) {
            return false;
        }

        let slot = table.free_slots.pop().unwrap_or(cell.voxel_offset);
        table
            .free_slots
            .extend((cell.voxel_offset..cell.voxel_offset + cell.voxel_count).filter(|&s| s != slot));
        self.color_indices[slot as usize] = color;
        table.cells[index] = CompressedCell {
            voxel_count: 1,
            voxel_offset: slot,
        };
        true
    }

    /// Expand a compressed grid into a dense copy.
    ///
    /// Dense grids are returned as a plain clone. Dimensions are whole cells,
    /// so a grid compressed from a size that is not a multiple of the scale
    /// comes back padded with empty voxels.
    pub fn decompressed(&self) -> VoxelGrid {
        let Some(table) = &self.compression else {
            return self.clone();
        };
        let s = table.scale;
        let dims = self.voxel_dims();
        let mut dense = VoxelGrid::new(dims.x, dims.y, dims.z, self.voxel_size / s as f32);
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    if let Some(color) = self.voxel(x, y, z) {
                        let i = dense.linear_index(x, y, z);
                        dense.color_indices[i] = color;
                    }
                }
            }
        }
        dense
    }
}
