//! The different kinds of voxel sources behind one capability surface.

use glam::{UVec3, Vec3};
use voxelgrove_core::{Aabb, ColorIndex, Error, Result};

use crate::grid::VoxelGrid;

/// A seeded voxel volume that has not been filled yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProceduralShape {
    pub dims: UVec3,
    pub voxel_size: f32,
    pub seed: u64,
}

/// Source of voxel data.
#[derive(Clone, Debug, PartialEq)]
pub enum VoxelShape {
    /// Dense grid, one byte per voxel.
    Raw(VoxelGrid),
    /// Block-compressed grid.
    Compressed(VoxelGrid),
    /// Not yet materialized; holds no color bytes.
    Procedural(ProceduralShape),
}

impl VoxelShape {
    /// Wrap a grid in the matching variant.
    pub fn from_grid(grid: VoxelGrid) -> Self {
        if grid.is_compressed() {
            Self::Compressed(grid)
        } else {
            Self::Raw(grid)
        }
    }

    /// Local-space bounds, minimum corner at the origin.
    pub fn bounds(&self) -> Aabb {
        match self {
            Self::Raw(grid) | Self::Compressed(grid) => grid.bounds(),
            Self::Procedural(p) => Aabb::new(Vec3::ZERO, p.dims.as_vec3() * p.voxel_size),
        }
    }

    /// Bytes of color data this source contributes to an upload.
    pub fn voxel_count(&self) -> usize {
        match self {
            Self::Raw(grid) | Self::Compressed(grid) => grid.color_indices().len(),
            Self::Procedural(_) => 0,
        }
    }

    /// The grid, when the data exists.
    pub fn grid(&self) -> Option<&VoxelGrid> {
        match self {
            Self::Raw(grid) | Self::Compressed(grid) => Some(grid),
            Self::Procedural(_) => None,
        }
    }

    /// Turn a procedural source into a grid, compressed at `scale` if given.
    ///
    /// `sample` is called once per voxel in raster order with the voxel
    /// position and the shape's seed. Grid variants are returned unchanged.
    pub fn materialize(
        self,
        scale: Option<u32>,
        mut sample: impl FnMut(UVec3, u64) -> ColorIndex,
    ) -> Result<Self> {
        let Self::Procedural(p) = self else {
            return Ok(self);
        };
        if p.dims.cmpeq(UVec3::ZERO).any() {
            return Err(Error::InvalidData(format!(
                "procedural shape has empty dimensions {}",
                p.dims
            )));
        }
        let mut grid = VoxelGrid::new(p.dims.x, p.dims.y, p.dims.z, p.voxel_size);
        for z in 0..p.dims.z {
            for y in 0..p.dims.y {
                for x in 0..p.dims.x {
                    let index = grid.linear_index(x, y, z);
                    grid.color_indices[index] = sample(UVec3::new(x, y, z), p.seed);
                }
            }
        }
        if let Some(scale) = scale {
            grid.compress(scale)?;
        }
        Ok(Self::from_grid(grid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crate_shape() -> VoxelShape {
        VoxelShape::Procedural(ProceduralShape {
            dims: UVec3::new(8, 4, 8),
            voxel_size: 0.5,
            seed: 3,
        })
    }

    fn seed_fill(_: UVec3, seed: u64) -> ColorIndex {
        seed as ColorIndex
    }

    #[test]
    fn procedural_has_bounds_but_no_bytes() {
        let shape = crate_shape();
        assert_eq!(shape.bounds().max, Vec3::new(4.0, 2.0, 4.0));
        assert_eq!(shape.voxel_count(), 0);
        assert!(shape.grid().is_none());
    }

    #[test]
    fn materialize_compressed_keeps_bounds() {
        let bounds = crate_shape().bounds();
        let shape = crate_shape().materialize(Some(4), seed_fill).unwrap();
        assert!(matches!(shape, VoxelShape::Compressed(_)));
        assert_eq!(shape.bounds(), bounds);
        // Two uniform 4³ cells, one byte each.
        assert_eq!(shape.voxel_count(), 2 * 1 * 2);
    }

    #[test]
    fn materialize_raw() {
        let shape = crate_shape().materialize(None, seed_fill).unwrap();
        let VoxelShape::Raw(grid) = &shape else {
            panic!("expected raw grid");
        };
        assert_eq!(grid.voxel(7, 3, 7), Some(3));
        assert_eq!(shape.voxel_count(), 256);
    }

    #[test]
    fn empty_procedural_is_rejected() {
        let shape = VoxelShape::Procedural(ProceduralShape {
            dims: UVec3::new(0, 1, 1),
            voxel_size: 1.0,
            seed: 1,
        });
        assert!(shape.materialize(None, seed_fill).is_err());
    }

    #[test]
    fn sampler_sees_every_position() {
        let shape = crate_shape()
            .materialize(None, |p, _| u8::from(p.y < 2))
            .unwrap();
        let grid = shape.grid().unwrap();
        assert_eq!(grid.voxel(0, 1, 0), Some(1));
        assert_eq!(grid.voxel(0, 2, 0), Some(0));
        assert_eq!(grid.color_indices().iter().filter(|&&c| c == 1).count(), 128);
    }
}
