//! Spatial acceleration structures rebuilt every frame over visible models.
//!
//! - [`Bvh`]: bottom-up pairwise-merge bounding volume hierarchy
//! - [`UniformGrid`]: bucket grid of payload indices

pub mod bvh;
pub mod uniform_grid;

pub use bvh::{Bvh, BvhNode};
pub use uniform_grid::UniformGrid;
