//! GPU-side bookkeeping for visible voxel meshes.
//!
//! This crate provides:
//! - Byte-range allocation inside fixed storage buffers
//! - A frame-to-frame cache of mesh allocations with dirty-range uploads
//! - Front-to-back visibility ordering of models
//! - Camera and view management

pub mod camera;
pub mod error;
pub mod mesh_cache;
pub mod range_allocator;
pub mod upload;
pub mod visibility;

pub use camera::Camera;
pub use error::{AllocError, Result};
pub use mesh_cache::{
    FrameAllocations, MeshAllocation, MeshAllocationCache, MeshBindings, MeshCacheConfig,
    SubmeshOffsets, UploadStats, VisibleModel,
};
pub use range_allocator::{AllocationFlags, ByteRange, ByteRangeAllocator, FreeListAllocator, ALIGNMENT};
pub use upload::{BindingTraffic, BufferBinding, CountingWriter, StorageBufferWriter};
pub use visibility::{bucket_visible, order_visible};
