//! Frame-to-frame cache of GPU buffer ranges for visible voxel meshes.
//!
//! Each mesh owns three ranges: its color bytes, its palette and its cell
//! table. A mesh visible in consecutive frames keeps its ranges and only the
//! bytes it marked dirty are written again. Ranges of meshes that were not
//! visible in a frame are freed at the end of that frame.

use std::borrow::Cow;

use glam::Mat4;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use voxelgrove_core::Aabb;
use voxelgrove_voxel::{CompressedCell, MeshId, MeshStore, SubmeshDirty, VoxelMesh};

use crate::error::Result;
use crate::range_allocator::{AllocationFlags, ByteRange, ByteRangeAllocator, FreeListAllocator};
use crate::upload::{BufferBinding, StorageBufferWriter};

const VOXELS: usize = 0;
const PALETTE: usize = 1;
const CELLS: usize = 2;

/// Bytes per cell on the GPU: two little-endian `u32`s.
const CELL_BYTES: u64 = std::mem::size_of::<CompressedCell>() as u64;

/// Storage buffers the three mesh regions live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshBindings {
    pub voxels: BufferBinding,
    pub palette: BufferBinding,
    pub cells: BufferBinding,
}

impl Default for MeshBindings {
    fn default() -> Self {
        Self {
            voxels: BufferBinding::new(0, 0),
            palette: BufferBinding::new(0, 1),
            cells: BufferBinding::new(0, 2),
        }
    }
}

/// Buffer sizes and bindings for a [`MeshAllocationCache`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshCacheConfig {
    /// Bytes in the color-index buffer.
    pub voxel_capacity: u64,
    /// Bytes in the palette buffer.
    pub palette_capacity: u64,
    /// Bytes in the cell-table buffer.
    pub cell_capacity: u64,
    pub bindings: MeshBindings,
}

impl Default for MeshCacheConfig {
    fn default() -> Self {
        Self {
            voxel_capacity: 64 << 20,
            palette_capacity: 1 << 20,
            cell_capacity: 16 << 20,
            bindings: MeshBindings::default(),
        }
    }
}

/// Where one submesh starts inside its mesh's regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmeshOffsets {
    pub voxel_offset: u64,
    pub cell_offset: u64,
}

/// The ranges one mesh occupies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshAllocation {
    pub voxel_range: ByteRange,
    pub palette_range: ByteRange,
    pub cell_range: ByteRange,
    pub submesh_offsets: Vec<SubmeshOffsets>,
    /// Unaligned byte counts the ranges were sized for.
    sizes: [u64; 3],
}

impl MeshAllocation {
    fn ranges(&self) -> [ByteRange; 3] {
        [self.voxel_range, self.palette_range, self.cell_range]
    }
}

/// A mesh instance to draw this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleModel {
    pub mesh: MeshId,
    pub transform: Mat4,
    /// World-space bounds.
    pub bounds: Aabb,
}

impl VisibleModel {
    /// Place `mesh` with `transform`.
    pub fn new(mesh: &VoxelMesh, transform: Mat4) -> Self {
        Self {
            mesh: mesh.id(),
            transform,
            bounds: mesh.bounds().transformed(transform),
        }
    }
}

/// Counters for one [`MeshAllocationCache::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Meshes that kept last frame's ranges.
    pub hits: usize,
    /// Meshes allocated this frame.
    pub misses: usize,
    /// Meshes left out because a buffer was full.
    pub skipped: usize,
    /// Models whose mesh was not in the store.
    pub missing: usize,
    /// Meshes whose ranges were released.
    pub freed: usize,
    /// Regions written in full.
    pub full_uploads: usize,
    /// Writes covering only changed bytes.
    pub partial_uploads: usize,
    pub bytes_uploaded: u64,
}

/// Result of one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameAllocations {
    /// Indices into the model list that have ranges, in input order.
    pub drawn: Vec<usize>,
    pub stats: UploadStats,
}

/// Sizes and submesh offsets a mesh needs right now.
struct Layout {
    sizes: [u64; 3],
    offsets: Vec<SubmeshOffsets>,
}

impl Layout {
    fn of(mesh: &VoxelMesh) -> Self {
        let mut voxels = 0u64;
        let mut cells = 0u64;
        let mut offsets = Vec::with_capacity(mesh.submeshes().len());
        for submesh in mesh.submeshes() {
            offsets.push(SubmeshOffsets {
                voxel_offset: voxels,
                cell_offset: cells,
            });
            // Keep every submesh word-aligned.
            voxels += (submesh.grid().color_indices().len() as u64).next_multiple_of(4);
            cells += submesh.grid().cells().len() as u64 * CELL_BYTES;
        }
        Self {
            sizes: [voxels, mesh.palette().as_bytes().len() as u64, cells],
            offsets,
        }
    }
}

fn cell_bytes(cells: &[CompressedCell]) -> Cow<'_, [u8]> {
    if cfg!(target_endian = "little") {
        Cow::Borrowed(bytemuck::cast_slice(cells))
    } else {
        Cow::Owned(
            cells
                .iter()
                .flat_map(|c| [c.voxel_count.to_le_bytes(), c.voxel_offset.to_le_bytes()])
                .flatten()
                .collect(),
        )
    }
}

/// Runs of consecutive indices in a sorted list, as half-open ranges.
fn runs(indices: &[u32]) -> Vec<std::ops::Range<usize>> {
    let mut out: Vec<std::ops::Range<usize>> = Vec::new();
    for &i in indices {
        let i = i as usize;
        match out.last_mut() {
            Some(run) if run.end == i => run.end += 1,
            _ => out.push(i..i + 1),
        }
    }
    out
}

/// Caches mesh buffer ranges across frames.
pub struct MeshAllocationCache<A = FreeListAllocator> {
    allocators: [A; 3],
    bindings: [BufferBinding; 3],
    current: HashMap<MeshId, MeshAllocation>,
    frame: u64,
}

impl MeshAllocationCache<FreeListAllocator> {
    /// Create a cache over free-list allocators sized by `config`.
    pub fn new(config: &MeshCacheConfig) -> Self {
        Self::with_allocators(
            config.bindings,
            FreeListAllocator::new(config.voxel_capacity),
            FreeListAllocator::new(config.palette_capacity),
            FreeListAllocator::new(config.cell_capacity),
        )
    }
}

impl<A: ByteRangeAllocator> MeshAllocationCache<A> {
    /// Create a cache over caller-provided allocators.
    pub fn with_allocators(bindings: MeshBindings, voxels: A, palette: A, cells: A) -> Self {
        Self {
            allocators: [voxels, palette, cells],
            bindings: [bindings.voxels, bindings.palette, bindings.cells],
            current: HashMap::new(),
            frame: 0,
        }
    }

    /// Ranges of a mesh drawn last frame
    pub fn allocation(&self, mesh: MeshId) -> Option<&MeshAllocation> {
        self.current.get(&mesh)
    }

    /// Number of meshes holding ranges
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Frames processed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn voxel_allocator(&self) -> &A {
        &self.allocators[VOXELS]
    }

    pub fn palette_allocator(&self) -> &A {
        &self.allocators[PALETTE]
    }

    pub fn cell_allocator(&self) -> &A {
        &self.allocators[CELLS]
    }

    /// Release every range.
    pub fn clear(&mut self) {
        let entries: Vec<MeshAllocation> = self.current.drain().map(|(_, a)| a).collect();
        for allocation in entries {
            self.free_ranges(&allocation.ranges());
        }
    }

    /// Bring buffer ranges in line with this frame's models.
    ///
    /// Meshes are processed in model order; a mesh listed more than once is
    /// handled once. Dirty state of every processed mesh is drained.
    pub fn update<S, W>(
        &mut self,
        models: &[VisibleModel],
        store: &mut S,
        writer: &mut W,
    ) -> FrameAllocations
    where
        S: MeshStore + ?Sized,
        W: StorageBufferWriter + ?Sized,
    {
        let _span = tracing::debug_span!("mesh_cache_update", frame = self.frame).entered();
        self.frame += 1;

        let mut previous = std::mem::take(&mut self.current);
        let mut out = FrameAllocations::default();
        let mut visited = HashSet::with_capacity(models.len());

        for (index, model) in models.iter().enumerate() {
            let id = model.mesh;
            if !visited.insert(id) {
                if self.current.contains_key(&id) {
                    out.drawn.push(index);
                }
                continue;
            }
            let Some(mesh) = store.mesh_mut(id) else {
                out.stats.missing += 1;
                debug!(mesh = id.0, "visible mesh is not in the store");
                continue;
            };

            let result = match previous.remove(&id) {
                Some(cached) => {
                    out.stats.hits += 1;
                    self.refresh(cached, mesh, writer, &mut out.stats)
                }
                None => {
                    out.stats.misses += 1;
                    self.allocate_fresh(mesh, writer, &mut out.stats)
                }
            };
            match result {
                Ok(allocation) => {
                    self.current.insert(id, allocation);
                    out.drawn.push(index);
                }
                Err(err) => {
                    out.stats.skipped += 1;
                    debug!(mesh = id.0, %err, "mesh skipped this frame");
                }
            }
        }

        for (_, stale) in previous.drain() {
            self.free_ranges(&stale.ranges());
            out.stats.freed += 1;
        }

        trace!(
            hits = out.stats.hits,
            misses = out.stats.misses,
            freed = out.stats.freed,
            bytes = out.stats.bytes_uploaded,
            "mesh allocations updated"
        );
        out
    }

    fn free_ranges(&mut self, ranges: &[ByteRange; 3]) {
        for (allocator, range) in self.allocators.iter_mut().zip(ranges) {
            allocator.free(*range);
        }
    }

    fn allocate_fresh<W: StorageBufferWriter + ?Sized>(
        &mut self,
        mesh: &mut VoxelMesh,
        writer: &mut W,
        stats: &mut UploadStats,
    ) -> Result<MeshAllocation> {
        let layout = Layout::of(mesh);
        let mut ranges = [ByteRange::EMPTY; 3];
        for region in [VOXELS, PALETTE, CELLS] {
            match self.allocators[region].allocate(layout.sizes[region]) {
                Ok(range) => ranges[region] = range,
                Err(err) => {
                    self.free_ranges(&ranges);
                    return Err(err);
                }
            }
        }

        // A full upload supersedes whatever was pending.
        mesh.take_palette_dirty();
        mesh.take_submesh_dirty();

        let allocation = MeshAllocation {
            voxel_range: ranges[VOXELS],
            palette_range: ranges[PALETTE],
            cell_range: ranges[CELLS],
            submesh_offsets: layout.offsets,
            sizes: layout.sizes,
        };
        self.write_voxels(&allocation, mesh, writer, stats);
        self.write_palette(&allocation, mesh, writer, stats);
        self.write_cells(&allocation, mesh, writer, stats);
        Ok(allocation)
    }

    fn refresh<W: StorageBufferWriter + ?Sized>(
        &mut self,
        cached: MeshAllocation,
        mesh: &mut VoxelMesh,
        writer: &mut W,
        stats: &mut UploadStats,
    ) -> Result<MeshAllocation> {
        let layout = Layout::of(mesh);
        let mut ranges = cached.ranges();
        let mut full = [false; 3];

        for region in [VOXELS, PALETTE, CELLS] {
            if cached.sizes[region] == layout.sizes[region] {
                continue;
            }
            match self.allocators[region].resize(ranges[region], layout.sizes[region]) {
                Ok((range, flags)) => {
                    ranges[region] = range;
                    full[region] = flags.contains(AllocationFlags::REALLOCATED);
                }
                Err(err) => {
                    self.free_ranges(&ranges);
                    return Err(err);
                }
            }
        }

        // Submeshes after a resized one moved inside the region.
        let relayout = cached.submesh_offsets != layout.offsets;
        full[VOXELS] |= relayout;
        full[CELLS] |= relayout;
        full[PALETTE] |= mesh.take_palette_dirty();
        let dirty = mesh.take_submesh_dirty();

        let allocation = MeshAllocation {
            voxel_range: ranges[VOXELS],
            palette_range: ranges[PALETTE],
            cell_range: ranges[CELLS],
            submesh_offsets: layout.offsets,
            sizes: layout.sizes,
        };

        if full[VOXELS] {
            self.write_voxels(&allocation, mesh, writer, stats);
        } else {
            self.write_dirty_voxels(&allocation, mesh, &dirty, writer, stats);
        }
        if full[PALETTE] {
            self.write_palette(&allocation, mesh, writer, stats);
        }
        if full[CELLS] {
            self.write_cells(&allocation, mesh, writer, stats);
        } else {
            self.write_dirty_cells(&allocation, mesh, &dirty, writer, stats);
        }
        Ok(allocation)
    }

    fn write_voxels<W: StorageBufferWriter + ?Sized>(
        &self,
        allocation: &MeshAllocation,
        mesh: &VoxelMesh,
        writer: &mut W,
        stats: &mut UploadStats,
    ) {
        for (submesh, offsets) in mesh.submeshes().iter().zip(&allocation.submesh_offsets) {
            let bytes = submesh.grid().color_indices();
            if bytes.is_empty() {
                continue;
            }
            let offset = allocation.voxel_range.offset + offsets.voxel_offset;
            writer.write(self.bindings[VOXELS], offset, bytes);
            stats.bytes_uploaded += bytes.len() as u64;
        }
        stats.full_uploads += 1;
    }

    fn write_palette<W: StorageBufferWriter + ?Sized>(
        &self,
        allocation: &MeshAllocation,
        mesh: &VoxelMesh,
        writer: &mut W,
        stats: &mut UploadStats,
    ) {
        let bytes = mesh.palette().as_bytes();
        if !bytes.is_empty() {
            writer.write(self.bindings[PALETTE], allocation.palette_range.offset, bytes);
            stats.bytes_uploaded += bytes.len() as u64;
        }
        stats.full_uploads += 1;
    }

    fn write_cells<W: StorageBufferWriter + ?Sized>(
        &self,
        allocation: &MeshAllocation,
        mesh: &VoxelMesh,
        writer: &mut W,
        stats: &mut UploadStats,
    ) {
        for (submesh, offsets) in mesh.submeshes().iter().zip(&allocation.submesh_offsets) {
            let cells = submesh.grid().cells();
            if cells.is_empty() {
                continue;
            }
            let bytes = cell_bytes(cells);
            let offset = allocation.cell_range.offset + offsets.cell_offset;
            writer.write(self.bindings[CELLS], offset, &bytes);
            stats.bytes_uploaded += bytes.len() as u64;
        }
        stats.full_uploads += 1;
    }

    fn write_dirty_voxels<W: StorageBufferWriter + ?Sized>(
        &self,
        allocation: &MeshAllocation,
        mesh: &VoxelMesh,
        dirty: &[SubmeshDirty],
        writer: &mut W,
        stats: &mut UploadStats,
    ) {
        let submeshes = mesh.submeshes().iter().zip(&allocation.submesh_offsets);
        for ((submesh, offsets), dirty) in submeshes.zip(dirty) {
            let Some(range) = dirty.voxels.clone() else {
                continue;
            };
            let bytes = submesh.grid().color_indices();
            let range = range.start.min(bytes.len())..range.end.min(bytes.len());
            if range.is_empty() {
                continue;
            }
            let offset = allocation.voxel_range.offset + offsets.voxel_offset + range.start as u64;
            writer.write(self.bindings[VOXELS], offset, &bytes[range.clone()]);
            stats.bytes_uploaded += range.len() as u64;
            stats.partial_uploads += 1;
        }
    }

    fn write_dirty_cells<W: StorageBufferWriter + ?Sized>(
        &self,
        allocation: &MeshAllocation,
        mesh: &VoxelMesh,
        dirty: &[SubmeshDirty],
        writer: &mut W,
        stats: &mut UploadStats,
    ) {
        let submeshes = mesh.submeshes().iter().zip(&allocation.submesh_offsets);
        for ((submesh, offsets), dirty) in submeshes.zip(dirty) {
            let cells = submesh.grid().cells();
            for run in runs(&dirty.cells) {
                if run.end > cells.len() {
                    continue;
                }
                let bytes = cell_bytes(&cells[run.clone()]);
                let offset = allocation.cell_range.offset
                    + offsets.cell_offset
                    + run.start as u64 * CELL_BYTES;
                writer.write(self.bindings[CELLS], offset, &bytes);
                stats.bytes_uploaded += bytes.len() as u64;
                stats.partial_uploads += 1;
            }
        }
    }
}

impl<A> std::fmt::Debug for MeshAllocationCache<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshAllocationCache")
            .field("meshes", &self.current.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxelgrove_core::Rgba8;
    use voxelgrove_voxel::{Palette, VoxelGrid};

    #[derive(Default)]
    struct RecordingWriter {
        writes: Vec<(BufferBinding, u64, Vec<u8>)>,
    }

    impl StorageBufferWriter for RecordingWriter {
        fn write(&mut self, binding: BufferBinding, offset: u64, bytes: &[u8]) {
            self.writes.push((binding, offset, bytes.to_vec()));
        }
    }

    impl RecordingWriter {
        fn to(&self, binding: BufferBinding) -> Vec<(u64, Vec<u8>)> {
            self.writes
                .iter()
                .filter(|(b, _, _)| *b == binding)
                .map(|(_, o, bytes)| (*o, bytes.clone()))
                .collect()
        }
    }

    /// 4³ grid, voxel (0, 0, 0) = 1, compressed at scale 2: 7 uniform cells
    /// and one literal cell, 15 color bytes and 64 cell bytes.
    fn test_mesh() -> VoxelMesh {
        let mut grid = VoxelGrid::new(4, 4, 4, 1.0);
        grid.set_voxel(0, 0, 0, 1);
        grid.compress(2).unwrap();
        let palette = Palette::new(vec![
            Rgba8::TRANSPARENT,
            Rgba8::opaque(255, 0, 0),
            Rgba8::opaque(0, 255, 0),
        ])
        .unwrap();
        VoxelMesh::from_grid(palette, grid)
    }

    fn store_with(meshes: Vec<VoxelMesh>) -> (HashMap<MeshId, VoxelMesh>, Vec<VisibleModel>) {
        let models = meshes
            .iter()
            .map(|m| VisibleModel::new(m, Mat4::IDENTITY))
            .collect();
        let store = meshes.into_iter().map(|m| (m.id(), m)).collect();
        (store, models)
    }

    fn bindings() -> MeshBindings {
        MeshBindings::default()
    }

    #[test]
    fn first_sight_uploads_everything() {
        let (mut store, models) = store_with(vec![test_mesh()]);
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        let mut writer = RecordingWriter::default();

        let frame = cache.update(&models, &mut store, &mut writer);
        assert_eq!(frame.drawn, vec![0]);
        assert_eq!(frame.stats.misses, 1);
        assert_eq!(frame.stats.full_uploads, 3);
        assert_eq!(frame.stats.bytes_uploaded, 15 + 12 + 64);

        let allocation = cache.allocation(models[0].mesh).unwrap();
        assert_eq!(allocation.voxel_range.size, 16);
        assert_eq!(allocation.palette_range.size, 12);
        assert_eq!(allocation.cell_range.size, 64);

        let cells = writer.to(bindings().cells);
        assert_eq!(cells.len(), 1);
        // Cell 0 is the literal block at offset 0 with 8 voxels.
        assert_eq!(&cells[0].1[..8], &[8, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn unchanged_mesh_is_a_hit_without_upload() {
        let (mut store, models) = store_with(vec![test_mesh()]);
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        let mut writer = RecordingWriter::default();

        cache.update(&models, &mut store, &mut writer);
        let first = cache.allocation(models[0].mesh).cloned().unwrap();

        let mut writer = RecordingWriter::default();
        let frame = cache.update(&models, &mut store, &mut writer);
        assert_eq!(frame.stats.hits, 1);
        assert_eq!(frame.stats.misses, 0);
        assert_eq!(frame.stats.bytes_uploaded, 0);
        assert!(writer.writes.is_empty());
        assert_eq!(cache.allocation(models[0].mesh), Some(&first));
    }

    #[test]
    fn edit_in_literal_cell_uploads_one_byte() {
        let (mut store, models) = store_with(vec![test_mesh()]);
        let id = models[0].mesh;
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        cache.update(&models, &mut store, &mut RecordingWriter::default());

        let mesh = store.get_mut(&id).unwrap();
        assert!(mesh.submesh_mut(0).unwrap().set_voxel(1, 1, 1, 2));

        let mut writer = RecordingWriter::default();
        let frame = cache.update(&models, &mut store, &mut writer);
        let allocation = cache.allocation(id).unwrap();
        // Literal cell 0 starts at byte 0; local index of (1, 1, 1) is 7.
        assert_eq!(
            writer.to(bindings().voxels),
            vec![(allocation.voxel_range.offset + 7, vec![2])]
        );
        assert!(writer.to(bindings().cells).is_empty());
        assert_eq!(frame.stats.partial_uploads, 1);
        assert_eq!(frame.stats.full_uploads, 0);
    }

    #[test]
    fn decompressing_a_cell_grows_in_place() {
        let (mut store, models) = store_with(vec![test_mesh()]);
        let id = models[0].mesh;
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        cache.update(&models, &mut store, &mut RecordingWriter::default());
        let before = cache.allocation(id).unwrap().voxel_range;

        // (3, 3, 3) sits in uniform cell 7; writing it appends 8 bytes.
        let mesh = store.get_mut(&id).unwrap();
        assert!(mesh.submesh_mut(0).unwrap().set_voxel(3, 3, 3, 2));

        let mut writer = RecordingWriter::default();
        let frame = cache.update(&models, &mut store, &mut writer);
        let allocation = cache.allocation(id).unwrap();
        assert_eq!(allocation.voxel_range.offset, before.offset);
        assert_eq!(allocation.voxel_range.size, 24);
        assert_eq!(frame.stats.full_uploads, 0);

        let voxels = writer.to(bindings().voxels);
        assert_eq!(voxels.len(), 1);
        assert_eq!(voxels[0].0, before.offset + 15);
        assert_eq!(voxels[0].1.len(), 8);
        assert_eq!(voxels[0].1[7], 2);

        let cells = writer.to(bindings().cells);
        assert_eq!(cells, vec![(allocation.cell_range.offset + 7 * 8, {
            let mut b = 8u32.to_le_bytes().to_vec();
            b.extend_from_slice(&15u32.to_le_bytes());
            b
        })]);
    }

    #[test]
    fn moved_range_is_uploaded_in_full() {
        let (mut store, models) = store_with(vec![test_mesh(), test_mesh()]);
        let a = models[0].mesh;
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        cache.update(&models, &mut store, &mut RecordingWriter::default());
        assert_eq!(cache.allocation(a).unwrap().voxel_range.offset, 0);

        // The second mesh sits right after the first, so growth must move.
        store
            .get_mut(&a)
            .unwrap()
            .submesh_mut(0)
            .unwrap()
            .set_voxel(3, 3, 3, 2);

        let mut writer = RecordingWriter::default();
        let frame = cache.update(&models, &mut store, &mut writer);
        let allocation = cache.allocation(a).unwrap();
        assert_eq!(allocation.voxel_range, ByteRange::new(32, 24));
        assert_eq!(frame.stats.full_uploads, 1);

        let voxels = writer.to(bindings().voxels);
        assert_eq!(voxels, vec![(32, store[&a].submeshes()[0].grid().color_indices().to_vec())]);
    }

    #[test]
    fn full_buffer_skips_mesh_and_releases_partial_ranges() {
        let (mut store, models) = store_with(vec![test_mesh(), test_mesh()]);
        let config = MeshCacheConfig {
            cell_capacity: 64,
            ..Default::default()
        };
        let mut cache = MeshAllocationCache::new(&config);
        let frame = cache.update(&models, &mut store, &mut RecordingWriter::default());

        assert_eq!(frame.drawn, vec![0]);
        assert_eq!(frame.stats.skipped, 1);
        assert!(cache.allocation(models[1].mesh).is_none());
        // Only the first mesh holds voxel and palette bytes.
        assert_eq!(cache.voxel_allocator().used(), 16);
        assert_eq!(cache.palette_allocator().used(), 12);
        assert_eq!(cache.cell_allocator().used(), 64);
    }

    #[test]
    fn unseen_mesh_is_freed() {
        let (mut store, models) = store_with(vec![test_mesh(), test_mesh()]);
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        cache.update(&models, &mut store, &mut RecordingWriter::default());
        assert_eq!(cache.len(), 2);

        let frame = cache.update(&models[..1], &mut store, &mut RecordingWriter::default());
        assert_eq!(frame.stats.freed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.allocation(models[1].mesh).is_none());
        assert_eq!(cache.voxel_allocator().used(), 16);

        // Seen again: allocated fresh.
        let frame = cache.update(&models, &mut store, &mut RecordingWriter::default());
        assert_eq!(frame.stats.misses, 1);
        assert_eq!(frame.stats.hits, 1);
    }

    #[test]
    fn duplicates_and_missing_meshes() {
        let (mut store, mut models) = store_with(vec![test_mesh()]);
        models.push(models[0]);
        let orphan = test_mesh();
        models.push(VisibleModel::new(&orphan, Mat4::IDENTITY));

        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        let frame = cache.update(&models, &mut store, &mut RecordingWriter::default());
        assert_eq!(frame.drawn, vec![0, 1]);
        assert_eq!(frame.stats.misses, 1);
        assert_eq!(frame.stats.missing, 1);
    }

    #[test]
    fn palette_change_uploads_palette_only() {
        let (mut store, models) = store_with(vec![test_mesh()]);
        let id = models[0].mesh;
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        cache.update(&models, &mut store, &mut RecordingWriter::default());

        store
            .get_mut(&id)
            .unwrap()
            .set_palette_color(2, Rgba8::opaque(0, 0, 255));
        let mut writer = RecordingWriter::default();
        cache.update(&models, &mut store, &mut writer);
        assert_eq!(writer.writes.len(), 1);
        assert_eq!(writer.writes[0].0, bindings().palette);
        assert_eq!(writer.writes[0].2.len(), 12);
    }

    #[test]
    fn clear_releases_everything() {
        let (mut store, models) = store_with(vec![test_mesh(), test_mesh()]);
        let mut cache = MeshAllocationCache::new(&MeshCacheConfig::default());
        cache.update(&models, &mut store, &mut RecordingWriter::default());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.voxel_allocator().used(), 0);
        assert_eq!(cache.cell_allocator().used(), 0);
    }

    #[test]
    fn dirty_cell_runs() {
        assert_eq!(runs(&[1, 2, 3, 7, 9, 10]), vec![1..4, 7..8, 9..11]);
        assert!(runs(&[]).is_empty());
    }
}
