//! Sliding window of generated chunks around a moving viewpoint.
//!
//! The cache owns a `(2 * view_distance + 1)²` ring of chunk slots centered on
//! the chunk containing the viewpoint. When the center moves, chunks that stay
//! inside the window move to their new slots, the rest are dropped, and every
//! empty slot gets a generation job. Jobs run on a [`JobPool`] and report back
//! through shared [`GeneratedChunk`] tickets that the cache polls on each
//! update; it never waits for a job.

use std::sync::Arc;

use glam::Vec3;
use hashbrown::HashMap;
use tracing::{debug, trace, warn};
use voxelgrove_core::{Aabb, ChunkCoord, ColorIndex, Result};
use voxelgrove_voxel::{BufferPool, MeshId, MeshStore, Palette, VoxelMesh};

use crate::chunk::Chunk;
use crate::config::WorldConfig;
use crate::generation::{world_palette, TerrainGenerator};
use crate::job::{generation_thread_pool, GeneratedChunk, GenerationStatus, Job, JobPool};

/// State of one window slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// No chunk and no job.
    Empty,
    /// A job is generating the chunk for this slot.
    Generating,
    /// The chunk is installed.
    Ready,
}

/// What one [`ChunkCache::update`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub center: ChunkCoord,
    /// The window moved this update.
    pub shifted: bool,
    /// Finished chunks placed into slots.
    pub installed: usize,
    /// Chunks dropped because they left the window.
    pub evicted: usize,
    /// Jobs canceled because their chunk left the window.
    pub canceled: usize,
    /// Results thrown away because their slot was no longer free.
    pub stale_discarded: usize,
    /// New jobs handed to the pool.
    pub submitted: usize,
    /// Jobs found failed this update; their slots are resubmitted.
    pub failed: usize,
}

/// Totals over the cache's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub generated: usize,
    pub canceled: usize,
    pub stale_discarded: usize,
    pub evicted: usize,
    /// Jobs that failed and will be retried.
    pub failed: usize,
}

/// Ring of chunks around the viewpoint with asynchronous generation.
pub struct ChunkCache {
    config: WorldConfig,
    center: ChunkCoord,
    started: bool,
    /// Slot `(ix, iz)` lives at `ix + size * iz` and holds world chunk
    /// `center + (ix - vd, iz - vd)`.
    slots: Vec<Option<Chunk>>,
    tickets: HashMap<ChunkCoord, Arc<GeneratedChunk>>,
    /// Slot index of every installed chunk's mesh.
    mesh_slots: HashMap<MeshId, usize>,
    generator: Arc<TerrainGenerator>,
    palette: Palette,
    buffers: Arc<BufferPool>,
    jobs: Arc<dyn JobPool>,
    stats: CacheStats,
}

impl ChunkCache {
    /// Create a cache generating on its own rayon pool of
    /// `config.worker_threads` threads.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        let pool = generation_thread_pool(config.worker_threads)?;
        Self::with_pool(config, Arc::new(pool))
    }

    /// Create a cache generating on the given job pool.
    pub fn with_pool(config: WorldConfig, jobs: Arc<dyn JobPool>) -> Result<Self> {
        config.validate()?;
        if config.world_path.is_some() {
            debug!(path = ?config.world_path, "world path set; world data is not persisted");
        }
        let size = config.window_size();
        Ok(Self {
            generator: Arc::new(TerrainGenerator::new(&config)),
            palette: world_palette()?,
            center: ChunkCoord::default(),
            started: false,
            slots: (0..size * size).map(|_| None).collect(),
            tickets: HashMap::new(),
            mesh_slots: HashMap::new(),
            buffers: BufferPool::shared(),
            jobs,
            stats: CacheStats::default(),
            config,
        })
    }

    /// Use `buffers` instead of the process-wide pool.
    #[must_use]
    pub fn with_buffer_pool(mut self, buffers: Arc<BufferPool>) -> Self {
        self.buffers = buffers;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Chunk the window is centered on
    pub fn center(&self) -> ChunkCoord {
        self.center
    }

    /// The terrain generator shared with jobs
    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    /// Pool recycling chunk buffers
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    /// Lifetime counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Jobs that have not been collected yet
    pub fn pending_count(&self) -> usize {
        self.tickets.len()
    }

    #[inline]
    fn slot_index(&self, (ix, iz): (usize, usize)) -> usize {
        ix + self.config.window_size() * iz
    }

    /// Report a new viewpoint.
    ///
    /// Collects finished jobs, then, if the viewpoint crossed into another
    /// chunk, shifts the window, cancels jobs that fell outside it and starts
    /// jobs for every empty slot. Slots whose job failed are resubmitted even
    /// when the window stays put.
    pub fn update(&mut self, viewpoint: Vec3) -> UpdateReport {
        let _span = tracing::debug_span!("chunk_cache_update").entered();
        let mut report = UpdateReport::default();

        self.collect_finished(&mut report);

        let new_center = ChunkCoord::from_world(viewpoint, self.config.chunk_extent());
        report.center = new_center;
        if self.started && new_center == self.center {
            if report.failed > 0 {
                self.submit_missing(&mut report);
                debug!(
                    failed = report.failed,
                    submitted = report.submitted,
                    "retrying failed chunks"
                );
            }
            return report;
        }

        if self.started {
            self.shift(new_center, &mut report);
        } else {
            self.center = new_center;
            self.started = true;
        }
        self.cancel_outside(&mut report);
        self.submit_missing(&mut report);

        debug!(
            x = new_center.x,
            z = new_center.z,
            evicted = report.evicted,
            canceled = report.canceled,
            submitted = report.submitted,
            "chunk window moved"
        );
        report
    }

    /// Install every finished ticket whose chunk still has a free slot.
    fn collect_finished(&mut self, report: &mut UpdateReport) {
        let finished: Vec<ChunkCoord> = self
            .tickets
            .iter()
            .filter(|(_, ticket)| ticket.is_finished())
            .map(|(coord, _)| *coord)
            .collect();

        for coord in finished {
            let Some(ticket) = self.tickets.remove(&coord) else {
                continue;
            };
            match ticket.take_finished() {
                Some(GenerationStatus::Completed(chunk)) => {
                    let slot = coord
                        .window_slot(self.center, self.config.view_distance)
                        .map(|slot| self.slot_index(slot));
                    match slot {
                        Some(index) if self.slots[index].is_none() => {
                            trace!(x = coord.x, z = coord.z, "chunk ready");
                            self.mesh_slots.insert(chunk.mesh().id(), index);
                            self.slots[index] = Some(*chunk);
                            report.installed += 1;
                            self.stats.generated += 1;
                        }
                        _ => {
                            // Dropping the chunk recycles its buffers.
                            report.stale_discarded += 1;
                            self.stats.stale_discarded += 1;
                        }
                    }
                }
                Some(GenerationStatus::Canceled) => {
                    // Not canceled by us, so the job failed.
                    report.failed += 1;
                    self.stats.failed += 1;
                }
                Some(GenerationStatus::InProgress) | None => {
                    self.tickets.insert(coord, ticket);
                }
            }
        }
    }

    /// Move chunks to their slots around `new_center`, dropping the rest.
    fn shift(&mut self, new_center: ChunkCoord, report: &mut UpdateReport) {
        let size = self.config.window_size();
        let vd = self.config.view_distance;
        let mut slots: Vec<Option<Chunk>> = (0..size * size).map(|_| None).collect();

        for chunk in self.slots.iter_mut().filter_map(Option::take) {
            match chunk.coord().window_slot(new_center, vd) {
                Some((ix, iz)) => slots[ix + size * iz] = Some(chunk),
                None => {
                    report.evicted += 1;
                    self.stats.evicted += 1;
                }
            }
        }

        self.slots = slots;
        self.mesh_slots.clear();
        for (index, chunk) in self.slots.iter().enumerate() {
            if let Some(chunk) = chunk {
                self.mesh_slots.insert(chunk.mesh().id(), index);
            }
        }
        self.center = new_center;
        report.shifted = true;
    }

    /// Cancel and forget jobs whose chunk is no longer in the window.
    fn cancel_outside(&mut self, report: &mut UpdateReport) {
        let center = self.center;
        let vd = self.config.view_distance;
        let before = self.tickets.len();
        self.tickets.retain(|coord, ticket| {
            let keep = coord.window_slot(center, vd).is_some();
            if !keep {
                ticket.cancel();
            }
            keep
        });
        let canceled = before - self.tickets.len();
        report.canceled += canceled;
        self.stats.canceled += canceled;
    }

    /// Start a job for every empty slot without one.
    fn submit_missing(&mut self, report: &mut UpdateReport) {
        let size = self.config.window_size();
        let vd = i64::from(self.config.view_distance);
        for iz in 0..size {
            for ix in 0..size {
                if self.slots[ix + size * iz].is_some() {
                    continue;
                }
                let coord = self.center.offset(ix as i64 - vd, iz as i64 - vd);
                if self.tickets.contains_key(&coord) {
                    continue;
                }
                let ticket = Arc::new(GeneratedChunk::new(coord, (ix, iz)));
                self.tickets.insert(coord, Arc::clone(&ticket));
                self.jobs.submit(self.generation_job(ticket));
                report.submitted += 1;
            }
        }
    }

    fn generation_job(&self, ticket: Arc<GeneratedChunk>) -> Job {
        let generator = Arc::clone(&self.generator);
        let buffers = Arc::clone(&self.buffers);
        let palette = self.palette.clone();
        Box::new(move || {
            let coord = ticket.coord();
            match generator.generate(coord, &buffers, ticket.cancel_flag()) {
                Ok(Some(grid)) => {
                    let mesh = VoxelMesh::from_grid(palette, grid);
                    ticket.complete(Chunk::new(coord, mesh, buffers));
                }
                Ok(None) => ticket.mark_canceled(),
                Err(err) => {
                    warn!(x = coord.x, z = coord.z, %err, "chunk generation failed");
                    ticket.mark_canceled();
                }
            }
        })
    }

    /// State of window slot `(ix, iz)`, `None` outside the window.
    pub fn slot_state(&self, ix: usize, iz: usize) -> Option<SlotState> {
        let size = self.config.window_size();
        if ix >= size || iz >= size {
            return None;
        }
        if self.slots[ix + size * iz].is_some() {
            return Some(SlotState::Ready);
        }
        let vd = i64::from(self.config.view_distance);
        let coord = self.center.offset(ix as i64 - vd, iz as i64 - vd);
        Some(if self.tickets.contains_key(&coord) {
            SlotState::Generating
        } else {
            SlotState::Empty
        })
    }

    /// The installed chunk at world chunk coordinate `coord`.
    ///
    /// Chunks outside the window are never returned, even if a slot's index
    /// would alias to them.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        let slot = coord.window_slot(self.center, self.config.view_distance)?;
        self.slots[self.slot_index(slot)]
            .as_ref()
            .filter(|chunk| chunk.coord() == coord)
    }

    /// Mutable access to the installed chunk at `coord`.
    pub fn chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        let slot = coord.window_slot(self.center, self.config.view_distance)?;
        let index = self.slot_index(slot);
        self.slots[index]
            .as_mut()
            .filter(|chunk| chunk.coord() == coord)
    }

    /// The installed chunk containing world position `pos`.
    pub fn chunk_at_world(&self, pos: Vec3) -> Option<&Chunk> {
        self.chunk(ChunkCoord::from_world(pos, self.config.chunk_extent()))
    }

    /// World-space bounds of a chunk.
    pub fn chunk_bounds(&self, chunk: &Chunk) -> Aabb {
        let extent = self.config.chunk_extent();
        let min = chunk.coord().world_min(extent);
        let height = self.config.chunk_height as f32 * self.config.voxel_size;
        Aabb::new(min, min + Vec3::new(extent, height, extent))
    }

    /// Color of the voxel at world position `pos`, if its chunk is installed.
    pub fn voxel_at_world(&self, pos: Vec3) -> Option<ColorIndex> {
        let chunk = self.chunk_at_world(pos)?;
        let grid = chunk.grid()?;
        let local = (pos - chunk.coord().world_min(self.config.chunk_extent()))
            / self.config.voxel_size;
        let voxel = local.floor();
        if voxel.cmplt(Vec3::ZERO).any() {
            return None;
        }
        let voxel = voxel.as_uvec3();
        grid.voxel(voxel.x, voxel.y, voxel.z)
    }

    /// Every installed chunk, in slot order.
    pub fn ready_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.slots.iter().flatten()
    }
}

impl MeshStore for ChunkCache {
    fn mesh(&self, id: MeshId) -> Option<&VoxelMesh> {
        let index = *self.mesh_slots.get(&id)?;
        self.slots[index]
            .as_ref()
            .map(Chunk::mesh)
            .filter(|mesh| mesh.id() == id)
    }

    fn mesh_mut(&mut self, id: MeshId) -> Option<&mut VoxelMesh> {
        let index = *self.mesh_slots.get(&id)?;
        self.slots[index]
            .as_mut()
            .map(Chunk::mesh_mut)
            .filter(|mesh| mesh.id() == id)
    }
}

impl Drop for ChunkCache {
    fn drop(&mut self) {
        for ticket in self.tickets.values() {
            ticket.cancel();
        }
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("center", &self.center)
            .field("ready", &self.ready_chunks().count())
            .field("pending", &self.tickets.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use voxelgrove_core::COORD_LIMIT;
    use parking_lot::Mutex;

    /// Runs jobs only when told to.
    #[derive(Default)]
    struct ManualPool {
        queue: Mutex<Vec<Job>>,
    }

    impl JobPool for ManualPool {
        fn submit(&self, job: Job) {
            self.queue.lock().push(job);
        }
    }

    impl ManualPool {
        fn run_all(&self) -> usize {
            let jobs = std::mem::take(&mut *self.queue.lock());
            let count = jobs.len();
            for job in jobs {
                job();
            }
            count
        }

        fn queued(&self) -> usize {
            self.queue.lock().len()
        }
    }

    fn small_config(view_distance: u32) -> WorldConfig {
        WorldConfig {
            view_distance,
            chunk_width: 8,
            chunk_height: 8,
            voxel_size: 1.0,
            compression_scale: 2,
            worker_threads: 1,
            world_path: None,
            terrain: TerrainConfig {
                seed: 9,
                water_level: 3,
                height_scale: 8.0,
                ..Default::default()
            },
        }
    }

    fn cache(view_distance: u32) -> (ChunkCache, Arc<ManualPool>, Arc<BufferPool>) {
        let jobs = Arc::new(ManualPool::default());
        let buffers = Arc::new(BufferPool::new());
        let cache = ChunkCache::with_pool(small_config(view_distance), jobs.clone())
            .unwrap()
            .with_buffer_pool(Arc::clone(&buffers));
        (cache, jobs, buffers)
    }

    /// Viewpoint in the middle of chunk `(x, z)` for 8-voxel chunks.
    fn at(x: i64, z: i64) -> Vec3 {
        Vec3::new(x as f32 * 8.0, 4.0, z as f32 * 8.0)
    }

    #[test]
    fn first_update_fills_window() {
        let (mut cache, jobs, _) = cache(1);
        let report = cache.update(at(0, 0));
        assert_eq!(report.submitted, 9);
        assert_eq!(jobs.queued(), 9);
        assert_eq!(cache.slot_state(1, 1), Some(SlotState::Generating));

        jobs.run_all();
        let report = cache.update(at(0, 0));
        assert_eq!(report.installed, 9);
        assert_eq!(report.submitted, 0);
        assert_eq!(cache.ready_chunks().count(), 9);
        assert_eq!(cache.slot_state(0, 2), Some(SlotState::Ready));
        assert_eq!(cache.slot_state(3, 0), None);
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn repeated_update_is_idempotent() {
        let (mut cache, jobs, _) = cache(2);
        cache.update(at(3, -1));
        jobs.run_all();
        cache.update(at(3, -1));

        let before: Vec<MeshId> = cache.ready_chunks().map(|c| c.mesh().id()).collect();
        let report = cache.update(at(3, -1) + Vec3::new(1.5, 0.0, -2.0));
        assert!(!report.shifted);
        assert_eq!(report.submitted, 0);
        assert_eq!(report.evicted, 0);
        assert_eq!(jobs.queued(), 0);
        let after: Vec<MeshId> = cache.ready_chunks().map(|c| c.mesh().id()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn step_in_x_evicts_column_and_requests_three() {
        let (mut cache, jobs, buffers) = cache(1);
        cache.update(at(0, 0));
        jobs.run_all();
        cache.update(at(0, 0));
        let recycled_before = buffers.stats().recycled;

        let report = cache.update(at(1, 0));
        assert!(report.shifted);
        assert_eq!(report.center, ChunkCoord::new(1, 0));
        assert_eq!(report.evicted, 3);
        assert_eq!(report.submitted, 3);
        assert_eq!(jobs.queued(), 3);

        for z in -1..=1 {
            assert!(cache.chunk(ChunkCoord::new(-1, z)).is_none());
            assert!(cache.chunk(ChunkCoord::new(0, z)).is_some());
            assert!(cache.chunk(ChunkCoord::new(1, z)).is_some());
            assert!(cache.chunk(ChunkCoord::new(2, z)).is_none());
        }
        // The new column is generating in the rightmost slots.
        for iz in 0..3 {
            assert_eq!(cache.slot_state(2, iz), Some(SlotState::Generating));
        }
        // Evicted chunks handed their buffers back.
        assert_eq!(buffers.stats().recycled, recycled_before + 3);
    }

    #[test]
    fn shifted_chunks_keep_identity() {
        let (mut cache, jobs, _) = cache(2);
        cache.update(at(0, 0));
        jobs.run_all();
        cache.update(at(0, 0));
        let id = cache.chunk(ChunkCoord::new(1, 1)).unwrap().mesh().id();

        cache.update(at(-1, 2));
        let chunk = cache.chunk(ChunkCoord::new(1, 1)).unwrap();
        assert_eq!(chunk.coord(), ChunkCoord::new(1, 1));
        assert_eq!(chunk.mesh().id(), id);

        for chunk in cache.ready_chunks() {
            assert!(chunk.coord().chebyshev_distance(cache.center()) <= 2);
        }
    }

    #[test]
    fn jobs_leaving_window_are_canceled_and_discarded() {
        let (mut cache, jobs, buffers) = cache(1);
        cache.update(at(0, 0));
        // Jump far away before anything finishes.
        let report = cache.update(at(10, 10));
        assert_eq!(report.canceled, 9);
        assert_eq!(report.submitted, 9);
        assert_eq!(cache.stats().canceled, 9);

        let recycled_before = buffers.stats().recycled;
        assert_eq!(jobs.run_all(), 18);
        let report = cache.update(at(10, 10));
        assert_eq!(report.installed, 9);
        assert!(cache.ready_chunks().all(|c| c.coord().chebyshev_distance(ChunkCoord::new(10, 10)) <= 1));
        // Every canceled job released its fill buffer without producing a chunk.
        assert!(buffers.stats().recycled >= recycled_before + 9);
    }

    #[test]
    fn in_window_jobs_survive_a_move() {
        let (mut cache, jobs, _) = cache(1);
        cache.update(at(0, 0));
        let report = cache.update(at(1, 0));
        // Column x = -1 left the window, x = 2 entered it.
        assert_eq!(report.canceled, 3);
        assert_eq!(report.submitted, 3);
        assert_eq!(cache.pending_count(), 9);

        jobs.run_all();
        let report = cache.update(at(1, 0));
        assert_eq!(report.installed, 9);
        assert_eq!(report.stale_discarded, 0);
        for x in 0..=2 {
            for z in -1..=1 {
                let coord = ChunkCoord::new(x, z);
                assert_eq!(cache.chunk(coord).map(Chunk::coord), Some(coord));
            }
        }
    }

    #[test]
    fn world_queries() {
        let (mut cache, jobs, _) = cache(1);
        cache.update(at(0, 0));
        jobs.run_all();
        cache.update(at(0, 0));

        let chunk = cache.chunk_at_world(Vec3::new(3.0, 0.0, -3.0)).unwrap();
        assert_eq!(chunk.coord(), ChunkCoord::new(0, 0));
        let bounds = cache.chunk_bounds(chunk);
        assert_eq!(bounds.min, Vec3::new(-4.0, 0.0, -4.0));
        assert_eq!(bounds.max, Vec3::new(4.0, 8.0, 4.0));

        // Bottom voxels are ground or water, never empty: water_level is 3.
        let color = cache.voxel_at_world(Vec3::new(0.5, 0.5, 0.5)).unwrap();
        assert_ne!(color, 0);
        assert!(cache.voxel_at_world(Vec3::new(0.5, -0.5, 0.5)).is_none());
        assert!(cache.chunk_at_world(Vec3::new(100.0, 0.0, 0.0)).is_none());

        let id = chunk.mesh().id();
        assert!(cache.mesh(id).is_some());
        assert!(cache.mesh_mut(id).is_some());
    }

    #[test]
    fn failed_job_is_retried_without_moving() {
        let (mut cache, jobs, _) = cache(1);
        cache.update(at(0, 0));
        // A job that stops on its own reads as a failure.
        cache.tickets[&ChunkCoord::new(0, 0)].cancel();
        jobs.run_all();

        let report = cache.update(at(0, 0));
        assert!(!report.shifted);
        assert_eq!(report.installed, 8);
        assert_eq!(report.failed, 1);
        assert_eq!(report.submitted, 1);
        assert_eq!(cache.stats().failed, 1);
        assert_eq!(cache.slot_state(1, 1), Some(SlotState::Generating));

        jobs.run_all();
        let report = cache.update(at(0, 0));
        assert_eq!(report.installed, 1);
        assert_eq!(report.submitted, 0);
        assert!(cache.chunk(ChunkCoord::new(0, 0)).is_some());
    }

    #[test]
    fn far_viewpoint_queries_return_nothing() {
        let (mut cache, jobs, _) = cache(1);
        let far = Vec3::new(1e30, 0.0, -1e30);
        assert!(cache.chunk_at_world(far).is_none());
        assert!(cache.voxel_at_world(far).is_none());

        let report = cache.update(far);
        assert_eq!(report.center, ChunkCoord::new(COORD_LIMIT, -COORD_LIMIT));
        assert_eq!(report.submitted, 9);
        assert_eq!(jobs.queued(), 9);
        assert_eq!(cache.slot_state(1, 1), Some(SlotState::Generating));
        assert!(cache.chunk_at_world(far).is_none());
        assert!(cache.chunk_at_world(Vec3::ZERO).is_none());
        assert!(cache.voxel_at_world(Vec3::new(-1e30, 0.0, 1e30)).is_none());
    }

    #[test]
    fn mesh_lookup_follows_shifts_and_evictions() {
        let (mut cache, jobs, _) = cache(1);
        cache.update(at(0, 0));
        jobs.run_all();
        cache.update(at(0, 0));
        let kept = cache.chunk(ChunkCoord::new(1, 0)).unwrap().mesh().id();
        let evicted = cache.chunk(ChunkCoord::new(-1, 0)).unwrap().mesh().id();

        cache.update(at(1, 0));
        assert_eq!(cache.mesh(kept).map(VoxelMesh::id), Some(kept));
        assert!(cache.mesh_mut(kept).is_some());
        assert!(cache.mesh(evicted).is_none());
        assert!(cache.mesh(MeshId::next()).is_none());
    }

    #[test]
    fn drop_cancels_pending_jobs() {
        let (mut cache, jobs, buffers) = cache(1);
        cache.update(at(0, 0));
        drop(cache);
        jobs.run_all();
        // Canceled before the first column: only fill buffers were touched.
        let stats = buffers.stats();
        assert_eq!(stats.recycled + stats.discarded, 9);
    }
}
