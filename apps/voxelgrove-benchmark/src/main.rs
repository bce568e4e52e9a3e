//! Voxelgrove headless flythrough benchmark.
//!
//! Flies a camera along +x over generated terrain, streaming chunks through the
//! chunk cache and pushing every visible chunk mesh through the allocation
//! cache with a counting writer. Every few frames the surface under the camera
//! is painted to exercise dirty-range uploads.
//!
//! # Usage
//!
//! ```sh
//! cargo run --release -p voxelgrove-benchmark -- [OPTIONS]
//! ```
//!
//! # Options
//!
//! - `--frames <N>`: Frames to simulate (default: 600)
//! - `--view-distance <N>`: Chunks kept on each side of the camera (default: 4)
//! - `--seed <N>`: World generation seed (default: 42)
//! - `--speed <UNITS>`: Camera movement per frame (default: 2.0)
//! - `--threads <N>`: Generation worker threads (default: 4)
//! - `--edit-every <N>`: Frames between surface edits, 0 disables (default: 10)
//! - `-h, --help`: Print help message
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use voxelgrove_core::{ChunkCoord, Ray};
use voxelgrove_physics::ray_query;
use voxelgrove_render::{
    order_visible, ByteRangeAllocator, Camera, CountingWriter, MeshAllocationCache,
    MeshCacheConfig, UploadStats, VisibleModel,
};
use voxelgrove_world::{ChunkCache, TerrainConfig, WorldConfig, WorldSeed, WATER_COLOR};

/// Frames between progress lines.
const REPORT_INTERVAL: u32 = 60;

/// Flythrough parameters (from CLI or defaults).
#[derive(Debug, Clone)]
struct BenchParams {
    frames: u32,
    view_distance: u32,
    seed: WorldSeed,
    speed: f32,
    threads: usize,
    edit_every: u32,
}

impl Default for BenchParams {
    fn default() -> Self {
        Self {
            frames: 600,
            view_distance: 4,
            seed: 42,
            speed: 2.0,
            threads: 4,
            edit_every: 10,
        }
    }
}

impl BenchParams {
    /// Parse parameters from command line arguments.
    fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).map(String::as_str);
            let consumed = match (args[i].as_str(), value) {
                ("--frames", Some(v)) => v.parse().map(|v| params.frames = v).is_ok(),
                ("--view-distance", Some(v)) => {
                    v.parse().map(|v| params.view_distance = v).is_ok()
                }
                ("--seed", Some(v)) => v.parse().map(|v| params.seed = v).is_ok(),
                ("--speed", Some(v)) => v.parse().map(|v| params.speed = v).is_ok(),
                ("--threads", Some(v)) => v.parse().map(|v| params.threads = v).is_ok(),
                ("--edit-every", Some(v)) => v.parse().map(|v| params.edit_every = v).is_ok(),
                _ => false,
            };
            if consumed {
                i += 1;
            }
            i += 1;
        }

        params
    }

    fn world_config(&self) -> WorldConfig {
        WorldConfig {
            view_distance: self.view_distance,
            worker_threads: self.threads,
            terrain: TerrainConfig {
                seed: self.seed,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Running totals across frames.
#[derive(Debug, Default)]
struct Totals {
    uploads: UploadStats,
    visible: usize,
    edits: usize,
    update_time: Duration,
    upload_time: Duration,
}

impl Totals {
    fn add(&mut self, frame: &UploadStats) {
        let t = &mut self.uploads;
        t.hits += frame.hits;
        t.misses += frame.misses;
        t.skipped += frame.skipped;
        t.missing += frame.missing;
        t.freed += frame.freed;
        t.full_uploads += frame.full_uploads;
        t.partial_uploads += frame.partial_uploads;
        t.bytes_uploaded += frame.bytes_uploaded;
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let params = BenchParams::from_args();
    info!(?params, "Voxelgrove flythrough benchmark");

    let config = params.world_config();
    let mut world = ChunkCache::new(config)?;
    let mut meshes = MeshAllocationCache::new(&MeshCacheConfig::default());
    let mut writer = CountingWriter::new();
    let mut camera = Camera {
        position: Vec3::new(0.0, 96.0, 0.0),
        direction: Vec3::new(1.0, -0.35, 0.15).normalize(),
        ..Default::default()
    };
    let mut totals = Totals::default();
    let start = Instant::now();

    for frame in 0..params.frames {
        camera.position.x += params.speed;

        let t = Instant::now();
        let report = world.update(camera.position);
        totals.update_time += t.elapsed();
        if report.shifted {
            debug!(
                x = report.center.x,
                z = report.center.z,
                evicted = report.evicted,
                submitted = report.submitted,
                "window moved"
            );
        }

        if params.edit_every > 0 && frame % params.edit_every == 0 && paint_surface(&mut world, camera.position) {
            totals.edits += 1;
        }

        let models: Vec<VisibleModel> = world
            .ready_chunks()
            .map(|chunk| {
                let origin = world.chunk_bounds(chunk).min;
                VisibleModel::new(chunk.mesh(), Mat4::from_translation(origin))
            })
            .collect();
        let order = order_visible(&models, Some(&camera.frustum()), camera.position);
        let visible: Vec<VisibleModel> = order.iter().map(|&i| models[i]).collect();
        totals.visible += visible.len();

        let t = Instant::now();
        let frame_allocations = meshes.update(&visible, &mut world, &mut writer);
        totals.upload_time += t.elapsed();
        totals.add(&frame_allocations.stats);

        if frame % REPORT_INTERVAL == 0 {
            info!(
                frame,
                chunks = models.len(),
                visible = visible.len(),
                drawn = frame_allocations.drawn.len(),
                pending = world.pending_count(),
                bytes = frame_allocations.stats.bytes_uploaded,
                "frame"
            );
        }
    }

    let elapsed = start.elapsed();
    let frames = params.frames.max(1);
    let cache = world.stats();
    let pool = world.buffer_pool().stats();
    info!(
        frames = params.frames,
        seconds = elapsed.as_secs_f64(),
        fps = f64::from(params.frames) / elapsed.as_secs_f64().max(f64::EPSILON),
        avg_visible = totals.visible as f64 / f64::from(frames),
        avg_update_us = totals.update_time.as_micros() as f64 / f64::from(frames),
        avg_upload_us = totals.upload_time.as_micros() as f64 / f64::from(frames),
        edits = totals.edits,
        "flythrough finished"
    );
    info!(
        generated = cache.generated,
        canceled = cache.canceled,
        stale = cache.stale_discarded,
        evicted = cache.evicted,
        failed = cache.failed,
        "chunk cache"
    );
    info!(
        reused = pool.reused,
        allocated = pool.allocated,
        recycled = pool.recycled,
        discarded = pool.discarded,
        pooled = pool.pooled,
        "buffer pool"
    );
    info!(
        hits = totals.uploads.hits,
        misses = totals.uploads.misses,
        skipped = totals.uploads.skipped,
        freed = totals.uploads.freed,
        full = totals.uploads.full_uploads,
        partial = totals.uploads.partial_uploads,
        bytes = writer.total_bytes(),
        voxel_bytes_used = meshes.voxel_allocator().used(),
        "mesh uploads"
    );

    Ok(())
}

/// Paint the topmost solid voxel under `pos` with water.
///
/// Returns false when the chunk is not installed or the column is empty.
fn paint_surface(world: &mut ChunkCache, pos: Vec3) -> bool {
    let extent = world.config().chunk_extent();
    let coord = ChunkCoord::from_world(pos, extent);
    let origin = coord.world_min(extent);
    let transform = Mat4::from_translation(origin);
    let Some(chunk) = world.chunk_mut(coord) else {
        return false;
    };
    let Some(grid) = chunk.grid() else {
        return false;
    };

    let top = origin.y + grid.voxel_dims().y as f32 * grid.fine_voxel_size() + 1.0;
    let down = Ray::new(Vec3::new(pos.x, top, pos.z), Vec3::NEG_Y);
    let Some(hit) = ray_query(&down, grid, transform, f32::INFINITY) else {
        return false;
    };
    let v = hit.voxel;

    chunk
        .mesh_mut()
        .submesh_mut(0)
        .is_some_and(|submesh| submesh.set_voxel(v.x, v.y, v.z, WATER_COLOR))
}

fn print_help() {
    eprintln!(
        "Voxelgrove headless flythrough benchmark

USAGE:
    cargo run --release -p voxelgrove-benchmark -- [OPTIONS]

OPTIONS:
    --frames <N>           Frames to simulate (default: 600)
    --view-distance <N>    Chunks kept on each side of the camera (default: 4)
    --seed <N>             World generation seed (default: 42)
    --speed <UNITS>        Camera movement per frame (default: 2.0)
    --threads <N>          Generation worker threads (default: 4)
    --edit-every <N>       Frames between surface edits, 0 disables (default: 10)
    -h, --help             Print this help message

ENVIRONMENT:
    RUST_LOG               Log filter (e.g. info, debug, voxelgrove_world=trace)

EXAMPLES:
    cargo run --release -p voxelgrove-benchmark -- --frames 2000 --view-distance 6
    RUST_LOG=debug cargo run -p voxelgrove-benchmark -- --seed 7 --edit-every 1"
    );
}
