//! Background generation jobs and the tickets shared with them.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use voxelgrove_core::{ChunkCoord, Error, Result};

use crate::chunk::Chunk;

/// A unit of work for a [`JobPool`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs off the calling thread.
pub trait JobPool: Send + Sync {
    /// Queue a job. Must not block on the job's completion.
    fn submit(&self, job: Job);
}

impl JobPool for rayon::ThreadPool {
    fn submit(&self, job: Job) {
        self.spawn(job);
    }
}

/// Build the rayon pool used for chunk generation.
pub fn generation_thread_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("chunk-gen-{i}"))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))
}

/// Progress of a generation job.
#[derive(Debug)]
pub enum GenerationStatus {
    InProgress,
    Completed(Box<Chunk>),
    Canceled,
}

/// Ticket shared between the cache and the job generating one chunk.
///
/// The cache sets the cancel flag; the job polls it and publishes its
/// outcome through the status.
#[derive(Debug)]
pub struct GeneratedChunk {
    coord: ChunkCoord,
    /// Window slot the chunk was headed for when the job was submitted.
    index: (usize, usize),
    canceled: AtomicBool,
    status: Mutex<GenerationStatus>,
}

impl GeneratedChunk {
    pub fn new(coord: ChunkCoord, index: (usize, usize)) -> Self {
        Self {
            coord,
            index,
            canceled: AtomicBool::new(false),
            status: Mutex::new(GenerationStatus::InProgress),
        }
    }

    /// World chunk coordinate being generated
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Window slot at submission time
    pub fn index(&self) -> (usize, usize) {
        self.index
    }

    /// Ask the job to stop at its next poll.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    /// Returns true if cancellation was requested
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    /// Flag polled by the generator.
    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.canceled
    }

    /// Returns true if the job published an outcome
    pub fn is_finished(&self) -> bool {
        !matches!(*self.status.lock(), GenerationStatus::InProgress)
    }

    /// Publish a finished chunk.
    pub fn complete(&self, chunk: Chunk) {
        *self.status.lock() = GenerationStatus::Completed(Box::new(chunk));
    }

    /// Publish that the job stopped without a chunk.
    pub fn mark_canceled(&self) {
        *self.status.lock() = GenerationStatus::Canceled;
    }

    /// Take the outcome if the job has finished.
    ///
    /// The ticket reads as canceled afterwards.
    pub fn take_finished(&self) -> Option<GenerationStatus> {
        let mut status = self.status.lock();
        if matches!(*status, GenerationStatus::InProgress) {
            return None;
        }
        Some(std::mem::replace(&mut *status, GenerationStatus::Canceled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn ticket_lifecycle() {
        let ticket = GeneratedChunk::new(ChunkCoord::new(2, -1), (0, 1));
        assert!(!ticket.is_finished());
        assert!(ticket.take_finished().is_none());

        ticket.cancel();
        assert!(ticket.is_canceled());
        assert!(ticket.cancel_flag().load(Ordering::Relaxed));

        ticket.mark_canceled();
        assert!(ticket.is_finished());
        assert!(matches!(ticket.take_finished(), Some(GenerationStatus::Canceled)));
    }

    #[test]
    fn rayon_pool_runs_jobs() {
        let pool = generation_thread_pool(2).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            let tx = tx.clone();
            JobPool::submit(&pool, Box::new(move || tx.send(i).unwrap()));
        }
        let mut got: Vec<i32> = rx.iter().take(4).collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }
}
