//! Recycling pool for voxel color buffers.
//!
//! Buffers are bucketed by power-of-two capacity; each bucket is a LIFO stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

/// Smallest size class, 2^6 = 64 bytes. Smaller buffers are not pooled.
const MIN_CLASS_BITS: u32 = 6;
/// Largest size class, 2^30 bytes.
const MAX_CLASS_BITS: u32 = 30;
const CLASS_COUNT: usize = (MAX_CLASS_BITS - MIN_CLASS_BITS + 1) as usize;
/// Buffers kept per size class; extra returns are dropped.
const DEFAULT_MAX_PER_CLASS: usize = 64;

/// Counters describing pool activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquisitions satisfied from the pool.
    pub reused: usize,
    /// Acquisitions that had to allocate.
    pub allocated: usize,
    /// Buffers returned and kept.
    pub recycled: usize,
    /// Buffers returned but dropped (too small, too large, or bucket full).
    pub discarded: usize,
    /// Buffers currently held by the pool.
    pub pooled: usize,
}

/// Thread-safe, size-classed pool of byte buffers.
pub struct BufferPool {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
    max_per_class: usize,
    reused: AtomicUsize,
    allocated: AtomicUsize,
    recycled: AtomicUsize,
    discarded: AtomicUsize,
}

impl BufferPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::with_max_per_class(DEFAULT_MAX_PER_CLASS)
    }

    /// Create an empty pool keeping at most `max_per_class` buffers per bucket.
    pub fn with_max_per_class(max_per_class: usize) -> Self {
        Self {
            classes: (0..CLASS_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
            max_per_class,
            reused: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
            recycled: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        }
    }

    /// The process-wide pool shared by chunk streaming.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<BufferPool>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }

    /// Bucket able to serve a request of `len` bytes (capacity >= 2^class).
    fn request_class(len: usize) -> Option<usize> {
        let bits = len.max(1).next_power_of_two().trailing_zeros().max(MIN_CLASS_BITS);
        (bits <= MAX_CLASS_BITS).then(|| (bits - MIN_CLASS_BITS) as usize)
    }

    /// Bucket a buffer of the given capacity belongs to (2^class <= capacity).
    fn capacity_class(capacity: usize) -> Option<usize> {
        if capacity == 0 {
            return None;
        }
        let bits = usize::BITS - 1 - capacity.leading_zeros();
        (MIN_CLASS_BITS..=MAX_CLASS_BITS)
            .contains(&bits)
            .then(|| (bits - MIN_CLASS_BITS) as usize)
    }

    /// Get an empty buffer with capacity for at least `len` bytes.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        if let Some(class) = Self::request_class(len) {
            if let Some(mut buffer) = self.classes[class].lock().pop() {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buffer.clear();
                return buffer;
            }
            self.allocated.fetch_add(1, Ordering::Relaxed);
            return Vec::with_capacity(1 << (class as u32 + MIN_CLASS_BITS));
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(len)
    }

    /// Get a buffer of exactly `len` zero bytes.
    pub fn acquire_zeroed(&self, len: usize) -> Vec<u8> {
        let mut buffer = self.acquire(len);
        buffer.resize(len, 0);
        buffer
    }

    /// Return a buffer to the pool.
    pub fn release(&self, mut buffer: Vec<u8>) {
        let Some(class) = Self::capacity_class(buffer.capacity()) else {
            if buffer.capacity() > 0 {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
            return;
        };
        buffer.clear();
        let mut bucket = self.classes[class].lock();
        if bucket.len() < self.max_per_class {
            bucket.push(buffer);
            self.recycled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every pooled buffer.
    pub fn clear(&self) {
        for class in &self.classes {
            class.lock().clear();
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            reused: self.reused.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            pooled: self.classes.iter().map(|c| c.lock().len()).sum(),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("max_per_class", &self.max_per_class)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_reuses_released_buffer() {
        let pool = BufferPool::new();
        let buffer = pool.acquire_zeroed(1000);
        assert_eq!(buffer.len(), 1000);
        let ptr = buffer.as_ptr();
        pool.release(buffer);

        let again = pool.acquire(900);
        assert!(again.is_empty());
        assert!(again.capacity() >= 900);
        assert_eq!(again.as_ptr(), ptr);

        let stats = pool.stats();
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.pooled, 0);
    }

    #[test]
    fn buffer_too_small_for_class_is_not_handed_out() {
        let pool = BufferPool::new();
        // Capacity 1500 lands in the 1024 bucket and can't serve 2000 bytes.
        pool.release(Vec::with_capacity(1500));
        let buffer = pool.acquire(2000);
        assert!(buffer.capacity() >= 2000);
        assert_eq!(pool.stats().reused, 0);
        assert_eq!(pool.stats().pooled, 1);
    }

    #[test]
    fn buckets_are_lifo() {
        let pool = BufferPool::new();
        let a = Vec::<u8>::with_capacity(128);
        let b = Vec::<u8>::with_capacity(128);
        let b_ptr = b.as_ptr();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.acquire(128).as_ptr(), b_ptr);
    }

    #[test]
    fn full_bucket_discards() {
        let pool = BufferPool::with_max_per_class(1);
        pool.release(Vec::with_capacity(256));
        pool.release(Vec::with_capacity(256));
        pool.release(Vec::with_capacity(8));
        let stats = pool.stats();
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.discarded, 2);
        pool.clear();
        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn concurrent_release_and_acquire() {
        let pool = Arc::new(BufferPool::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let buffer = pool.acquire_zeroed(4096);
                        pool.release(buffer);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.reused + stats.allocated, 400);
        assert!(stats.pooled <= 4);
    }
}
