//! Sub-allocation of byte ranges inside fixed-size GPU storage buffers.

use bitflags::bitflags;

use crate::error::{AllocError, Result};

/// Every range offset and size is a multiple of this.
pub const ALIGNMENT: u64 = 4;

#[inline]
const fn align_up(size: u64) -> u64 {
    size.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// A span of bytes inside a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub size: u64,
}

impl ByteRange {
    /// The zero-sized range. Never occupies allocator space.
    pub const EMPTY: Self = Self { offset: 0, size: 0 };

    #[inline]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte
    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

bitflags! {
    /// What a resize did to a range.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AllocationFlags: u8 {
        /// The range moved or was freshly allocated; its old contents are gone.
        const REALLOCATED = 0b0000_0001;
    }
}

/// Allocator handing out ranges of one buffer.
pub trait ByteRangeAllocator {
    /// Reserve at least `size` bytes.
    fn allocate(&mut self, size: u64) -> Result<ByteRange>;

    /// Change the size of `range`, in place when possible.
    ///
    /// On failure `range` is still owned by the caller and unchanged.
    fn resize(&mut self, range: ByteRange, size: u64) -> Result<(ByteRange, AllocationFlags)>;

    /// Return a range. Empty ranges are ignored.
    fn free(&mut self, range: ByteRange);

    /// Total bytes managed
    fn capacity(&self) -> u64;

    /// Bytes currently handed out
    fn used(&self) -> u64;
}

/// First-fit allocator over a sorted, coalescing free list.
#[derive(Debug, Clone)]
pub struct FreeListAllocator {
    capacity: u64,
    used: u64,
    /// Free blocks sorted by offset, never adjacent to each other.
    free: Vec<ByteRange>,
}

impl FreeListAllocator {
    /// Manage `capacity` bytes (rounded down to the alignment).
    pub fn new(capacity: u64) -> Self {
        let capacity = capacity / ALIGNMENT * ALIGNMENT;
        let free = if capacity > 0 {
            vec![ByteRange::new(0, capacity)]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            used: 0,
            free,
        }
    }

    /// Current free blocks, sorted by offset
    pub fn free_blocks(&self) -> &[ByteRange] {
        &self.free
    }

    /// Size of the largest free block
    pub fn largest_free(&self) -> u64 {
        self.free.iter().map(|r| r.size).max().unwrap_or(0)
    }

    fn out_of_space(&self, requested: u64) -> AllocError {
        AllocError::OutOfSpace {
            requested,
            available: self.capacity - self.used,
        }
    }

    /// Put a block back, merging it with its neighbours.
    fn insert_free(&mut self, range: ByteRange) {
        let mut index = self.free.partition_point(|r| r.offset < range.offset);
        self.free.insert(index, range);

        if index + 1 < self.free.len() && self.free[index].end() == self.free[index + 1].offset {
            self.free[index].size += self.free[index + 1].size;
            self.free.remove(index + 1);
        }
        if index > 0 && self.free[index - 1].end() == self.free[index].offset {
            self.free[index - 1].size += self.free[index].size;
            self.free.remove(index);
            index -= 1;
        }
        debug_assert!(index < self.free.len());
    }

    /// Take back a specific range that lies inside one free block.
    fn claim(&mut self, range: ByteRange) -> bool {
        let Some(index) = self
            .free
            .iter()
            .position(|b| b.offset <= range.offset && range.end() <= b.end())
        else {
            return false;
        };
        let block = self.free[index];
        let before = ByteRange::new(block.offset, range.offset - block.offset);
        let after = ByteRange::new(range.end(), block.end() - range.end());
        self.free.remove(index);
        let mut at = index;
        for piece in [before, after] {
            if !piece.is_empty() {
                self.free.insert(at, piece);
                at += 1;
            }
        }
        self.used += range.size;
        true
    }
}

impl ByteRangeAllocator for FreeListAllocator {
    fn allocate(&mut self, size: u64) -> Result<ByteRange> {
        let size = align_up(size);
        if size == 0 {
            return Ok(ByteRange::EMPTY);
        }
        let Some(index) = self.free.iter().position(|r| r.size >= size) else {
            return Err(self.out_of_space(size));
        };

        let block = &mut self.free[index];
        let range = ByteRange::new(block.offset, size);
        if block.size == size {
            self.free.remove(index);
        } else {
            block.offset += size;
            block.size -= size;
        }
        self.used += size;
        Ok(range)
    }

    fn resize(&mut self, range: ByteRange, size: u64) -> Result<(ByteRange, AllocationFlags)> {
        let size = align_up(size);
        if range.is_empty() {
            let fresh = self.allocate(size)?;
            let flags = if fresh.is_empty() {
                AllocationFlags::empty()
            } else {
                AllocationFlags::REALLOCATED
            };
            return Ok((fresh, flags));
        }
        if size == range.size {
            return Ok((range, AllocationFlags::empty()));
        }

        if size < range.size {
            self.free(ByteRange::new(range.offset + size, range.size - size));
            let kept = if size == 0 {
                ByteRange::EMPTY
            } else {
                ByteRange::new(range.offset, size)
            };
            return Ok((kept, AllocationFlags::empty()));
        }

        // Grow in place into a free block right after the range.
        let extra = size - range.size;
        let next = self.free.partition_point(|r| r.offset < range.end());
        if self
            .free
            .get(next)
            .is_some_and(|b| b.offset == range.end() && b.size >= extra)
        {
            let block = &mut self.free[next];
            if block.size == extra {
                self.free.remove(next);
            } else {
                block.offset += extra;
                block.size -= extra;
            }
            self.used += extra;
            return Ok((ByteRange::new(range.offset, size), AllocationFlags::empty()));
        }

        // Move. Freeing first lets the new range overlap the old one.
        self.free(range);
        match self.allocate(size) {
            Ok(moved) => Ok((moved, AllocationFlags::REALLOCATED)),
            Err(err) => {
                let reclaimed = self.claim(range);
                debug_assert!(reclaimed, "freed range must still be free");
                Err(err)
            }
        }
    }

    fn free(&mut self, range: ByteRange) {
        let size = align_up(range.size);
        if size == 0 {
            return;
        }
        self.used -= size;
        self.insert_free(ByteRange::new(range.offset, size));
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn used(&self) -> u64 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_sequential() {
        let mut alloc = FreeListAllocator::new(1024);
        let a = alloc.allocate(5).unwrap();
        let b = alloc.allocate(16).unwrap();
        assert_eq!(a, ByteRange::new(0, 8));
        assert_eq!(b, ByteRange::new(8, 16));
        assert_eq!(alloc.used(), 24);
        assert_eq!(alloc.allocate(0).unwrap(), ByteRange::EMPTY);
        assert_eq!(alloc.used(), 24);
    }

    #[test]
    fn out_of_space_reports_request() {
        let mut alloc = FreeListAllocator::new(64);
        alloc.allocate(60).unwrap();
        assert_eq!(
            alloc.allocate(8),
            Err(AllocError::OutOfSpace {
                requested: 8,
                available: 4
            })
        );
    }

    #[test]
    fn free_coalesces_neighbours() {
        let mut alloc = FreeListAllocator::new(96);
        let a = alloc.allocate(32).unwrap();
        let b = alloc.allocate(32).unwrap();
        let c = alloc.allocate(32).unwrap();
        alloc.free(a);
        alloc.free(c);
        assert_eq!(alloc.free_blocks().len(), 2);
        alloc.free(b);
        assert_eq!(alloc.free_blocks(), &[ByteRange::new(0, 96)]);
        assert_eq!(alloc.used(), 0);
    }

    #[test]
    fn first_fit_reuses_holes() {
        let mut alloc = FreeListAllocator::new(256);
        let a = alloc.allocate(32).unwrap();
        let _b = alloc.allocate(32).unwrap();
        alloc.free(a);
        assert_eq!(alloc.allocate(16).unwrap(), ByteRange::new(0, 16));
    }

    #[test]
    fn resize_shrinks_and_grows_in_place() {
        let mut alloc = FreeListAllocator::new(256);
        let a = alloc.allocate(64).unwrap();

        let (a, flags) = alloc.resize(a, 32).unwrap();
        assert_eq!(a, ByteRange::new(0, 32));
        assert!(flags.is_empty());
        assert_eq!(alloc.used(), 32);

        let (a, flags) = alloc.resize(a, 128).unwrap();
        assert_eq!(a, ByteRange::new(0, 128));
        assert!(!flags.contains(AllocationFlags::REALLOCATED));
        assert_eq!(alloc.used(), 128);
    }

    #[test]
    fn resize_moves_when_blocked() {
        let mut alloc = FreeListAllocator::new(256);
        let a = alloc.allocate(32).unwrap();
        let _b = alloc.allocate(32).unwrap();

        let (moved, flags) = alloc.resize(a, 64).unwrap();
        assert!(flags.contains(AllocationFlags::REALLOCATED));
        assert_eq!(moved, ByteRange::new(64, 64));
        assert_eq!(alloc.used(), 96);
        // The old bytes are free again.
        assert_eq!(alloc.free_blocks()[0], ByteRange::new(0, 32));
    }

    #[test]
    fn failed_resize_keeps_range() {
        let mut alloc = FreeListAllocator::new(96);
        let a = alloc.allocate(32).unwrap();
        let _b = alloc.allocate(32).unwrap();
        let err = alloc.resize(a, 80);
        assert!(err.is_err());
        assert_eq!(alloc.used(), 64);
        // `a` is still allocated: the only free block is the tail.
        assert_eq!(alloc.free_blocks(), &[ByteRange::new(64, 32)]);
    }

    #[test]
    fn resize_from_empty_is_fresh() {
        let mut alloc = FreeListAllocator::new(64);
        let (range, flags) = alloc.resize(ByteRange::EMPTY, 12).unwrap();
        assert_eq!(range, ByteRange::new(0, 12));
        assert_eq!(flags, AllocationFlags::REALLOCATED);
    }
}
