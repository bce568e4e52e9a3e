//! Allocation error types.

use thiserror::Error;

/// Byte-range allocation errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free block is large enough.
    #[error("Out of space: requested {requested} bytes with {available} bytes free")]
    OutOfSpace { requested: u64, available: u64 },
}

/// Result type for allocator operations.
pub type Result<T> = std::result::Result<T, AllocError>;
