//! Error types shared across the workspace.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed voxel or config data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A fixed-size table, such as a palette, cannot hold the request.
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// The generation worker pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, Error>;
