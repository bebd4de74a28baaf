//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A filesystem operation failed.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Compressing or decompressing a loose object failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// An object or identifier was malformed.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// A tree entry name cannot be written safely to disk.
    #[error("unsafe path in tree entry: {0:?}")]
    UnsafePath(String),
}

impl StorageError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
