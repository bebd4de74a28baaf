//! Clone pipeline error types.

use thiserror::Error;

/// Errors that can occur while fetching and decoding a repository.
///
/// Every variant aborts the clone; there is no retry or partial result.
#[derive(Debug, Error)]
pub enum GitError {
    /// The remote could not be reached or answered with a non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed pkt-line framing, missing PACK marker or bad pack header.
    #[error("protocol framing error: {0}")]
    ProtocolFraming(String),

    /// The remote answered with well-formed but unusable content.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Pack entry type outside {commit, tree, blob, ref-delta}.
    #[error("unknown object type in pack: {0}")]
    UnknownObjectType(u8),

    /// A compressed payload was corrupt or truncated.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// A delta instruction stream was malformed.
    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    /// A tree payload was malformed.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// Object not found.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The clone destination cannot be derived or is already taken.
    #[error("invalid destination: {0}")]
    Destination(String),

    /// Storage or filesystem error.
    #[error("storage error: {0}")]
    Storage(#[from] packrat_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for GitError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
