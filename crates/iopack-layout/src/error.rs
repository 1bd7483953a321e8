use std::path::PathBuf;

use iopack_types::ChunkId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("{path}:{line}: invalid order hint: {reason}")]
    InvalidHint {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid layout config: {0}")]
    InvalidConfig(String),

    /// A chunk's previous offset overlaps another reused chunk. Recoverable:
    /// the placer logs it and places the chunk as new.
    #[error("layout conflict: chunk {chunk} overlaps a reused chunk at offset {offset}")]
    LayoutConflict { chunk: ChunkId, offset: u64 },

    #[error("release snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for LayoutError {
    fn from(err: bincode::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}

pub type LayoutResult<T> = Result<T, LayoutError>;
