use iopack_layout::LayoutError;
use iopack_types::{ChunkId, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt container data: {0}")]
    Corrupt(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("CRC mismatch for chunk {0}")]
    CrcMismatch(ChunkId),

    #[error("content hash mismatch for chunk {0}")]
    HashMismatch(ChunkId),

    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkId),

    #[error("chunk {0} written twice")]
    DuplicateChunk(ChunkId),

    #[error("unknown compression method: {0}")]
    UnknownCompression(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// A chunk could not be stored. Fatal for the whole build.
    #[error("write failed for {target}: {reason}")]
    WriteFailed { target: String, reason: String },

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt(reason.into())
    }

    pub fn write_failed(target: impl ToString, reason: impl ToString) -> Self {
        Self::WriteFailed {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<TypeError> for ContainerError {
    fn from(err: TypeError) -> Self {
        Self::Corrupt(err.to_string())
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;
