use iopack_types::{PackageId, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    /// The header is malformed. Fatal for the package, never for the batch.
    #[error("corrupt package header: {0}")]
    CorruptHeader(String),

    #[error("invalid header magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported header version: {0}")]
    UnsupportedVersion(u32),

    #[error("duplicate package {name} ({id})")]
    DuplicatePackage { name: String, id: PackageId },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackageError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptHeader(reason.into())
    }
}

impl From<TypeError> for PackageError {
    fn from(err: TypeError) -> Self {
        Self::CorruptHeader(err.to_string())
    }
}

pub type PackageResult<T> = Result<T, PackageError>;
