//! Destination of finished chunks.

use std::path::PathBuf;

use bytes::Bytes;
use iopack_hash::ContentHasher;
use iopack_types::{ChunkId, ChunkType, ContentHash, PackageId};

use crate::compression::CompressionMethod;
use crate::error::ContainerResult;

/// Everything a sink needs to know about a chunk besides its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkInfo {
    pub id: ChunkId,
    /// Hash of the raw payload.
    pub hash: ContentHash,
    pub raw_size: u64,
    /// The bytes handed to the sink are compressed.
    pub compressed: bool,
    /// Owning package, `None` for container-level chunks.
    pub package: Option<String>,
    /// File the payload was read from, for bulk data.
    pub source: Option<PathBuf>,
}

impl ChunkInfo {
    pub fn chunk_type(&self) -> ChunkType {
        self.id.chunk_type()
    }
}

/// A hashed and (possibly) compressed chunk.
#[derive(Clone, Debug)]
pub struct EncodedChunk {
    pub info: ChunkInfo,
    /// Stored bytes.
    pub data: Bytes,
}

impl EncodedChunk {
    pub fn encode(
        id: ChunkId,
        raw: Vec<u8>,
        compression: CompressionMethod,
        package: Option<String>,
        source: Option<PathBuf>,
    ) -> ContainerResult<Self> {
        let hash = ContentHasher::CHUNK.hash(&raw);
        // memory-mapped chunks are read in place and must stay raw
        let compression = if id.chunk_type().is_memory_mappable() {
            CompressionMethod::None
        } else {
            compression
        };
        let raw_size = raw.len() as u64;
        let (data, compressed) = match compression.compress(&raw)? {
            Some(stored) => (Bytes::from(stored), true),
            None => (Bytes::from(raw), false),
        };
        Ok(Self {
            info: ChunkInfo {
                id,
                hash,
                raw_size,
                compressed,
                package,
                source,
            },
            data,
        })
    }

    pub fn stored_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Identifies a finished package when it is committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub id: PackageId,
    pub chunk_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub container: String,
    pub packages: usize,
    pub chunks: usize,
    /// Stored bytes of all chunks.
    pub bytes_written: u64,
    pub reused_chunks: usize,
    pub layout_conflicts: usize,
    /// Container file, for sinks that produce one.
    pub path: Option<PathBuf>,
}

/// Receives the chunks of one container.
///
/// Package chunks arrive between `begin_package` and `commit_package`;
/// container-level chunks may be written outside any package. Nothing is
/// guaranteed to be durable before `flush` returns.
pub trait ChunkSink: Send {
    fn begin_package(&mut self, name: &str) -> ContainerResult<()>;

    fn write_package_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()>;

    fn write_bulk_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()>;

    fn commit_package(&mut self, info: &PackageInfo) -> ContainerResult<()>;

    fn flush(&mut self) -> ContainerResult<SinkReport>;

    /// Write an encoded chunk through the matching method.
    fn write_chunk(&mut self, chunk: EncodedChunk) -> ContainerResult<()> {
        if chunk.info.chunk_type().is_bulk() {
            self.write_bulk_data(chunk.info, chunk.data)
        } else {
            self.write_package_data(chunk.info, chunk.data)
        }
    }
}
