use std::fs::File;
use std::path::{Path, PathBuf};

use iopack_hash::ContentHasher;
use iopack_types::{ChunkId, ContentHash};
use memmap2::Mmap;
use tracing::debug;

use crate::error::{ContainerError, ContainerResult};
use crate::toc::{Toc, TocEntry};

const CHECKSUM_SIZE: usize = 32;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub chunks: usize,
    pub stored_bytes: u64,
    pub raw_bytes: u64,
}

/// Random access to the chunks of a container file through a memory map.
#[derive(Debug)]
pub struct ContainerReader {
    path: PathBuf,
    mmap: Mmap,
    toc: Toc,
}

impl ContainerReader {
    pub fn open(path: &Path) -> ContainerResult<Self> {
        let file = File::open(path)?;
        // SAFETY: container files are never modified after they are renamed
        // into place, and the map is read-only.
        let mmap = unsafe { Mmap::map(&file)? };
        let (toc, toc_len) = Toc::parse(&mmap)?;

        let expected = toc
            .data_offset
            .checked_add(toc.data_size)
            .and_then(|end| end.checked_add(CHECKSUM_SIZE as u64));
        if toc.data_offset < toc_len as u64 || expected != Some(mmap.len() as u64) {
            return Err(ContainerError::corrupt(format!(
                "{}: data region does not match the file size {}",
                path.display(),
                mmap.len()
            )));
        }
        debug!(path = %path.display(), chunks = toc.len(), "opened container");
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            toc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.toc.entries
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.toc.contains(id)
    }

    /// Stored bytes of a chunk, without any checks.
    pub fn stored(&self, entry: &TocEntry) -> &[u8] {
        let start = (self.toc.data_offset + entry.offset) as usize;
        &self.mmap[start..start + entry.stored_size as usize]
    }

    /// Read, check and decompress a chunk.
    pub fn read_chunk(&self, id: &ChunkId) -> ContainerResult<Vec<u8>> {
        let entry = self
            .toc
            .lookup(id)
            .ok_or(ContainerError::ChunkNotFound(*id))?;
        self.read_entry(entry)
    }

    fn read_entry(&self, entry: &TocEntry) -> ContainerResult<Vec<u8>> {
        let stored = self.stored(entry);
        if crc32fast::hash(stored) != entry.crc32 {
            return Err(ContainerError::CrcMismatch(entry.id));
        }
        let raw = if entry.is_compressed() {
            self.toc.compression.decompress(stored, entry.raw_size)?
        } else {
            stored.to_vec()
        };
        if !ContentHasher::CHUNK.verify(&raw, &entry.hash) {
            return Err(ContainerError::HashMismatch(entry.id));
        }
        Ok(raw)
    }

    /// Check the file checksum, then every chunk.
    pub fn verify(&self) -> ContainerResult<VerifyReport> {
        let body_len = self.mmap.len() - CHECKSUM_SIZE;
        let actual = ContentHash::from_hash(*blake3::hash(&self.mmap[..body_len]).as_bytes());
        let mut expected = [0u8; CHECKSUM_SIZE];
        expected.copy_from_slice(&self.mmap[body_len..]);
        let expected = ContentHash::from_hash(expected);
        if actual != expected {
            return Err(ContainerError::ChecksumMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let mut report = VerifyReport::default();
        for entry in &self.toc.entries {
            let raw = self.read_entry(entry)?;
            report.chunks += 1;
            report.stored_bytes += entry.stored_size;
            report.raw_bytes += raw.len() as u64;
        }
        debug!(path = %self.path.display(), chunks = report.chunks, "verified container");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionMethod;
    use crate::sink::EncodedChunk;
    use crate::writer::ContainerWriter;
    use iopack_layout::{ChunkPlacer, ChunkRequest, LayoutConfig};
    use iopack_types::{ChunkType, PackageId};

    fn chunks(method: CompressionMethod) -> Vec<EncodedChunk> {
        let a = PackageId::from_name("/Game/A");
        let b = PackageId::from_name("/Game/B");
        vec![
            EncodedChunk::encode(
                ChunkId::new(a, 0, ChunkType::ExportBundleData),
                vec![1u8; 3000],
                method,
                Some("/Game/A".into()),
                None,
            )
            .unwrap(),
            EncodedChunk::encode(
                ChunkId::new(b, 0, ChunkType::ExportBundleData),
                b"tiny".to_vec(),
                method,
                Some("/Game/B".into()),
                None,
            )
            .unwrap(),
            EncodedChunk::encode(
                ChunkId::new(a, 0, ChunkType::MemoryMappedBulkData),
                (0..5000u32).map(|i| (i % 251) as u8).collect(),
                method,
                Some("/Game/A".into()),
                None,
            )
            .unwrap(),
        ]
    }

    fn write(dir: &Path, method: CompressionMethod) -> (PathBuf, Vec<EncodedChunk>) {
        let config = LayoutConfig {
            compression_block_size: 4096,
            memory_mapping_alignment: 1024,
            ..LayoutConfig::default()
        };
        let chunks = chunks(method);
        let requests: Vec<ChunkRequest> = chunks
            .iter()
            .map(|c| ChunkRequest {
                id: c.info.id,
                hash: c.info.hash,
                size: c.stored_size(),
                memory_mapped: c.info.chunk_type().is_memory_mappable(),
            })
            .collect();
        let placement = ChunkPlacer::new(config.clone()).place(&requests, None);
        let path = dir.join("base.iopak");
        ContainerWriter::new(method, config.memory_mapping_alignment)
            .write(&path, &placement, &chunks)
            .unwrap();
        (path, chunks)
    }

    #[test]
    fn reads_back_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        for method in [CompressionMethod::None, CompressionMethod::Zstd] {
            let (path, chunks) = write(dir.path(), method);
            let reader = ContainerReader::open(&path).unwrap();
            assert_eq!(reader.toc().compression, method);
            assert_eq!(reader.entries().len(), 3);
            assert_eq!(reader.read_chunk(&chunks[0].info.id).unwrap(), vec![1u8; 3000]);
            assert_eq!(reader.read_chunk(&chunks[1].info.id).unwrap(), b"tiny");

            let report = reader.verify().unwrap();
            assert_eq!(report.chunks, 3);
            assert_eq!(report.raw_bytes, 3000 + 4 + 5000);
        }
    }

    #[test]
    fn memory_mapped_chunks_are_aligned_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (path, chunks) = write(dir.path(), CompressionMethod::None);
        let reader = ContainerReader::open(&path).unwrap();
        let entry = reader.toc().lookup(&chunks[2].info.id).unwrap();
        assert!(entry.is_memory_mapped());
        assert_eq!((reader.toc().data_offset + entry.offset) % 1024, 0);
    }

    #[test]
    fn missing_chunk_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = write(dir.path(), CompressionMethod::Zstd);
        let reader = ContainerReader::open(&path).unwrap();
        let id = ChunkId::global(ChunkType::GlobalNames);
        assert!(matches!(reader.read_chunk(&id), Err(ContainerError::ChunkNotFound(_))));
    }

    #[test]
    fn verify_detects_a_flipped_byte() {
        let dir = tempfile::tempdir().unwrap();
        let (path, chunks) = write(dir.path(), CompressionMethod::None);
        let offset = {
            let reader = ContainerReader::open(&path).unwrap();
            let entry = reader.toc().lookup(&chunks[1].info.id).unwrap();
            (reader.toc().data_offset + entry.offset) as usize
        };
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[offset] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        assert!(matches!(reader.verify(), Err(ContainerError::ChecksumMismatch { .. })));
        assert!(matches!(
            reader.read_chunk(&chunks[1].info.id),
            Err(ContainerError::CrcMismatch(_))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = write(dir.path(), CompressionMethod::Zstd);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(ContainerReader::open(&path), Err(ContainerError::Corrupt(_))));
    }
}
