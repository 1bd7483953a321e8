use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use iopack_layout::Placement;
use iopack_types::ContentHash;
use tracing::info;

use crate::compression::CompressionMethod;
use crate::error::{ContainerError, ContainerResult};
use crate::sink::EncodedChunk;
use crate::toc::{Toc, TocEntry, ENTRY_COMPRESSED, ENTRY_MEMORY_MAPPED};

/// Result of writing a container file.
#[derive(Clone, Debug)]
pub struct WrittenContainer {
    pub path: PathBuf,
    pub toc: Toc,
    pub file_size: u64,
    pub checksum: ContentHash,
}

/// Writes placed chunks into a container file:
/// TOC, padding up to the data offset, the data region, BLAKE3 trailer.
pub struct ContainerWriter {
    compression: CompressionMethod,
    data_alignment: u64,
}

impl ContainerWriter {
    /// `data_alignment` should be the memory-mapping alignment so that chunk
    /// alignment inside the data region carries over to the file.
    pub fn new(compression: CompressionMethod, data_alignment: u64) -> Self {
        Self {
            compression,
            data_alignment: data_alignment.max(1),
        }
    }

    /// Write `chunks` at the offsets in `placement` (which lists them in the
    /// same order). The file appears at `path` only once complete.
    pub fn write(
        &self,
        path: &Path,
        placement: &Placement,
        chunks: &[EncodedChunk],
    ) -> ContainerResult<WrittenContainer> {
        if placement.chunks.len() != chunks.len() {
            return Err(ContainerError::corrupt(format!(
                "placement covers {} chunks, {} were written",
                placement.chunks.len(),
                chunks.len()
            )));
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for (placed, chunk) in placement.chunks.iter().zip(chunks) {
            if placed.id != chunk.info.id || placed.size != chunk.stored_size() {
                return Err(ContainerError::corrupt(format!(
                    "placement for {} does not match the chunk",
                    chunk.info.id
                )));
            }
            let mut flags = 0;
            if chunk.info.compressed {
                flags |= ENTRY_COMPRESSED;
            }
            if chunk.info.chunk_type().is_memory_mappable() {
                flags |= ENTRY_MEMORY_MAPPED;
            }
            entries.push(TocEntry {
                id: chunk.info.id,
                offset: placed.offset,
                stored_size: chunk.stored_size(),
                raw_size: chunk.info.raw_size,
                hash: chunk.info.hash,
                flags,
                crc32: crc32fast::hash(&chunk.data),
            });
        }

        let mut toc = Toc::build(self.compression, entries);
        toc.data_size = placement.total_size;
        toc.data_offset = (toc.to_bytes().len() as u64).div_ceil(self.data_alignment) * self.data_alignment;
        let toc_bytes = toc.to_bytes();

        let tmp = path.with_extension("tmp");
        let result = self.write_file(&tmp, &toc, &toc_bytes, placement, chunks);
        let (file_size, checksum) = match result {
            Ok(done) => done,
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                return Err(err);
            }
        };
        fs::rename(&tmp, path)?;

        info!(
            path = %path.display(),
            chunks = toc.len(),
            bytes = file_size,
            compression = %self.compression,
            "wrote container"
        );
        Ok(WrittenContainer {
            path: path.to_path_buf(),
            toc,
            file_size,
            checksum,
        })
    }

    fn write_file(
        &self,
        path: &Path,
        toc: &Toc,
        toc_bytes: &[u8],
        placement: &Placement,
        chunks: &[EncodedChunk],
    ) -> ContainerResult<(u64, ContentHash)> {
        let file = File::create(path)?;
        let mut out = HashingWriter::new(BufWriter::new(file));

        out.write_all(toc_bytes)?;
        out.zeros(toc.data_offset - toc_bytes.len() as u64)?;

        let mut order: Vec<usize> = (0..chunks.len()).collect();
        order.sort_by_key(|&i| placement.chunks[i].offset);
        let mut cursor = 0u64;
        for i in order {
            let placed = &placement.chunks[i];
            if placed.offset < cursor {
                return Err(ContainerError::corrupt(format!(
                    "chunk {} overlaps the previous chunk",
                    placed.id
                )));
            }
            out.zeros(placed.offset - cursor)?;
            out.write_all(&chunks[i].data)?;
            cursor = placed.offset + placed.size;
        }
        out.zeros(toc.data_size.saturating_sub(cursor))?;

        let (mut inner, written, checksum) = out.finish();
        inner.write_all(checksum.as_bytes())?;
        let file = inner.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok((written + checksum.as_bytes().len() as u64, checksum))
    }
}

/// Forwards writes and feeds them into a BLAKE3 hasher.
struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            written: 0,
        }
    }

    fn zeros(&mut self, count: u64) -> io::Result<()> {
        io::copy(&mut io::repeat(0).take(count), self)?;
        Ok(())
    }

    fn finish(self) -> (W, u64, ContentHash) {
        let hash = ContentHash::from_hash(*self.hasher.finalize().as_bytes());
        (self.inner, self.written, hash)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
