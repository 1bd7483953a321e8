//! Table of contents at the front of a container file.
//!
//! ```text
//! magic "IOPK" | version u32 | compression name (varint + utf-8)
//! entry count u32 | data offset u64 | data size u64
//! fan-out [u32; 256]                  entries with first id byte <= i
//! entries, sorted by chunk id:
//!     id [12] | offset u64 | stored size u64 | raw size u64
//!     content hash [32] | flags u8 | crc32 u32
//! ```
//!
//! Entry offsets are relative to the data offset. All integers big-endian.

use iopack_types::{ByteReader, ByteWriter, ChunkId, ContentHash};

use crate::compression::CompressionMethod;
use crate::error::{ContainerError, ContainerResult};

pub const CONTAINER_MAGIC: &[u8; 4] = b"IOPK";
pub const CONTAINER_VERSION: u32 = 1;
pub const CONTAINER_EXTENSION: &str = "iopak";

const ENTRY_SIZE: usize = ChunkId::SIZE + 8 + 8 + 8 + 32 + 1 + 4;

/// The stored bytes are compressed with the container's method.
pub const ENTRY_COMPRESSED: u8 = 0x1;
/// The chunk starts on a memory-mapping boundary.
pub const ENTRY_MEMORY_MAPPED: u8 = 0x2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TocEntry {
    pub id: ChunkId,
    pub offset: u64,
    pub stored_size: u64,
    pub raw_size: u64,
    /// Hash of the raw (uncompressed) payload.
    pub hash: ContentHash,
    pub flags: u8,
    /// CRC32 of the stored bytes.
    pub crc32: u32,
}

impl TocEntry {
    pub fn is_compressed(&self) -> bool {
        self.flags & ENTRY_COMPRESSED != 0
    }

    pub fn is_memory_mapped(&self) -> bool {
        self.flags & ENTRY_MEMORY_MAPPED != 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toc {
    pub compression: CompressionMethod,
    pub data_offset: u64,
    pub data_size: u64,
    pub fan_out: [u32; 256],
    pub entries: Vec<TocEntry>,
}

impl Toc {
    /// Sort `entries` by chunk id and build the fan-out table.
    pub fn build(compression: CompressionMethod, mut entries: Vec<TocEntry>) -> Self {
        entries.sort_by_key(|e| e.id);
        Self {
            compression,
            data_offset: 0,
            data_size: 0,
            fan_out: fan_out(&entries),
            entries,
        }
    }

    pub fn lookup(&self, id: &ChunkId) -> Option<&TocEntry> {
        let first = id.as_bytes()[0] as usize;
        let start = if first == 0 {
            0
        } else {
            self.fan_out[first - 1] as usize
        };
        let end = self.fan_out[first] as usize;
        let range = self.entries.get(start..end)?;
        range
            .binary_search_by(|probe| probe.id.cmp(id))
            .ok()
            .map(|pos| &range[pos])
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.lookup(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(64 + 1024 + self.entries.len() * ENTRY_SIZE);
        w.write_bytes(CONTAINER_MAGIC);
        w.write_u32(CONTAINER_VERSION);
        w.write_string(self.compression.name());
        w.write_u32(self.entries.len() as u32);
        w.write_u64(self.data_offset);
        w.write_u64(self.data_size);
        for &count in &self.fan_out {
            w.write_u32(count);
        }
        for entry in &self.entries {
            w.write_bytes(entry.id.as_bytes());
            w.write_u64(entry.offset);
            w.write_u64(entry.stored_size);
            w.write_u64(entry.raw_size);
            w.write_bytes(entry.hash.as_bytes());
            w.write_u8(entry.flags);
            w.write_u32(entry.crc32);
        }
        w.into_inner()
    }

    /// Parse a TOC from the start of `data`. Returns the TOC and its encoded length.
    pub fn parse(data: &[u8]) -> ContainerResult<(Self, usize)> {
        let mut r = ByteReader::new(data);
        let magic = r.read_array::<4>()?;
        if &magic != CONTAINER_MAGIC {
            return Err(ContainerError::InvalidMagic {
                expected: String::from_utf8_lossy(CONTAINER_MAGIC).into(),
                actual: String::from_utf8_lossy(&magic).into(),
            });
        }
        let version = r.read_u32()?;
        if version != CONTAINER_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let compression: CompressionMethod = r.read_string()?.parse()?;
        let count = r.read_u32()? as usize;
        let data_offset = r.read_u64()?;
        let data_size = r.read_u64()?;

        let mut fan_out = [0u32; 256];
        for slot in &mut fan_out {
            *slot = r.read_u32()?;
        }
        if count.saturating_mul(ENTRY_SIZE) > r.remaining() {
            return Err(ContainerError::corrupt(format!(
                "TOC declares {count} entries but only {} bytes follow",
                r.remaining()
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let id = ChunkId::from_bytes(r.read_array::<12>()?)?;
            entries.push(TocEntry {
                id,
                offset: r.read_u64()?,
                stored_size: r.read_u64()?,
                raw_size: r.read_u64()?,
                hash: ContentHash::from_hash(r.read_array::<32>()?),
                flags: r.read_u8()?,
                crc32: r.read_u32()?,
            });
        }

        if entries.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(ContainerError::corrupt("TOC entries are not sorted"));
        }
        if fan_out != self::fan_out(&entries) {
            return Err(ContainerError::corrupt("TOC fan-out table does not match entries"));
        }
        if let Some(entry) = entries
            .iter()
            .find(|e| e.offset.checked_add(e.stored_size).map_or(true, |end| end > data_size))
        {
            return Err(ContainerError::corrupt(format!(
                "chunk {} lies outside the data region",
                entry.id
            )));
        }

        let toc = Self {
            compression,
            data_offset,
            data_size,
            fan_out,
            entries,
        };
        Ok((toc, r.position()))
    }
}

fn fan_out(sorted: &[TocEntry]) -> [u32; 256] {
    let mut fan_out = [0u32; 256];
    for entry in sorted {
        fan_out[entry.id.as_bytes()[0] as usize] += 1;
    }
    let mut total = 0;
    for slot in &mut fan_out {
        total += *slot;
        *slot = total;
    }
    fan_out
}
