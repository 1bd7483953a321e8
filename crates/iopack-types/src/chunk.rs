use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::PackageId;

/// Kind of payload stored in a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChunkType {
    /// Store header followed by export data in bundle order.
    ExportBundleData,
    /// Bulk data loaded on demand.
    BulkData,
    /// Bulk data that may be absent at runtime.
    OptionalBulkData,
    /// Bulk data read through a memory mapping.
    MemoryMappedBulkData,
    /// Per-container package directory.
    ContainerHeader,
    /// Global name batch.
    GlobalNames,
    /// Hashes of the global name batch.
    GlobalNameHashes,
    /// Global import table.
    GlobalImports,
    /// Script arcs and script import outers.
    InitialLoadMeta,
}

impl ChunkType {
    /// Wire byte for this chunk type.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::ExportBundleData => 1,
            Self::BulkData => 2,
            Self::OptionalBulkData => 3,
            Self::MemoryMappedBulkData => 4,
            Self::ContainerHeader => 5,
            Self::GlobalNames => 6,
            Self::GlobalNameHashes => 7,
            Self::GlobalImports => 8,
            Self::InitialLoadMeta => 9,
        }
    }

    /// Parse from a wire byte.
    pub fn from_type_byte(byte: u8) -> Result<Self, TypeError> {
        match byte {
            1 => Ok(Self::ExportBundleData),
            2 => Ok(Self::BulkData),
            3 => Ok(Self::OptionalBulkData),
            4 => Ok(Self::MemoryMappedBulkData),
            5 => Ok(Self::ContainerHeader),
            6 => Ok(Self::GlobalNames),
            7 => Ok(Self::GlobalNameHashes),
            8 => Ok(Self::GlobalImports),
            9 => Ok(Self::InitialLoadMeta),
            other => Err(TypeError::UnknownChunkType(other)),
        }
    }

    /// Chunks that must start on a memory-mapping boundary.
    pub fn is_memory_mappable(&self) -> bool {
        matches!(self, Self::MemoryMappedBulkData)
    }

    /// Chunks that carry bulk data rather than export data or metadata.
    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            Self::BulkData | Self::OptionalBulkData | Self::MemoryMappedBulkData
        )
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExportBundleData => "ExportBundleData",
            Self::BulkData => "BulkData",
            Self::OptionalBulkData => "OptionalBulkData",
            Self::MemoryMappedBulkData => "MemoryMappedBulkData",
            Self::ContainerHeader => "ContainerHeader",
            Self::GlobalNames => "GlobalNames",
            Self::GlobalNameHashes => "GlobalNameHashes",
            Self::GlobalImports => "GlobalImports",
            Self::InitialLoadMeta => "InitialLoadMeta",
        };
        f.write_str(name)
    }
}

/// Twelve byte chunk key.
///
/// Layout: package id (8 bytes, little endian), chunk index (2 bytes, big
/// endian), one zero byte, chunk type byte. The encoding is injective, so two
/// different `(package, index, type)` triples never produce the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId([u8; 12]);

impl ChunkId {
    pub const SIZE: usize = 12;

    /// Build the id of chunk `index` of type `chunk_type` owned by `package`.
    pub fn new(package: PackageId, index: u16, chunk_type: ChunkType) -> Self {
        let mut bytes = [0u8; 12];
        bytes[..8].copy_from_slice(&package.value().to_le_bytes());
        bytes[8..10].copy_from_slice(&index.to_be_bytes());
        bytes[11] = chunk_type.type_byte();
        Self(bytes)
    }

    /// Id of a container-wide chunk.
    pub fn global(chunk_type: ChunkType) -> Self {
        Self::new(PackageId::none(), 0, chunk_type)
    }

    /// Rebuild from raw bytes, validating the type byte.
    pub fn from_bytes(bytes: [u8; 12]) -> Result<Self, TypeError> {
        ChunkType::from_type_byte(bytes[11])?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn package_id(&self) -> PackageId {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        PackageId::from_raw(u64::from_le_bytes(prefix))
    }

    pub fn index(&self) -> u16 {
        u16::from_be_bytes([self.0[8], self.0[9]])
    }

    pub fn chunk_type(&self) -> ChunkType {
        // The type byte is validated on every construction path.
        ChunkType::from_type_byte(self.0[11]).unwrap_or(ChunkType::ExportBundleData)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 12] = bytes.as_slice().try_into().map_err(|_| TypeError::InvalidLength {
            expected: 12,
            actual: bytes.len(),
        })?;
        Self::from_bytes(arr)
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.to_hex())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_TYPES: [ChunkType; 9] = [
        ChunkType::ExportBundleData,
        ChunkType::BulkData,
        ChunkType::OptionalBulkData,
        ChunkType::MemoryMappedBulkData,
        ChunkType::ContainerHeader,
        ChunkType::GlobalNames,
        ChunkType::GlobalNameHashes,
        ChunkType::GlobalImports,
        ChunkType::InitialLoadMeta,
    ];

    #[test]
    fn type_bytes_roundtrip() {
        for ty in ALL_TYPES {
            assert_eq!(ChunkType::from_type_byte(ty.type_byte()).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_type_byte_rejected() {
        assert_eq!(
            ChunkType::from_type_byte(0),
            Err(TypeError::UnknownChunkType(0))
        );
        assert!(ChunkType::from_type_byte(200).is_err());
    }

    #[test]
    fn only_mapped_bulk_is_memory_mappable() {
        let mappable: Vec<_> = ALL_TYPES.iter().filter(|t| t.is_memory_mappable()).collect();
        assert_eq!(mappable, vec![&ChunkType::MemoryMappedBulkData]);
    }

    #[test]
    fn chunk_id_fields_are_recoverable() {
        let pkg = PackageId::from_name("/Game/Hero");
        let id = ChunkId::new(pkg, 3, ChunkType::BulkData);
        assert_eq!(id.package_id(), pkg);
        assert_eq!(id.index(), 3);
        assert_eq!(id.chunk_type(), ChunkType::BulkData);
    }

    #[test]
    fn global_chunk_has_no_package() {
        let id = ChunkId::global(ChunkType::GlobalNames);
        assert!(id.package_id().is_none());
        assert_eq!(id.chunk_type(), ChunkType::GlobalNames);
    }

    #[test]
    fn chunk_id_hex_roundtrip() {
        let id = ChunkId::new(PackageId::from_name("/Game/A"), 1, ChunkType::ExportBundleData);
        assert_eq!(ChunkId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn chunk_id_from_bytes_checks_type() {
        let mut bytes = [0u8; 12];
        bytes[11] = 77;
        assert!(ChunkId::from_bytes(bytes).is_err());
    }

    proptest! {
        #[test]
        fn chunk_id_is_deterministic(raw in any::<u64>(), index in any::<u16>(), t in 0usize..9) {
            let pkg = PackageId::from_raw(raw);
            prop_assert_eq!(
                ChunkId::new(pkg, index, ALL_TYPES[t]),
                ChunkId::new(pkg, index, ALL_TYPES[t])
            );
        }

        #[test]
        fn varying_any_input_changes_the_id(
            raw in any::<u64>(),
            other_raw in any::<u64>(),
            index in any::<u16>(),
            other_index in any::<u16>(),
            t in 0usize..9,
            other_t in 0usize..9,
        ) {
            let base = ChunkId::new(PackageId::from_raw(raw), index, ALL_TYPES[t]);
            if raw != other_raw {
                prop_assert_ne!(base, ChunkId::new(PackageId::from_raw(other_raw), index, ALL_TYPES[t]));
            }
            if index != other_index {
                prop_assert_ne!(base, ChunkId::new(PackageId::from_raw(raw), other_index, ALL_TYPES[t]));
            }
            if t != other_t {
                prop_assert_ne!(base, ChunkId::new(PackageId::from_raw(raw), index, ALL_TYPES[other_t]));
            }
        }
    }
}
