use std::fs;
use std::path::{Path, PathBuf};

use iopack_types::{ChunkId, ChunkType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compression::CompressionMethod;
use crate::error::ContainerResult;

/// Human-readable description of a container's chunks, written next to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerManifest {
    pub container: String,
    pub build_id: Uuid,
    pub compression: CompressionMethod,
    pub chunks: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Hex chunk id.
    pub id: String,
    pub chunk_type: ChunkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub offset: u64,
    pub stored_size: u64,
    pub raw_size: u64,
    /// Hex content hash of the raw payload.
    pub hash: String,
}

impl ContainerManifest {
    /// `<dir>/<container>.manifest.json`
    pub fn path_for(dir: &Path, container: &str) -> PathBuf {
        dir.join(format!("{container}.manifest.json"))
    }

    pub fn find(&self, id: &ChunkId) -> Option<&ManifestEntry> {
        let hex = id.to_hex();
        self.chunks.iter().find(|c| c.id == hex)
    }

    pub fn save(&self, path: &Path) -> ContainerResult<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> ContainerResult<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iopack_types::{ContentHash, PackageId};

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let id = ChunkId::new(PackageId::from_name("/Game/A"), 0, ChunkType::BulkData);
        let manifest = ContainerManifest {
            container: "base".into(),
            build_id: Uuid::now_v7(),
            compression: CompressionMethod::Zstd,
            chunks: vec![ManifestEntry {
                id: id.to_hex(),
                chunk_type: ChunkType::BulkData,
                package: Some("/Game/A".into()),
                source: Some(PathBuf::from("Content/A.pkgb")),
                offset: 0,
                stored_size: 10,
                raw_size: 12,
                hash: ContentHash::of(b"a").to_hex(),
            }],
        };
        let path = ContainerManifest::path_for(dir.path(), "base");
        manifest.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"compression\": \"zstd\""));
        assert!(text.contains("\"chunk_type\": \"BulkData\""));

        let loaded = ContainerManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.find(&id).unwrap().raw_size, 12);
    }
}
