//! Release snapshot: the layout of a finished container, kept so the next
//! build can reuse chunk offsets.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use iopack_types::{ChunkId, ContentHash, PackageId};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{LayoutError, LayoutResult};

pub const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_EXTENSION: &str = "release";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPackage {
    pub name: String,
    pub id: PackageId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotChunk {
    pub id: ChunkId,
    pub hash: ContentHash,
    pub offset: u64,
    /// Stored (possibly compressed) size.
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSnapshot {
    pub version: u32,
    pub container: String,
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub packages: Vec<SnapshotPackage>,
    pub chunks: Vec<SnapshotChunk>,
}

impl ReleaseSnapshot {
    pub fn new(container: impl Into<String>, build_id: Uuid) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            container: container.into(),
            build_id,
            created_at: Utc::now(),
            packages: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// `<dir>/<container>.release`
    pub fn path_for(dir: &Path, container: &str) -> PathBuf {
        dir.join(format!("{container}.{SNAPSHOT_EXTENSION}"))
    }

    pub fn to_bytes(&self) -> LayoutResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> LayoutResult<Self> {
        let snapshot: Self = bincode::deserialize(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LayoutError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> LayoutResult<()> {
        fs::write(path, self.to_bytes()?)?;
        info!(
            path = %path.display(),
            chunks = self.chunks.len(),
            "wrote release snapshot"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> LayoutResult<Self> {
        let snapshot = Self::from_bytes(&fs::read(path)?)?;
        info!(
            path = %path.display(),
            container = %snapshot.container,
            build = %snapshot.build_id,
            chunks = snapshot.chunks.len(),
            "loaded previous release"
        );
        Ok(snapshot)
    }

    /// Chunks keyed by id.
    pub fn chunk_map(&self) -> HashMap<ChunkId, SnapshotChunk> {
        self.chunks.iter().map(|c| (c.id, *c)).collect()
    }
}
