//! Sink that lays chunks out and writes a container file to disk.

use std::collections::HashSet;
use std::fs;
use std::mem;
use std::path::PathBuf;

use bytes::Bytes;
use iopack_layout::{
    ChunkPlacer, ChunkRequest, LayoutConfig, ReleaseSnapshot, SnapshotChunk, SnapshotPackage,
};
use iopack_types::{ChunkId, PackageId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compression::CompressionMethod;
use crate::error::{ContainerError, ContainerResult};
use crate::manifest::{ContainerManifest, ManifestEntry};
use crate::sink::{ChunkInfo, ChunkSink, EncodedChunk, PackageInfo, SinkReport};
use crate::toc::CONTAINER_EXTENSION;
use crate::writer::ContainerWriter;

#[derive(Clone, Debug)]
pub struct LocalSinkConfig {
    pub output_dir: PathBuf,
    pub container: String,
    pub layout: LayoutConfig,
    pub compression: CompressionMethod,
    pub build_id: Uuid,
    /// Layout of the previous release, for offset reuse.
    pub previous: Option<ReleaseSnapshot>,
    /// Write `<container>.release` for the next build.
    pub write_snapshot: bool,
}

/// Buffers the chunks of one container and writes the container file,
/// its manifest and optionally a release snapshot on `flush`.
///
/// Chunks are laid out in the order they arrive.
pub struct LocalFileSink {
    config: LocalSinkConfig,
    chunks: Vec<EncodedChunk>,
    ids: HashSet<ChunkId>,
    current: Option<String>,
    packages: Vec<SnapshotPackage>,
}

impl LocalFileSink {
    pub fn new(config: LocalSinkConfig) -> ContainerResult<Self> {
        config.layout.validate()?;
        fs::create_dir_all(&config.output_dir)?;
        Ok(Self {
            config,
            chunks: Vec::new(),
            ids: HashSet::new(),
            current: None,
            packages: Vec::new(),
        })
    }

    pub fn container_path(&self) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.{CONTAINER_EXTENSION}", self.config.container))
    }

    fn push(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        if !self.ids.insert(info.id) {
            return Err(ContainerError::DuplicateChunk(info.id));
        }
        debug!(
            container = %self.config.container,
            chunk = %info.id,
            chunk_type = %info.chunk_type(),
            size = data.len(),
            "buffered chunk"
        );
        self.chunks.push(EncodedChunk { info, data });
        Ok(())
    }

    fn manifest(&self, chunks: &[EncodedChunk], offsets: &[u64]) -> ContainerManifest {
        ContainerManifest {
            container: self.config.container.clone(),
            build_id: self.config.build_id,
            compression: self.config.compression,
            chunks: chunks
                .iter()
                .zip(offsets)
                .map(|(chunk, &offset)| ManifestEntry {
                    id: chunk.info.id.to_hex(),
                    chunk_type: chunk.info.chunk_type(),
                    package: chunk.info.package.clone(),
                    source: chunk.info.source.clone(),
                    offset,
                    stored_size: chunk.stored_size(),
                    raw_size: chunk.info.raw_size,
                    hash: chunk.info.hash.to_hex(),
                })
                .collect(),
        }
    }
}

impl ChunkSink for LocalFileSink {
    fn begin_package(&mut self, name: &str) -> ContainerResult<()> {
        if let Some(open) = &self.current {
            return Err(ContainerError::write_failed(
                name,
                format!("package {open} is still open"),
            ));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    fn write_package_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        self.push(info, data)
    }

    fn write_bulk_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        self.push(info, data)
    }

    fn commit_package(&mut self, info: &PackageInfo) -> ContainerResult<()> {
        match self.current.take() {
            Some(open) if open == info.name => {
                self.packages.push(SnapshotPackage {
                    name: info.name.clone(),
                    id: info.id,
                });
                Ok(())
            }
            other => Err(ContainerError::write_failed(
                &info.name,
                format!("commit without matching begin (open: {other:?})"),
            )),
        }
    }

    fn flush(&mut self) -> ContainerResult<SinkReport> {
        let chunks = mem::take(&mut self.chunks);
        self.ids.clear();
        let packages = mem::take(&mut self.packages);

        let requests: Vec<ChunkRequest> = chunks
            .iter()
            .map(|c| ChunkRequest {
                id: c.info.id,
                hash: c.info.hash,
                size: c.stored_size(),
                memory_mapped: c.info.chunk_type().is_memory_mappable(),
            })
            .collect();
        let placer = ChunkPlacer::new(self.config.layout.clone());
        let placement = placer.place(&requests, self.config.previous.as_ref());
        for conflict in &placement.conflicts {
            warn!(container = %self.config.container, "{conflict}");
        }

        let path = self.container_path();
        let written = ContainerWriter::new(
            self.config.compression,
            self.config.layout.memory_mapping_alignment,
        )
        .write(&path, &placement, &chunks)?;

        let offsets: Vec<u64> = placement.chunks.iter().map(|c| c.offset).collect();
        self.manifest(&chunks, &offsets)
            .save(&ContainerManifest::path_for(&self.config.output_dir, &self.config.container))?;

        if self.config.write_snapshot {
            let mut snapshot = ReleaseSnapshot::new(&self.config.container, self.config.build_id);
            snapshot.packages = packages.clone();
            snapshot.chunks = placement
                .chunks
                .iter()
                .zip(&chunks)
                .map(|(placed, chunk)| SnapshotChunk {
                    id: placed.id,
                    hash: chunk.info.hash,
                    offset: placed.offset,
                    size: placed.size,
                })
                .collect();
            snapshot.save(&ReleaseSnapshot::path_for(
                &self.config.output_dir,
                &self.config.container,
            ))?;
        }

        let report = SinkReport {
            container: self.config.container.clone(),
            packages: packages.len(),
            chunks: chunks.len(),
            bytes_written: written.file_size,
            reused_chunks: placement.reused_count(),
            layout_conflicts: placement.conflicts.len(),
            path: Some(written.path),
        };
        info!(
            container = %report.container,
            packages = report.packages,
            chunks = report.chunks,
            reused = report.reused_chunks,
            "flushed local sink"
        );
        Ok(report)
    }
}

/// Package ids recorded in a release snapshot.
pub fn snapshot_package_ids(snapshot: &ReleaseSnapshot) -> HashSet<PackageId> {
    snapshot.packages.iter().map(|p| p.id).collect()
}
