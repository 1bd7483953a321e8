use bytes::Bytes;
use iopack_container::{ChunkInfo, ChunkSink, ContainerResult, PackageInfo, SinkReport};

/// Forwards every call to a primary sink and any number of mirrors.
///
/// `flush` flushes the mirrors first and returns the primary's report; a
/// failure in any sink fails the whole container.
pub struct MirrorSink {
    primary: Box<dyn ChunkSink>,
    mirrors: Vec<Box<dyn ChunkSink>>,
}

impl MirrorSink {
    pub fn new(primary: Box<dyn ChunkSink>) -> Self {
        Self {
            primary,
            mirrors: Vec::new(),
        }
    }

    pub fn with_mirror(mut self, mirror: Box<dyn ChunkSink>) -> Self {
        self.mirrors.push(mirror);
        self
    }

    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }
}

impl ChunkSink for MirrorSink {
    fn begin_package(&mut self, name: &str) -> ContainerResult<()> {
        for mirror in &mut self.mirrors {
            mirror.begin_package(name)?;
        }
        self.primary.begin_package(name)
    }

    fn write_package_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        for mirror in &mut self.mirrors {
            mirror.write_package_data(info.clone(), data.clone())?;
        }
        self.primary.write_package_data(info, data)
    }

    fn write_bulk_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        for mirror in &mut self.mirrors {
            mirror.write_bulk_data(info.clone(), data.clone())?;
        }
        self.primary.write_bulk_data(info, data)
    }

    fn commit_package(&mut self, info: &PackageInfo) -> ContainerResult<()> {
        for mirror in &mut self.mirrors {
            mirror.commit_package(info)?;
        }
        self.primary.commit_package(info)
    }

    fn flush(&mut self) -> ContainerResult<SinkReport> {
        for mirror in &mut self.mirrors {
            mirror.flush()?;
        }
        self.primary.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use iopack_container::{
        CompressionMethod, EncodedChunk, InMemoryRemoteStore, QueuedRemoteSink, RemoteSinkConfig,
    };
    use iopack_types::{ChunkId, ChunkType, PackageId};

    fn sink(store: &Arc<InMemoryRemoteStore>, container: &str) -> Box<dyn ChunkSink> {
        Box::new(
            QueuedRemoteSink::new(container, store.clone(), RemoteSinkConfig::default(), None)
                .unwrap(),
        )
    }

    #[test]
    fn every_chunk_reaches_every_sink() {
        let primary = Arc::new(InMemoryRemoteStore::new());
        let mirror = Arc::new(InMemoryRemoteStore::new());
        let mut sink = MirrorSink::new(sink(&primary, "base")).with_mirror(sink(&mirror, "base"));
        assert_eq!(sink.mirror_count(), 1);

        let id = PackageId::from_name("/Game/A");
        sink.begin_package("/Game/A").unwrap();
        for chunk_type in [ChunkType::ExportBundleData, ChunkType::BulkData] {
            let chunk = EncodedChunk::encode(
                ChunkId::new(id, 0, chunk_type),
                b"payload".to_vec(),
                CompressionMethod::None,
                Some("/Game/A".into()),
                None,
            )
            .unwrap();
            sink.write_chunk(chunk).unwrap();
        }
        sink.commit_package(&PackageInfo {
            name: "/Game/A".into(),
            id,
            chunk_count: 2,
        })
        .unwrap();
        let report = sink.flush().unwrap();

        assert_eq!(report.chunks, 2);
        assert_eq!(report.packages, 1);
        assert_eq!(primary.len(), 2);
        assert_eq!(mirror.len(), 2);
        let bulk = ChunkId::new(id, 0, ChunkType::BulkData);
        assert_eq!(mirror.get("base", &bulk).unwrap().as_ref(), b"payload");
    }

    #[test]
    fn a_failing_mirror_fails_the_flush() {
        let primary = Arc::new(InMemoryRemoteStore::new());
        let mirror = Arc::new(InMemoryRemoteStore::new());
        mirror.fail_next(10);
        let mut sink = MirrorSink::new(sink(&primary, "base")).with_mirror(sink(&mirror, "base"));
        let chunk = EncodedChunk::encode(
            ChunkId::global(ChunkType::GlobalNames),
            b"names".to_vec(),
            CompressionMethod::None,
            None,
            None,
        )
        .unwrap();
        sink.write_chunk(chunk).unwrap();
        assert!(sink.flush().is_err());
    }
}
