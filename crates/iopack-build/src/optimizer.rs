//! The staged optimizer.
//!
//! 1. Discover source packages and decode their headers on the worker pool.
//! 2. Load every decoded header into the arena, interning names and imports.
//! 3. Build the export graph, add postload arcs and form bundles.
//! 4. Group packages into containers and order each container.
//! 5. Serialize, hash and compress package chunks on the worker pool.
//! 6. Hand chunks to the sinks in layout order, then write the global tables.
//!
//! A package with a corrupt header is skipped and reported; a cyclic export
//! graph or a failed write aborts the build.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use iopack_container::{
    encode_name_hashes, encode_names, snapshot_package_ids, ChunkInfo, ChunkSink,
    CompletionCallback, CompressionMethod, ContainerHeader, ContainerHeaderEntry,
    ContainerResult, DirectoryRemoteStore, EncodedChunk, GlobalImportTable, InitialLoadMeta,
    LocalFileSink, LocalSinkConfig, PackageInfo, QueuedRemoteSink, RemoteStore,
    GLOBAL_CONTAINER,
};
use iopack_graph::{add_postload_dependencies, build_bundles, link_imported_exports, ExportGraph};
use iopack_layout::{LayoutPlanner, OrderHints, ReleaseSnapshot};
use iopack_package::{
    Interner, PackageArena, PackageHeader, PackageLoader, PackageResult, PackageSlot,
};
use iopack_types::{ChunkId, ChunkType, PackageId};
use tokio::task;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BuildConfig;
use crate::discovery::{discover_packages, ContainerRules, SourcePackage};
use crate::error::{BuildError, BuildResult};
use crate::mirror::MirrorSink;
use crate::pool::WorkerPool;
use crate::stats::{BuildReport, ContainerStats};

/// Run a complete build.
pub async fn optimize(config: BuildConfig) -> BuildResult<BuildReport> {
    OptimizerContext::new(config)?.run().await
}

/// Owns the interner and the package arena for the duration of a build.
///
/// Both are mutated only by the single-threaded stages; the worker stages
/// see them through an immutable [`Arc`] once planning is finished.
pub struct OptimizerContext {
    config: BuildConfig,
    pool: WorkerPool,
    rules: ContainerRules,
    hints: OrderHints,
    interner: Interner,
    arena: PackageArena,
    sources: HashMap<PackageSlot, SourcePackage>,
    report: BuildReport,
}

/// Planning results shared with serialization workers and the writer.
struct Frozen {
    interner: Interner,
    arena: PackageArena,
    imports: GlobalImportTable,
}

type EncodedPackages = HashMap<PackageSlot, Vec<EncodedChunk>>;

impl OptimizerContext {
    pub fn new(config: BuildConfig) -> BuildResult<Self> {
        config.validate()?;
        let rules = match &config.containers_file {
            Some(path) => ContainerRules::load(path, config.default_container.as_str())?,
            None => ContainerRules::new(config.default_container.as_str()),
        };
        let mut hints = OrderHints::new();
        if let Some(path) = &config.order_file {
            hints.load_explicit(path)?;
        }
        if let Some(path) = &config.open_order_file {
            hints.load_open(path)?;
        }
        let pool = WorkerPool::new(config.worker_count());
        let report = BuildReport {
            build_id: Uuid::now_v7(),
            ..BuildReport::default()
        };
        Ok(Self {
            config,
            pool,
            rules,
            hints,
            interner: Interner::new(),
            arena: PackageArena::new(),
            sources: HashMap::new(),
            report,
        })
    }

    pub fn build_id(&self) -> Uuid {
        self.report.build_id
    }

    pub async fn run(mut self) -> BuildResult<BuildReport> {
        let started = Instant::now();
        info!(
            build_id = %self.report.build_id,
            input = %self.config.input_dir.display(),
            output = %self.config.output_dir.display(),
            workers = self.pool.workers(),
            "starting build"
        );

        self.load_packages().await?;
        self.plan_load_order()?;
        let containers = self.order_containers();

        let Self {
            config,
            pool,
            interner,
            arena,
            sources,
            mut report,
            ..
        } = self;
        let imports = GlobalImportTable::build(&interner);
        report.names = interner.names().len();
        report.global_imports = imports.len();
        let frozen = Arc::new(Frozen {
            interner,
            arena,
            imports,
        });

        let encoded = encode_packages(&pool, &frozen, sources, config.compression, &mut report).await?;

        let build_id = report.build_id;
        report.containers = task::spawn_blocking(move || {
            write_containers(&config, build_id, &frozen, containers, encoded)
        })
        .await
        .map_err(|e| BuildError::Worker(e.to_string()))??;

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            packages = report.packages,
            bundles = report.bundles,
            containers = report.containers.len(),
            bytes = report.bytes_written(),
            reused = report.reused_chunks(),
            failed = report.failed_packages.len(),
            duration_ms = report.duration_ms,
            "build finished"
        );
        Ok(report)
    }

    async fn load_packages(&mut self) -> BuildResult<()> {
        let sources = discover_packages(&self.config.input_dir, &self.config.mount_point)?;
        let decoded = self
            .pool
            .map(sources, |source| {
                let header = read_source(&source);
                (source, header)
            })
            .await?;

        for (source, header) in decoded {
            match self.load_one(&source, header) {
                Ok(slot) => {
                    self.sources.insert(slot, source);
                }
                Err(err) => {
                    warn!(package = %source.name, error = %err, "skipping package");
                    self.report.record_failure(&source.name, err);
                }
            }
        }
        info!(
            loaded = self.arena.len(),
            failed = self.report.failed_packages.len(),
            names = self.interner.names().len(),
            "loaded packages"
        );
        Ok(())
    }

    fn load_one(
        &mut self,
        source: &SourcePackage,
        header: PackageResult<(PackageHeader, u64)>,
    ) -> PackageResult<PackageSlot> {
        let (header, export_data_size) = header?;
        PackageLoader::load_into(
            &mut self.interner,
            &mut self.arena,
            &source.name,
            &header,
            export_data_size,
        )
    }

    fn plan_load_order(&mut self) -> BuildResult<()> {
        let graph = ExportGraph::build(&self.interner, &self.arena);
        let linked = link_imported_exports(&self.interner, &mut self.arena);
        let cycles = add_postload_dependencies(&mut self.arena);
        for chain in &cycles.chains {
            info!(packages = %chain.packages.join(" <-> "), "circular import chain");
        }
        let bundles = build_bundles(&graph, &mut self.arena)?;
        debug!(linked, "linked imported exports");

        let report = &mut self.report;
        report.packages = self.arena.len();
        report.exports = self.arena.iter().map(|p| p.exports.len()).sum();
        report.missing_imports = graph.missing_imports().len();
        report.circular_packages = cycles.circular_packages;
        report.circular_chains = cycles.chains.len();
        report.postload_arcs = cycles.postload_arcs;
        report.exports_done_arcs = cycles.exports_done_arcs;
        report.bundles = bundles.bundles;
        report.internal_arcs = bundles.internal_arcs;
        report.external_arcs = bundles.external_arcs;
        report.script_arcs = bundles.script_arcs;
        Ok(())
    }

    /// Packages of every container in write order. The default container
    /// is always present, even when empty.
    fn order_containers(&self) -> BTreeMap<String, Vec<PackageSlot>> {
        let mut groups: BTreeMap<String, Vec<PackageSlot>> = BTreeMap::new();
        groups.entry(self.rules.default_container().to_string()).or_default();
        for slot in self.arena.slots() {
            let container = self.rules.container_for(&self.arena[slot].name);
            groups.entry(container.to_string()).or_default().push(slot);
        }

        let planner = LayoutPlanner::new(&self.hints);
        groups
            .into_iter()
            .map(|(container, slots)| {
                let ordered = planner.order_packages(&self.arena, &slots);
                debug!(container = %container, packages = ordered.len(), "ordered container");
                (container, ordered)
            })
            .collect()
    }
}

fn read_source(source: &SourcePackage) -> PackageResult<(PackageHeader, u64)> {
    let header = PackageHeader::parse(&fs::read(&source.header_path)?)?;
    let export_data_size = fs::metadata(&source.export_path)?.len();
    Ok((header, export_data_size))
}

async fn encode_packages(
    pool: &WorkerPool,
    frozen: &Arc<Frozen>,
    sources: HashMap<PackageSlot, SourcePackage>,
    compression: CompressionMethod,
    report: &mut BuildReport,
) -> BuildResult<EncodedPackages> {
    let mut jobs: Vec<_> = sources.into_iter().collect();
    jobs.sort_by_key(|(slot, _)| *slot);

    let shared = Arc::clone(frozen);
    let results = pool
        .map(jobs, move |(slot, source)| {
            let chunks = encode_package(&shared, slot, &source, compression);
            (slot, source, chunks)
        })
        .await?;

    let mut encoded = HashMap::with_capacity(results.len());
    for (slot, source, chunks) in results {
        match chunks {
            Ok(chunks) => {
                encoded.insert(slot, chunks);
            }
            Err(err) => {
                warn!(package = %source.name, error = %err, "failed to serialize package");
                report.record_failure(&source.name, err);
            }
        }
    }
    info!(packages = encoded.len(), "encoded package chunks");
    Ok(encoded)
}

/// The store chunk of a package followed by its bulk chunks.
fn encode_package(
    frozen: &Frozen,
    slot: PackageSlot,
    source: &SourcePackage,
    compression: CompressionMethod,
) -> ContainerResult<Vec<EncodedChunk>> {
    let package = &frozen.arena[slot];
    let export_data = fs::read(&source.export_path)?;
    let store = iopack_container::serialize_package(
        package,
        &export_data,
        &frozen.interner,
        &frozen.imports,
    )?;

    let mut chunks = Vec::with_capacity(1 + source.bulk.len());
    chunks.push(EncodedChunk::encode(
        ChunkId::new(package.id, 0, ChunkType::ExportBundleData),
        store.payload,
        compression,
        Some(package.name.clone()),
        None,
    )?);
    for (chunk_type, path) in &source.bulk {
        chunks.push(EncodedChunk::encode(
            ChunkId::new(package.id, 0, *chunk_type),
            fs::read(path)?,
            compression,
            Some(package.name.clone()),
            Some(path.clone()),
        )?);
    }
    Ok(chunks)
}

fn write_containers(
    config: &BuildConfig,
    build_id: Uuid,
    frozen: &Frozen,
    containers: BTreeMap<String, Vec<PackageSlot>>,
    mut encoded: EncodedPackages,
) -> BuildResult<Vec<ContainerStats>> {
    let remote: Option<Arc<dyn RemoteStore>> = config
        .sink
        .remote_store
        .as_ref()
        .map(|root| Arc::new(DirectoryRemoteStore::new(root.clone())) as Arc<dyn RemoteStore>);

    let mut stats = Vec::with_capacity(containers.len() + 1);
    for (name, slots) in containers {
        let previous = previous_snapshot(config, &name);
        let removed = previous.as_ref().map_or(0, |snapshot| {
            let mut ids = snapshot_package_ids(snapshot);
            for slot in &slots {
                ids.remove(&frozen.arena[*slot].id);
            }
            ids.len()
        });
        let mut sink = open_sink(config, build_id, &name, previous, remote.as_ref())?;

        let mut header = ContainerHeader::new(&name);
        for slot in slots {
            let Some(chunks) = encoded.remove(&slot) else {
                continue;
            };
            let package = &frozen.arena[slot];
            sink.begin_package(&package.name)?;
            let chunk_count = chunks.len();
            for chunk in chunks {
                sink.write_chunk(chunk)?;
            }
            sink.commit_package(&PackageInfo {
                name: package.name.clone(),
                id: package.id,
                chunk_count,
            })?;
            header.push(ContainerHeaderEntry::from_package(&frozen.arena, slot));
        }
        sink.write_chunk(EncodedChunk::encode(
            ChunkId::new(PackageId::from_name(&name), 0, ChunkType::ContainerHeader),
            header.to_bytes(),
            config.compression,
            None,
            None,
        )?)?;

        let report = sink.flush()?;
        if removed > 0 {
            info!(container = %name, removed, "packages removed since the previous release");
        }
        stats.push(ContainerStats::from_sink(report, removed));
    }

    let previous = previous_snapshot(config, GLOBAL_CONTAINER);
    let mut sink = open_sink(config, build_id, GLOBAL_CONTAINER, previous, remote.as_ref())?;
    let meta = InitialLoadMeta::build(&frozen.interner, &frozen.arena, &frozen.imports)?;
    let tables = [
        (ChunkType::GlobalNames, encode_names(&frozen.interner)),
        (ChunkType::GlobalNameHashes, encode_name_hashes(&frozen.interner)),
        (ChunkType::GlobalImports, frozen.imports.encode(&frozen.interner)?),
        (ChunkType::InitialLoadMeta, meta.to_bytes()),
    ];
    for (chunk_type, data) in tables {
        sink.write_chunk(EncodedChunk::encode(
            ChunkId::global(chunk_type),
            data,
            config.compression,
            None,
            None,
        )?)?;
    }
    stats.push(ContainerStats::from_sink(sink.flush()?, 0));
    Ok(stats)
}

fn open_sink(
    config: &BuildConfig,
    build_id: Uuid,
    container: &str,
    previous: Option<ReleaseSnapshot>,
    remote: Option<&Arc<dyn RemoteStore>>,
) -> BuildResult<MirrorSink> {
    let local = LocalFileSink::new(LocalSinkConfig {
        output_dir: config.output_dir.clone(),
        container: container.to_string(),
        layout: config.layout.clone(),
        compression: config.compression,
        build_id,
        previous,
        write_snapshot: config.write_release_snapshot,
    })?;
    let mut sink = MirrorSink::new(Box::new(local));
    if let Some(store) = remote {
        let on_complete: CompletionCallback = Arc::new(|info: &ChunkInfo, stored: bool| {
            debug!(chunk = %info.id, stored, "remote chunk write finished");
        });
        let remote = QueuedRemoteSink::new(
            container,
            Arc::clone(store),
            config.sink.remote(),
            Some(on_complete),
        )?;
        sink = sink.with_mirror(Box::new(remote));
    }
    Ok(sink)
}

/// The previous release of `container`, if one was configured and readable.
fn previous_snapshot(config: &BuildConfig, container: &str) -> Option<ReleaseSnapshot> {
    let dir = config.previous_build_dir.as_ref()?;
    let path = ReleaseSnapshot::path_for(dir, container);
    if !path.is_file() {
        debug!(path = %path.display(), "no previous release snapshot");
        return None;
    }
    match ReleaseSnapshot::load(&path) {
        Ok(snapshot) => {
            debug!(
                container,
                packages = snapshot.packages.len(),
                chunks = snapshot.chunks.len(),
                "loaded previous release"
            );
            Some(snapshot)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable release snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use iopack_container::{decode_names, ContainerReader, StorePackageHeader};
    use iopack_layout::LayoutConfig;
    use iopack_package::HeaderBuilder;
    use iopack_types::ExportPhase;

    fn write_package(root: &Path, relative: &str, build: impl FnOnce(&mut HeaderBuilder)) {
        let mut builder = HeaderBuilder::new();
        build(&mut builder);
        let header = builder.build();
        let base = root.join(relative);
        fs::create_dir_all(base.parent().unwrap()).unwrap();
        fs::write(base.with_extension("pkgh"), header.to_bytes()).unwrap();
        let data: Vec<u8> = (0..header.export_data_size()).map(|i| (i % 251) as u8).collect();
        fs::write(base.with_extension("pkgx"), data).unwrap();
    }

    /// `name` exports `Root`, which needs `import` serialized first.
    fn chained(root: &Path, name: &str, import: Option<&str>) {
        write_package(root, name, |b| {
            let export = b.export("Root", 64, true);
            if let Some(import) = import {
                let dep = b.import_object(import);
                b.depend(export, dep, ExportPhase::Serialize, ExportPhase::Serialize);
            }
        });
    }

    fn config(input: &Path, output: &Path) -> BuildConfig {
        BuildConfig {
            input_dir: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            jobs: 2,
            layout: LayoutConfig {
                compression_block_size: 4096,
                memory_mapping_alignment: 1024,
                reuse_previous_offsets: true,
            },
            ..BuildConfig::default()
        }
    }

    fn store_header(reader: &ContainerReader, package: &str) -> StorePackageHeader {
        let id = ChunkId::new(PackageId::from_name(package), 0, ChunkType::ExportBundleData);
        StorePackageHeader::parse(&reader.read_chunk(&id).unwrap()).unwrap().0
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn import_chain_loads_dependencies_first() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        chained(input.path(), "A", Some("/Game/B.Root"));
        chained(input.path(), "B", Some("/Game/C.Root"));
        chained(input.path(), "C", None);

        let report = optimize(config(input.path(), output.path())).await.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.packages, 3);
        assert_eq!(report.missing_imports, 0);
        assert_eq!(report.circular_packages, 0);
        assert_eq!(report.containers.len(), 2);
        assert_eq!(report.containers[0].name, "base");
        assert_eq!(report.containers[1].name, GLOBAL_CONTAINER);

        let reader = ContainerReader::open(&output.path().join("base.iopak")).unwrap();
        reader.verify().unwrap();
        let order = |name| store_header(&reader, name).bundles[0].load_order;
        assert!(order("/Game/C") < order("/Game/B"));
        assert!(order("/Game/B") < order("/Game/A"));

        let header_id = ChunkId::new(PackageId::from_name("base"), 0, ChunkType::ContainerHeader);
        let header = ContainerHeader::parse(&reader.read_chunk(&header_id).unwrap()).unwrap();
        assert_eq!(header.len(), 3);
        let a = header.find(PackageId::from_name("/Game/A")).unwrap();
        let mut closure = vec![PackageId::from_name("/Game/B"), PackageId::from_name("/Game/C")];
        closure.sort();
        assert_eq!(a.imported_packages, closure);

        let global = ContainerReader::open(&output.path().join("global.iopak")).unwrap();
        assert_eq!(global.entries().len(), 4);
        let names = decode_names(&global.read_chunk(&ChunkId::global(ChunkType::GlobalNames)).unwrap())
            .unwrap();
        assert!(names.iter().any(|n| n == "/Game/A"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn circular_imports_still_build() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_package(input.path(), "A", |b| {
            let x = b.import_object("/Game/B.X");
            b.export("First", 16, true);
            let second = b.export("Second", 16, true);
            b.depend(second, x, ExportPhase::Serialize, ExportPhase::Serialize);
        });
        write_package(input.path(), "B", |b| {
            let first = b.import_object("/Game/A.First");
            let x = b.export("X", 16, true);
            b.depend(x, first, ExportPhase::Serialize, ExportPhase::Serialize);
        });

        let report = optimize(config(input.path(), output.path())).await.unwrap();
        assert!(report.succeeded());
        // only the package that closes the chain first is marked
        assert_eq!(report.circular_packages, 1);
        assert_eq!(report.circular_chains, 1);
        assert_eq!(report.exports_done_arcs, 1);
        assert_eq!(report.postload_arcs, 1);

        let reader = ContainerReader::open(&output.path().join("base.iopak")).unwrap();
        assert!(!store_header(&reader, "/Game/A").bundles.is_empty());
        assert!(!store_header(&reader, "/Game/B").bundles.is_empty());
    }

    #[tokio::test]
    async fn missing_import_is_a_warning() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        chained(input.path(), "A", Some("/Game/Ghost.Root"));

        let report = optimize(config(input.path(), output.path())).await.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.missing_imports, 1);
        let reader = ContainerReader::open(&output.path().join("base.iopak")).unwrap();
        assert_eq!(store_header(&reader, "/Game/A").exports.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_package_is_skipped_and_reported() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        chained(input.path(), "Good", None);
        fs::write(input.path().join("Broken.pkgh"), b"not a header").unwrap();
        fs::write(input.path().join("Broken.pkgx"), b"").unwrap();
        chained(input.path(), "NoData", None);
        fs::remove_file(input.path().join("NoData.pkgx")).unwrap();

        let report = optimize(config(input.path(), output.path())).await.unwrap();
        assert!(!report.succeeded());
        let failed: Vec<_> = report.failed_packages.iter().map(|f| f.package.as_str()).collect();
        assert_eq!(failed, ["/Game/Broken", "/Game/NoData"]);
        assert_eq!(report.packages, 1);

        let reader = ContainerReader::open(&output.path().join("base.iopak")).unwrap();
        assert!(reader.contains(&ChunkId::new(
            PackageId::from_name("/Game/Good"),
            0,
            ChunkType::ExportBundleData
        )));
    }

    #[tokio::test]
    async fn response_file_splits_containers_and_bulk_data_follows() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        chained(input.path(), "Hero", None);
        chained(input.path(), "Maps/Arena", Some("/Game/Hero.Root"));
        fs::write(input.path().join("Maps/Arena.pkgm"), vec![7u8; 3000]).unwrap();
        let rules = input.path().join("containers.txt");
        fs::write(&rules, "maps\t/Game/Maps/\n").unwrap();

        let mut cfg = config(input.path(), output.path());
        cfg.containers_file = Some(rules);
        let report = optimize(cfg).await.unwrap();
        let names: Vec<_> = report.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["base", "maps", GLOBAL_CONTAINER]);

        let maps = ContainerReader::open(&output.path().join("maps.iopak")).unwrap();
        let arena = PackageId::from_name("/Game/Maps/Arena");
        let bulk = ChunkId::new(arena, 0, ChunkType::MemoryMappedBulkData);
        assert_eq!(maps.read_chunk(&bulk).unwrap(), vec![7u8; 3000]);
        let entry = maps.toc().lookup(&bulk).unwrap();
        assert_eq!((maps.toc().data_offset + entry.offset) % 1024, 0);

        let base = ContainerReader::open(&output.path().join("base.iopak")).unwrap();
        assert!(!base.contains(&ChunkId::new(arena, 0, ChunkType::ExportBundleData)));
    }

    #[tokio::test]
    async fn second_release_reuses_offsets() {
        let input = tempfile::tempdir().unwrap();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for name in ["A", "B", "Old"] {
            chained(input.path(), name, None);
            fs::write(input.path().join(format!("{name}.pkgb")), name.repeat(500)).unwrap();
        }

        let mut cfg = config(input.path(), first.path());
        cfg.write_release_snapshot = true;
        optimize(cfg).await.unwrap();
        assert!(first.path().join("base.release").is_file());

        fs::remove_file(input.path().join("Old.pkgh")).unwrap();
        fs::remove_file(input.path().join("Old.pkgb")).unwrap();
        chained(input.path(), "New", None);
        let mut cfg = config(input.path(), second.path());
        cfg.previous_build_dir = Some(first.path().to_path_buf());
        let report = optimize(cfg).await.unwrap();

        let base = &report.containers[0];
        assert_eq!(base.removed_packages, 1);
        assert!(base.reused_chunks >= 2);
        ContainerReader::open(&second.path().join("base.iopak"))
            .unwrap()
            .verify()
            .unwrap();
    }

    #[tokio::test]
    async fn chunks_are_mirrored_to_the_remote_store() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        chained(input.path(), "A", None);

        let mut cfg = config(input.path(), output.path());
        cfg.sink.remote_store = Some(remote.path().to_path_buf());
        optimize(cfg).await.unwrap();

        let store = DirectoryRemoteStore::new(remote.path());
        let id = ChunkId::new(PackageId::from_name("/Game/A"), 0, ChunkType::ExportBundleData);
        assert!(store.chunk_path("base", &id).is_file());
        assert!(store
            .chunk_path(GLOBAL_CONTAINER, &ChunkId::global(ChunkType::GlobalImports))
            .is_file());
    }

    #[tokio::test]
    async fn empty_input_still_writes_the_containers() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let report = optimize(config(input.path(), output.path())).await.unwrap();
        assert_eq!(report.packages, 0);
        assert!(output.path().join("base.iopak").is_file());
        assert!(output.path().join("global.iopak").is_file());
    }
}
