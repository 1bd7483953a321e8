//! Container serialization for iopack.
//!
//! A build produces one container per group of packages plus a
//! [`GLOBAL_CONTAINER`] holding the shared name and import tables. Each
//! package becomes an `ExportBundleData` chunk: a [`StorePackageHeader`]
//! followed by its export data in bundle order. Chunks are handed to a
//! [`ChunkSink`]; [`LocalFileSink`] lays them out and writes a container
//! file (TOC, data, BLAKE3 trailer) that [`ContainerReader`] maps back in.

pub mod compression;
pub mod container_header;
pub mod error;
pub mod global;
pub mod local;
pub mod manifest;
pub mod reader;
pub mod remote;
pub mod sink;
pub mod store_header;
pub mod toc;
pub mod writer;

pub use compression::CompressionMethod;
pub use container_header::{ContainerHeader, ContainerHeaderEntry};
pub use error::{ContainerError, ContainerResult};
pub use global::{
    decode_names, encode_name_hashes, encode_names, GlobalImportTable, InitialLoadMeta,
    PackageScriptArcs, GLOBAL_CONTAINER,
};
pub use local::{snapshot_package_ids, LocalFileSink, LocalSinkConfig};
pub use manifest::{ContainerManifest, ManifestEntry};
pub use reader::{ContainerReader, VerifyReport};
pub use remote::{
    CompletionCallback, DirectoryRemoteStore, InMemoryRemoteStore, QueuedRemoteSink,
    RemoteSinkConfig, RemoteStore,
};
pub use sink::{ChunkInfo, ChunkSink, EncodedChunk, PackageInfo, SinkReport};
pub use store_header::{
    serialize_package, StoreBundle, StoreExport, StorePackage, StorePackageHeader,
};
pub use toc::{Toc, TocEntry, CONTAINER_EXTENSION};
pub use writer::{ContainerWriter, WrittenContainer};
