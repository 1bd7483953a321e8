//! The iopack build pipeline.
//!
//! [`optimize`] runs a complete build described by a [`BuildConfig`]:
//! packages found by [`discover_packages`] are decoded and serialized on a
//! [`WorkerPool`], planned by the single-threaded stages of an
//! [`OptimizerContext`], and written through [`ChunkSink`]s into one
//! container per [`ContainerRules`] group plus the global container.
//!
//! [`ChunkSink`]: iopack_container::ChunkSink

pub mod config;
pub mod discovery;
pub mod error;
pub mod mirror;
pub mod optimizer;
pub mod pool;
pub mod stats;

pub use config::{BuildConfig, SinkConfig};
pub use discovery::{discover_packages, ContainerRules, SourcePackage};
pub use error::{BuildError, BuildResult};
pub use mirror::MirrorSink;
pub use optimizer::{optimize, OptimizerContext};
pub use pool::WorkerPool;
pub use stats::{BuildReport, ContainerStats, PackageFailure};
