//! Disk layout planning for iopack containers.
//!
//! Layout happens in two steps. [`LayoutPlanner`] decides the order in which
//! packages are written: packages that import each other are clustered with
//! a [`UnionFind`] and clusters are ranked by [`OrderHints`]. [`ChunkPlacer`]
//! then assigns byte offsets, keeping chunks of a previous release where they
//! were (read back from a [`ReleaseSnapshot`]) so that patches stay small.

pub mod config;
pub mod error;
pub mod hints;
pub mod placement;
pub mod planner;
pub mod snapshot;
pub mod union_find;

pub use config::LayoutConfig;
pub use error::{LayoutError, LayoutResult};
pub use hints::OrderHints;
pub use placement::{ChunkPlacer, ChunkRequest, Placement, PlacedChunk};
pub use planner::LayoutPlanner;
pub use snapshot::{ReleaseSnapshot, SnapshotChunk, SnapshotPackage};
pub use union_find::UnionFind;
