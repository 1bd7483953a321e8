//! Load-order planning for iopack.
//!
//! Three passes run in order over a [`PackageArena`](iopack_package::PackageArena):
//!
//! 1. [`ExportGraph::build`] creates a create and a serialize node per export
//!    and connects them along the preload dependencies.
//! 2. [`add_postload_dependencies`] finds circular import chains and adds the
//!    package-level postload arcs.
//! 3. [`build_bundles`] orders all export nodes, groups them into bundles and
//!    turns node edges into bundle arcs.

pub mod bundles;
pub mod cycles;
pub mod error;
pub mod export_graph;

#[cfg(test)]
pub(crate) mod testing;

pub use bundles::{build_bundles, package_load_order, BundleReport};
pub use cycles::{add_postload_dependencies, CircularChain, CycleReport};
pub use error::{GraphError, GraphResult};
pub use export_graph::{link_imported_exports, ExportGraph, GraphNode, NodeId};
