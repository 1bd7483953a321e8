//! Foundation types for the iopack package-store optimizer.
//!
//! Every other iopack crate depends on `iopack-types`. The types here are
//! plain data: identifiers, the tagged cross-reference union used by package
//! tables, and the load-graph vocabulary (phases, bundles, arcs) shared by the
//! graph builder and the container serializer.
//!
//! # Key Types
//!
//! - [`PackageId`]: Stable 64-bit package identifier derived from the package name
//! - [`ChunkId`]: Injective `(package, index, type)` chunk key
//! - [`PackageIndex`]: `Null | Export | Import` reference inside a package
//! - [`ContentHash`]: BLAKE3 hash of a chunk payload
//! - [`ExportBundle`]: Ordered create/serialize entries with a global load order
//! - [`LoadArc`]: Typed "must happen before" arc between load nodes

pub mod bundle;
pub mod chunk;
pub mod codec;
pub mod error;
pub mod hash;
pub mod ids;
pub mod index;
pub mod phase;

pub use bundle::{BundleEntry, ExportBundle, ScriptArc};
pub use chunk::{ChunkId, ChunkType};
pub use codec::{ByteReader, ByteWriter};
pub use error::TypeError;
pub use hash::ContentHash;
pub use ids::{ImportIndex, NameIndex, PackageId};
pub use index::PackageIndex;
pub use phase::{ExportPhase, LoadArc, LoadNode, PackagePhase};
