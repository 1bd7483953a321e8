//! Package records for the iopack optimizer.
//!
//! - [`Interner`]: global name, import and export tables shared by all packages
//! - [`PackageHeader`]: decoder (and encoder) for the binary source header
//! - [`PackageLoader`]: turns a decoded header into a [`Package`] with global indices
//! - [`PackageArena`]: owns every loaded package, addressed by [`PackageSlot`]

pub mod arena;
pub mod error;
pub mod header;
pub mod interner;
pub mod loader;
pub mod package;

pub use arena::{PackageArena, PackageSlot};
pub use error::{PackageError, PackageResult};
pub use header::{HeaderBuilder, PackageHeader, RawExport, RawImport};
pub use interner::{ExportEntry, ImportEntry, Interner};
pub use loader::PackageLoader;
pub use package::{
    Export, ExportFilter, Import, Package, PackageFlags, PreloadDependency, OBJECT_FLAG_PUBLIC,
};
