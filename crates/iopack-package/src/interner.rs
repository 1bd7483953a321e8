//! Global symbol tables shared by every package of a run.
//!
//! Three tables grow monotonically while packages are loaded:
//!
//! - names: every distinct string, addressed by [`NameIndex`]
//! - imports: every distinct imported object path, addressed by [`ImportIndex`]
//! - exports: full export path to the package and export index defining it
//!
//! Nothing is ever removed, so indices embedded in package records stay
//! valid for the lifetime of the interner.

use std::collections::HashMap;

use iopack_types::{ImportIndex, NameIndex, PackageId};
use tracing::debug;

/// Prefix of engine-intrinsic objects that are never cooked into packages.
pub const SCRIPT_PREFIX: &str = "/script/";

/// One entry of the global import table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportEntry {
    /// Lower-cased dotted path.
    pub full_name: String,
    pub object_name: NameIndex,
    pub outer: Option<ImportIndex>,
    /// The package-level import at the root of the outer chain (possibly self).
    pub outermost: ImportIndex,
    pub is_script: bool,
    pub is_package: bool,
}

/// Where an exported object lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportEntry {
    pub package: PackageId,
    pub export: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Interner {
    names: Vec<String>,
    name_lookup: HashMap<String, NameIndex>,
    imports: Vec<ImportEntry>,
    import_lookup: HashMap<String, ImportIndex>,
    exports: HashMap<String, ExportEntry>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // Names
    // ---------------------------------------------------------------

    /// Intern a name. Idempotent: the same string always yields the same index.
    pub fn intern(&mut self, name: &str) -> NameIndex {
        if let Some(&index) = self.name_lookup.get(name) {
            return index;
        }
        let index = NameIndex(self.names.len() as u32);
        self.names.push(name.to_string());
        self.name_lookup.insert(name.to_string(), index);
        index
    }

    pub fn name(&self, index: NameIndex) -> Option<&str> {
        self.names.get(index.as_usize()).map(String::as_str)
    }

    pub fn find_name(&self, name: &str) -> Option<NameIndex> {
        self.name_lookup.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    // ---------------------------------------------------------------
    // Imports
    // ---------------------------------------------------------------

    /// Intern an object path such as `/Game/Hero.Hero.Mesh`.
    ///
    /// Paths compare case-insensitively. The outer chain (`/Game/Hero.Hero`,
    /// then `/Game/Hero`) is interned first, so an import's outer always has
    /// a smaller index than the import itself.
    pub fn intern_import(&mut self, full_name: &str) -> ImportIndex {
        let key = full_name.to_lowercase();
        if let Some(&index) = self.import_lookup.get(&key) {
            return index;
        }

        let (outer, object_name) = match split_object_path(full_name) {
            Some((outer_path, object)) => (Some(self.intern_import(outer_path)), object),
            None => (None, full_name),
        };
        let object_name = self.intern(object_name);
        let index = ImportIndex(self.imports.len() as u32);
        let outermost = match outer {
            Some(outer) => self.imports[outer.as_usize()].outermost,
            None => index,
        };
        let is_script = key.starts_with(SCRIPT_PREFIX);
        debug!(import = %key, index = index.0, "interned import");
        self.imports.push(ImportEntry {
            full_name: key.clone(),
            object_name,
            outer,
            outermost,
            is_script,
            is_package: outer.is_none(),
        });
        self.import_lookup.insert(key, index);
        index
    }

    pub fn import(&self, index: ImportIndex) -> Option<&ImportEntry> {
        self.imports.get(index.as_usize())
    }

    /// Look up an import without interning it.
    pub fn find_import(&self, full_name: &str) -> Option<ImportIndex> {
        self.import_lookup.get(&full_name.to_lowercase()).copied()
    }

    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    // ---------------------------------------------------------------
    // Exports
    // ---------------------------------------------------------------

    /// Record that `full_name` is defined by `package` at `export`.
    /// Returns the previous owner if the path was already registered.
    pub fn register_export(
        &mut self,
        full_name: &str,
        package: PackageId,
        export: u32,
    ) -> Option<ExportEntry> {
        self.exports
            .insert(full_name.to_lowercase(), ExportEntry { package, export })
    }

    pub fn find_export(&self, full_name: &str) -> Option<ExportEntry> {
        self.exports.get(&full_name.to_lowercase()).copied()
    }

    pub fn export_count(&self) -> usize {
        self.exports.len()
    }
}

/// Split `/Game/Hero.Hero.Mesh` into `("/Game/Hero.Hero", "Mesh")`. Only a
/// '.' after the last '/' separates objects, so folders may contain dots.
pub(crate) fn split_object_path(path: &str) -> Option<(&str, &str)> {
    let folder_end = path.rfind('/').map_or(0, |i| i + 1);
    let dot = folder_end + path[folder_end..].rfind('.')?;
    Some((&path[..dot], &path[dot + 1..]))
}
