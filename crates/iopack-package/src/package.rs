use std::collections::BTreeMap;

use iopack_types::{
    ExportBundle, ExportPhase, ImportIndex, LoadArc, NameIndex, PackageId, PackageIndex, ScriptArc,
};

use crate::arena::PackageSlot;

/// Object flag marking an export as visible to other packages.
pub const OBJECT_FLAG_PUBLIC: u32 = 0x0000_0001;

/// Package-level flags carried through to the store header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackageFlags {
    pub editor_only: bool,
    pub not_for_client: bool,
    pub not_for_server: bool,
}

impl PackageFlags {
    const EDITOR_ONLY: u32 = 0x1;
    const NOT_FOR_CLIENT: u32 = 0x2;
    const NOT_FOR_SERVER: u32 = 0x4;

    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.editor_only {
            bits |= Self::EDITOR_ONLY;
        }
        if self.not_for_client {
            bits |= Self::NOT_FOR_CLIENT;
        }
        if self.not_for_server {
            bits |= Self::NOT_FOR_SERVER;
        }
        bits
    }

    /// Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            editor_only: bits & Self::EDITOR_ONLY != 0,
            not_for_client: bits & Self::NOT_FOR_CLIENT != 0,
            not_for_server: bits & Self::NOT_FOR_SERVER != 0,
        }
    }
}

/// Client/server filtering of a single export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFilter {
    #[default]
    None,
    NotForClient,
    NotForServer,
}

impl ExportFilter {
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::NotForClient => 1,
            Self::NotForServer => 2,
        }
    }

    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::None),
            1 => Some(Self::NotForClient),
            2 => Some(Self::NotForServer),
            _ => None,
        }
    }
}

/// A reference from this package to an object that may live elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    /// Position in the global import table.
    pub global: ImportIndex,
    pub object_name: NameIndex,
    pub class_package: NameIndex,
    pub class_name: NameIndex,
    /// Outer inside this package's import table.
    pub outer: PackageIndex,
    /// Package owning the imported object. `None` for script objects.
    pub package: Option<PackageId>,
    pub is_script: bool,
    pub is_package: bool,
}

/// An object defined by this package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Export {
    pub index: u32,
    pub object_name: NameIndex,
    /// Lower-cased dotted path, the key of the global export table.
    pub full_name: String,
    pub outer: PackageIndex,
    pub class: PackageIndex,
    pub super_struct: PackageIndex,
    pub template: PackageIndex,
    pub object_flags: u32,
    pub is_public: bool,
    /// Offset of the serialized object inside the package's export data.
    pub serial_offset: u64,
    pub serial_size: u64,
    pub filter: ExportFilter,
    /// Global import index, set once some package of the build imports this export.
    pub global_import: Option<ImportIndex>,
}

/// Before `to` of export `export` may run, `dependency` must reach `from`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PreloadDependency {
    pub export: u32,
    pub dependency: PackageIndex,
    pub from: ExportPhase,
    pub to: ExportPhase,
}

/// One compilation unit, annotated in place by every stage of the pipeline.
#[derive(Clone, Debug)]
pub struct Package {
    pub slot: PackageSlot,
    pub id: PackageId,
    pub name: String,
    pub name_index: NameIndex,
    pub flags: PackageFlags,
    pub header_size: u64,
    pub export_data_size: u64,
    /// Local name map: local index to global name.
    pub names: Vec<NameIndex>,
    pub imports: Vec<Import>,
    pub exports: Vec<Export>,
    pub preload_dependencies: Vec<PreloadDependency>,
    /// Packages referenced by package imports, sorted, without self.
    pub imported_packages: Vec<PackageId>,

    pub has_circular_import_dependencies: bool,
    pub bundles: Vec<ExportBundle>,
    /// Arcs between bundles of this package.
    pub internal_arcs: Vec<LoadArc>,
    /// Arcs from other packages, keyed by the source package.
    pub external_arcs: BTreeMap<PackageId, Vec<LoadArc>>,
    pub script_arcs: Vec<ScriptArc>,
}

impl Package {
    /// Load order of the first bundle, if the package has any exports.
    pub fn first_load_order(&self) -> Option<u32> {
        self.bundles.first().map(|b| b.load_order)
    }

    /// Add an arc from `source` unless an identical one is already recorded.
    pub fn add_external_arc(&mut self, source: PackageId, arc: LoadArc) -> bool {
        let arcs = self.external_arcs.entry(source).or_default();
        if arcs.contains(&arc) {
            return false;
        }
        arcs.push(arc);
        true
    }

    pub fn add_internal_arc(&mut self, arc: LoadArc) -> bool {
        if self.internal_arcs.contains(&arc) {
            return false;
        }
        self.internal_arcs.push(arc);
        true
    }

    pub fn add_script_arc(&mut self, arc: ScriptArc) -> bool {
        if self.script_arcs.contains(&arc) {
            return false;
        }
        self.script_arcs.push(arc);
        true
    }

    pub fn external_arc_count(&self) -> usize {
        self.external_arcs.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_package() -> Package {
        Package {
            slot: PackageSlot(0),
            id: PackageId::from_name("/Game/Empty"),
            name: "/Game/Empty".into(),
            name_index: NameIndex(0),
            flags: PackageFlags::default(),
            header_size: 0,
            export_data_size: 0,
            names: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            preload_dependencies: Vec::new(),
            imported_packages: Vec::new(),
            has_circular_import_dependencies: false,
            bundles: Vec::new(),
            internal_arcs: Vec::new(),
            external_arcs: BTreeMap::new(),
            script_arcs: Vec::new(),
        }
    }

    #[test]
    fn flags_roundtrip() {
        let flags = PackageFlags {
            editor_only: true,
            not_for_client: false,
            not_for_server: true,
        };
        assert_eq!(flags.bits(), 0x5);
        assert_eq!(PackageFlags::from_bits(flags.bits()), flags);
        assert_eq!(PackageFlags::from_bits(0xF0), PackageFlags::default());
    }

    #[test]
    fn filter_bytes() {
        assert_eq!(ExportFilter::from_type_byte(1), Some(ExportFilter::NotForClient));
        assert_eq!(ExportFilter::NotForServer.type_byte(), 2);
        assert_eq!(ExportFilter::from_type_byte(3), None);
    }

    #[test]
    fn external_arcs_are_deduplicated() {
        let mut pkg = empty_package();
        let source = PackageId::from_name("/Game/Source");
        assert!(pkg.add_external_arc(source, LoadArc::postload()));
        assert!(!pkg.add_external_arc(source, LoadArc::postload()));
        assert!(pkg.add_external_arc(source, LoadArc::bundles(0, 0)));
        assert_eq!(pkg.external_arc_count(), 2);
    }

    #[test]
    fn first_load_order_requires_bundles() {
        let mut pkg = empty_package();
        assert_eq!(pkg.first_load_order(), None);
        pkg.bundles.push(ExportBundle::new(12));
        pkg.bundles.push(ExportBundle::new(15));
        assert_eq!(pkg.first_load_order(), Some(12));
    }
}
