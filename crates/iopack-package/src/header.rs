//! Binary source header of a package.
//!
//! All integers are big-endian. Layout:
//!
//! ```text
//! summary   magic "PKGH", version, package flags,
//!           name/import/export/preload counts,
//!           name/import/export/preload offsets, total size
//! names     varint length + UTF-8, one per name
//! imports   class package, class name, outer (signed), object name
//! exports   class, super, template, outer (signed), object name, object flags,
//!           serial offset, serial size, filter, first dependency (signed),
//!           four dependency group counts
//! preload   signed package index, one per dependency
//! ```
//!
//! Dependency groups are stored in the order serialize-before-serialize,
//! create-before-serialize, serialize-before-create, create-before-create.

use std::collections::HashMap;

use iopack_types::{ByteReader, ByteWriter, ExportPhase, PackageIndex};

use crate::error::{PackageError, PackageResult};
use crate::interner::split_object_path;
use crate::package::{ExportFilter, PackageFlags, OBJECT_FLAG_PUBLIC};

pub const HEADER_MAGIC: &[u8; 4] = b"PKGH";
pub const HEADER_VERSION: u32 = 1;

const SUMMARY_SIZE: usize = 48;
const IMPORT_RECORD_SIZE: usize = 16;
const EXPORT_RECORD_SIZE: usize = 61;
const PRELOAD_RECORD_SIZE: usize = 4;

/// `(from, to)` phases of the four dependency groups, in wire order.
pub const DEPENDENCY_GROUPS: [(ExportPhase, ExportPhase); 4] = [
    (ExportPhase::Serialize, ExportPhase::Serialize),
    (ExportPhase::Create, ExportPhase::Serialize),
    (ExportPhase::Serialize, ExportPhase::Create),
    (ExportPhase::Create, ExportPhase::Create),
];

fn group_of(from: ExportPhase, to: ExportPhase) -> usize {
    DEPENDENCY_GROUPS
        .iter()
        .position(|&g| g == (from, to))
        .unwrap_or(0)
}

/// Import record with local name indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawImport {
    pub class_package: u32,
    pub class_name: u32,
    pub outer: PackageIndex,
    pub object_name: u32,
}

/// Export record with local name indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawExport {
    pub class: PackageIndex,
    pub super_struct: PackageIndex,
    pub template: PackageIndex,
    pub outer: PackageIndex,
    pub object_name: u32,
    pub object_flags: u32,
    pub serial_offset: u64,
    pub serial_size: u64,
    pub filter: ExportFilter,
    /// First entry of this export's dependencies in the preload list.
    pub first_dependency: Option<u32>,
    /// Entry counts of the four dependency groups.
    pub dependency_counts: [u32; 4],
}

impl RawExport {
    pub fn dependency_count(&self) -> u64 {
        self.dependency_counts.iter().map(|&c| c as u64).sum()
    }
}

/// Decoded source header. Names are still local strings; nothing is interned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageHeader {
    pub flags: PackageFlags,
    pub names: Vec<String>,
    pub imports: Vec<RawImport>,
    pub exports: Vec<RawExport>,
    pub preload: Vec<PackageIndex>,
    /// Size of the encoded header in bytes.
    pub total_size: u32,
}

impl PackageHeader {
    /// Decode and validate a source header.
    pub fn parse(data: &[u8]) -> PackageResult<Self> {
        if data.len() < SUMMARY_SIZE {
            return Err(PackageError::corrupt(format!(
                "header is {} bytes, summary needs {SUMMARY_SIZE}",
                data.len()
            )));
        }
        if &data[0..4] != HEADER_MAGIC {
            return Err(PackageError::InvalidMagic {
                expected: "PKGH".into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }

        let mut r = ByteReader::new(data);
        r.seek(4)?;
        let version = r.read_u32()?;
        if version != HEADER_VERSION {
            return Err(PackageError::UnsupportedVersion(version));
        }
        let flags = PackageFlags::from_bits(r.read_u32()?);
        let name_count = r.read_u32()?;
        let import_count = r.read_u32()?;
        let export_count = r.read_u32()?;
        let preload_count = r.read_u32()?;
        let name_offset = r.read_u32()?;
        let import_offset = r.read_u32()?;
        let export_offset = r.read_u32()?;
        let preload_offset = r.read_u32()?;
        let total_size = r.read_u32()?;

        if total_size as usize != data.len() {
            return Err(PackageError::corrupt(format!(
                "summary declares {total_size} bytes, buffer holds {}",
                data.len()
            )));
        }
        check_table("name", name_offset, name_count, 1, data.len())?;
        check_table("import", import_offset, import_count, IMPORT_RECORD_SIZE, data.len())?;
        check_table("export", export_offset, export_count, EXPORT_RECORD_SIZE, data.len())?;
        check_table("preload", preload_offset, preload_count, PRELOAD_RECORD_SIZE, data.len())?;

        r.seek(name_offset as usize)?;
        let mut names = Vec::with_capacity(name_count as usize);
        for _ in 0..name_count {
            names.push(r.read_string()?);
        }

        let refs = RefBounds {
            names: name_count,
            imports: import_count,
            exports: export_count,
        };

        r.seek(import_offset as usize)?;
        let mut imports = Vec::with_capacity(import_count as usize);
        for i in 0..import_count {
            let import = RawImport {
                class_package: r.read_u32()?,
                class_name: r.read_u32()?,
                outer: PackageIndex::from_signed(r.read_i32()?),
                object_name: r.read_u32()?,
            };
            let what = format!("import {i}");
            refs.check_name(import.class_package, &what)?;
            refs.check_name(import.class_name, &what)?;
            refs.check_name(import.object_name, &what)?;
            refs.check_index(import.outer, &what)?;
            imports.push(import);
        }

        r.seek(export_offset as usize)?;
        let mut exports = Vec::with_capacity(export_count as usize);
        for i in 0..export_count {
            let class = PackageIndex::from_signed(r.read_i32()?);
            let super_struct = PackageIndex::from_signed(r.read_i32()?);
            let template = PackageIndex::from_signed(r.read_i32()?);
            let outer = PackageIndex::from_signed(r.read_i32()?);
            let object_name = r.read_u32()?;
            let object_flags = r.read_u32()?;
            let serial_offset = r.read_u64()?;
            let serial_size = r.read_u64()?;
            let filter_byte = r.read_u8()?;
            let filter = ExportFilter::from_type_byte(filter_byte).ok_or_else(|| {
                PackageError::corrupt(format!("export {i}: unknown filter {filter_byte}"))
            })?;
            let first_dependency = match r.read_i32()? {
                n if n < 0 => None,
                n => Some(n as u32),
            };
            let mut dependency_counts = [0u32; 4];
            for count in &mut dependency_counts {
                *count = r.read_u32()?;
            }
            let export = RawExport {
                class,
                super_struct,
                template,
                outer,
                object_name,
                object_flags,
                serial_offset,
                serial_size,
                filter,
                first_dependency,
                dependency_counts,
            };

            let what = format!("export {i}");
            refs.check_name(object_name, &what)?;
            for index in [class, super_struct, template, outer] {
                refs.check_index(index, &what)?;
            }
            let deps = export.dependency_count();
            if deps > 0 {
                let first = first_dependency.ok_or_else(|| {
                    PackageError::corrupt(format!("{what}: {deps} dependencies but no first entry"))
                })?;
                if first as u64 + deps > preload_count as u64 {
                    return Err(PackageError::corrupt(format!(
                        "{what}: dependencies {first}..{} exceed preload list of {preload_count}",
                        first as u64 + deps
                    )));
                }
            }
            exports.push(export);
        }

        r.seek(preload_offset as usize)?;
        let mut preload = Vec::with_capacity(preload_count as usize);
        for i in 0..preload_count {
            let index = PackageIndex::from_signed(r.read_i32()?);
            refs.check_index(index, &format!("preload entry {i}"))?;
            preload.push(index);
        }

        Ok(Self {
            flags,
            names,
            imports,
            exports,
            preload,
            total_size,
        })
    }

    /// Encode the header. `total_size` is recomputed.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut names = ByteWriter::new();
        for name in &self.names {
            names.write_string(name);
        }
        let name_offset = SUMMARY_SIZE;
        let import_offset = name_offset + names.len();
        let export_offset = import_offset + self.imports.len() * IMPORT_RECORD_SIZE;
        let preload_offset = export_offset + self.exports.len() * EXPORT_RECORD_SIZE;
        let total = preload_offset + self.preload.len() * PRELOAD_RECORD_SIZE;

        let mut w = ByteWriter::with_capacity(total);
        w.write_bytes(HEADER_MAGIC);
        w.write_u32(HEADER_VERSION);
        w.write_u32(self.flags.bits());
        w.write_u32(self.names.len() as u32);
        w.write_u32(self.imports.len() as u32);
        w.write_u32(self.exports.len() as u32);
        w.write_u32(self.preload.len() as u32);
        w.write_u32(name_offset as u32);
        w.write_u32(import_offset as u32);
        w.write_u32(export_offset as u32);
        w.write_u32(preload_offset as u32);
        w.write_u32(total as u32);
        w.write_bytes(names.as_slice());

        for import in &self.imports {
            w.write_u32(import.class_package);
            w.write_u32(import.class_name);
            w.write_i32(import.outer.to_signed());
            w.write_u32(import.object_name);
        }
        for export in &self.exports {
            w.write_i32(export.class.to_signed());
            w.write_i32(export.super_struct.to_signed());
            w.write_i32(export.template.to_signed());
            w.write_i32(export.outer.to_signed());
            w.write_u32(export.object_name);
            w.write_u32(export.object_flags);
            w.write_u64(export.serial_offset);
            w.write_u64(export.serial_size);
            w.write_u8(export.filter.type_byte());
            w.write_i32(export.first_dependency.map_or(-1, |f| f as i32));
            for count in export.dependency_counts {
                w.write_u32(count);
            }
        }
        for index in &self.preload {
            w.write_i32(index.to_signed());
        }
        w.into_inner()
    }

    /// Sum of the serial sizes of all exports.
    pub fn export_data_size(&self) -> u64 {
        self.exports.iter().map(|e| e.serial_size).sum()
    }
}

fn check_table(what: &str, offset: u32, count: u32, record: usize, len: usize) -> PackageResult<()> {
    let start = offset as u64;
    let end = start + count as u64 * record as u64;
    if start < SUMMARY_SIZE as u64 || end > len as u64 {
        return Err(PackageError::corrupt(format!(
            "{what} table {start}..{end} lies outside header of {len} bytes"
        )));
    }
    Ok(())
}

struct RefBounds {
    names: u32,
    imports: u32,
    exports: u32,
}

impl RefBounds {
    fn check_name(&self, index: u32, what: &str) -> PackageResult<()> {
        if index >= self.names {
            return Err(PackageError::corrupt(format!(
                "{what}: name {index} out of range ({} names)",
                self.names
            )));
        }
        Ok(())
    }

    fn check_index(&self, index: PackageIndex, what: &str) -> PackageResult<()> {
        let ok = match index {
            PackageIndex::Null => true,
            PackageIndex::Export(i) => i < self.exports,
            PackageIndex::Import(i) => i < self.imports,
        };
        if !ok {
            return Err(PackageError::corrupt(format!("{what}: {index} out of range")));
        }
        Ok(())
    }
}

/// Assembles source headers programmatically.
///
/// Exports get consecutive serial offsets in declaration order, so the export
/// data blob of a built header is the concatenation of the exports' bytes.
#[derive(Clone, Debug, Default)]
pub struct HeaderBuilder {
    flags: PackageFlags,
    names: Vec<String>,
    name_lookup: HashMap<String, u32>,
    imports: Vec<RawImport>,
    import_lookup: HashMap<String, PackageIndex>,
    exports: Vec<RawExport>,
    dependencies: Vec<[Vec<PackageIndex>; 4]>,
    next_serial_offset: u64,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&mut self, flags: PackageFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Local index of `name`, adding it if needed.
    pub fn name(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.name_lookup.get(name) {
            return index;
        }
        let index = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_lookup.insert(name.to_string(), index);
        index
    }

    /// Import of a whole package, e.g. `/Game/Maps/Arena`.
    pub fn import_package(&mut self, package: &str) -> PackageIndex {
        self.add_import(package, PackageIndex::Null, package, "Package")
    }

    /// Import of an object path, e.g. `/Game/Hero.Hero` or
    /// `/Script/Engine.Actor`. Outers are imported on demand.
    pub fn import_object(&mut self, path: &str) -> PackageIndex {
        match split_object_path(path) {
            Some((outer_path, object)) => {
                let outer = if split_object_path(outer_path).is_some() {
                    self.import_object(outer_path)
                } else {
                    self.import_package(outer_path)
                };
                self.add_import(path, outer, object, "Object")
            }
            None => self.import_package(path),
        }
    }

    fn add_import(&mut self, key: &str, outer: PackageIndex, object: &str, class: &str) -> PackageIndex {
        if let Some(&index) = self.import_lookup.get(key) {
            return index;
        }
        let import = RawImport {
            class_package: self.name("/Script/CoreUObject"),
            class_name: self.name(class),
            outer,
            object_name: self.name(object),
        };
        let index = PackageIndex::Import(self.imports.len() as u32);
        self.imports.push(import);
        self.import_lookup.insert(key.to_string(), index);
        index
    }

    /// Top-level export of `serial_size` bytes.
    pub fn export(&mut self, name: &str, serial_size: u64, public: bool) -> u32 {
        self.add_export(PackageIndex::Null, name, serial_size, public)
    }

    /// Export nested inside export `outer`.
    pub fn export_in(&mut self, outer: u32, name: &str, serial_size: u64, public: bool) -> u32 {
        self.add_export(PackageIndex::Export(outer), name, serial_size, public)
    }

    fn add_export(&mut self, outer: PackageIndex, name: &str, serial_size: u64, public: bool) -> u32 {
        let index = self.exports.len() as u32;
        let object_name = self.name(name);
        self.exports.push(RawExport {
            class: PackageIndex::Null,
            super_struct: PackageIndex::Null,
            template: PackageIndex::Null,
            outer,
            object_name,
            object_flags: if public { OBJECT_FLAG_PUBLIC } else { 0 },
            serial_offset: self.next_serial_offset,
            serial_size,
            filter: ExportFilter::None,
            first_dependency: None,
            dependency_counts: [0; 4],
        });
        self.dependencies.push(Default::default());
        self.next_serial_offset += serial_size;
        index
    }

    pub fn set_class(&mut self, export: u32, class: PackageIndex) -> &mut Self {
        self.exports[export as usize].class = class;
        self
    }

    pub fn set_filter(&mut self, export: u32, filter: ExportFilter) -> &mut Self {
        self.exports[export as usize].filter = filter;
        self
    }

    /// Before `to` of `export` runs, `dependency` must reach `from`.
    pub fn depend(
        &mut self,
        export: u32,
        dependency: PackageIndex,
        from: ExportPhase,
        to: ExportPhase,
    ) -> &mut Self {
        self.dependencies[export as usize][group_of(from, to)].push(dependency);
        self
    }

    pub fn build(&self) -> PackageHeader {
        let mut exports = self.exports.clone();
        let mut preload = Vec::new();
        for (export, groups) in exports.iter_mut().zip(&self.dependencies) {
            let first = preload.len() as u32;
            for (group, entries) in groups.iter().enumerate() {
                export.dependency_counts[group] = entries.len() as u32;
                preload.extend_from_slice(entries);
            }
            if preload.len() as u32 > first {
                export.first_dependency = Some(first);
            }
        }
        let mut header = PackageHeader {
            flags: self.flags,
            names: self.names.clone(),
            imports: self.imports.clone(),
            exports,
            preload,
            total_size: 0,
        };
        header.total_size = header.to_bytes().len() as u32;
        header
    }
}
