//! Per-package store header: the first bytes of every package chunk.
//!
//! ```text
//! summary       header size, flags, package import, then count/offset pairs
//!               for names, imports, exports, bundles, entries; arc offset
//! name map      u32 global name index per local name
//! import map    u32 global import position per local import
//! export map    name, outer, class, super, template, global import,
//!               object flags, filter, serial offset, serial size
//! bundles       serial offset u64, load order, first entry, entry count
//! entries       phase u8, export u32
//! arcs          internal: count, (from, to)*
//!               external: package count, (id u64, count, (from, to)*)*
//! ```
//!
//! Export references are a tag byte (0 null, 1 export, 2 import) and a u32.
//! Arc endpoints use [`LoadNode::node_index`]. Serial offsets are relative to
//! the end of the header, where export data follows in bundle order.

use iopack_package::{Interner, Package};
use iopack_types::{
    BundleEntry, ByteReader, ByteWriter, ExportPhase, LoadArc, LoadNode, NameIndex, PackageId,
    PackageIndex,
};
use tracing::debug;

use crate::error::{ContainerError, ContainerResult};
use crate::global::GlobalImportTable;

pub const STORE_SUMMARY_SIZE: usize = 15 * 4;

const NONE: u32 = u32::MAX;
const EXPORT_RECORD_SIZE: usize = 4 + 5 * 4 + 4 + 4 + 1 + 8 + 8;
const BUNDLE_RECORD_SIZE: usize = 8 + 4 + 4 + 4;
const ENTRY_RECORD_SIZE: usize = 1 + 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreExport {
    pub object_name: NameIndex,
    pub outer: PackageIndex,
    pub class: PackageIndex,
    pub super_struct: PackageIndex,
    pub template: PackageIndex,
    /// Position in the global import table when another package imports it.
    pub global_import: Option<u32>,
    pub object_flags: u32,
    pub filter: u8,
    pub serial_offset: u64,
    pub serial_size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreBundle {
    /// Start of the bundle's export data, relative to the end of the header.
    pub serial_offset: u64,
    pub load_order: u32,
    pub first_entry: u32,
    pub entry_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorePackageHeader {
    pub flags: u32,
    /// The package's own position in the global import table, if imported.
    pub global_import: Option<u32>,
    pub names: Vec<NameIndex>,
    pub imports: Vec<u32>,
    pub exports: Vec<StoreExport>,
    pub bundles: Vec<StoreBundle>,
    pub entries: Vec<BundleEntry>,
    pub internal_arcs: Vec<LoadArc>,
    pub external_arcs: Vec<(PackageId, Vec<LoadArc>)>,
}

/// A serialized package chunk.
#[derive(Clone, Debug)]
pub struct StorePackage {
    pub header: StorePackageHeader,
    pub header_size: usize,
    pub payload: Vec<u8>,
}

impl StorePackageHeader {
    pub fn export_data_size(&self) -> u64 {
        self.exports.iter().map(|e| e.serial_size).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(
            STORE_SUMMARY_SIZE
                + (self.names.len() + self.imports.len()) * 4
                + self.exports.len() * EXPORT_RECORD_SIZE
                + self.bundles.len() * BUNDLE_RECORD_SIZE
                + self.entries.len() * ENTRY_RECORD_SIZE,
        );
        for _ in 0..STORE_SUMMARY_SIZE / 4 {
            w.write_u32(0);
        }

        let name_offset = w.len();
        for name in &self.names {
            w.write_u32(name.0);
        }
        let import_offset = w.len();
        for &import in &self.imports {
            w.write_u32(import);
        }
        let export_offset = w.len();
        for export in &self.exports {
            w.write_u32(export.object_name.0);
            for index in [export.outer, export.class, export.super_struct, export.template] {
                write_index(&mut w, index);
            }
            w.write_u32(export.global_import.unwrap_or(NONE));
            w.write_u32(export.object_flags);
            w.write_u8(export.filter);
            w.write_u64(export.serial_offset);
            w.write_u64(export.serial_size);
        }
        let bundle_offset = w.len();
        for bundle in &self.bundles {
            w.write_u64(bundle.serial_offset);
            w.write_u32(bundle.load_order);
            w.write_u32(bundle.first_entry);
            w.write_u32(bundle.entry_count);
        }
        let entry_offset = w.len();
        for entry in &self.entries {
            w.write_u8(entry.phase.type_byte());
            w.write_u32(entry.export);
        }
        let arc_offset = w.len();
        w.write_u32(self.internal_arcs.len() as u32);
        for arc in &self.internal_arcs {
            write_arc(&mut w, arc);
        }
        w.write_u32(self.external_arcs.len() as u32);
        for (source, arcs) in &self.external_arcs {
            w.write_u64(source.value());
            w.write_u32(arcs.len() as u32);
            for arc in arcs {
                write_arc(&mut w, arc);
            }
        }

        let summary = [
            w.len() as u32,
            self.flags,
            self.global_import.unwrap_or(NONE),
            self.names.len() as u32,
            name_offset as u32,
            self.imports.len() as u32,
            import_offset as u32,
            self.exports.len() as u32,
            export_offset as u32,
            self.bundles.len() as u32,
            bundle_offset as u32,
            self.entries.len() as u32,
            entry_offset as u32,
            arc_offset as u32,
            0,
        ];
        for (i, value) in summary.into_iter().enumerate() {
            w.patch_u32(i * 4, value);
        }
        w.into_inner()
    }

    /// Read the header at the front of a package chunk. Returns the header
    /// and its size; the export data follows.
    pub fn parse(data: &[u8]) -> ContainerResult<(Self, usize)> {
        let mut r = ByteReader::new(data);
        let header_size = r.read_u32()? as usize;
        if header_size < STORE_SUMMARY_SIZE || header_size > data.len() {
            return Err(ContainerError::corrupt(format!(
                "store header size {header_size} does not fit a {}-byte chunk",
                data.len()
            )));
        }
        let data = &data[..header_size];
        let mut r = ByteReader::new(data);
        r.seek(4)?;
        let flags = r.read_u32()?;
        let global_import = optional(r.read_u32()?);
        let mut table = || -> ContainerResult<(usize, usize)> {
            Ok((r.read_u32()? as usize, r.read_u32()? as usize))
        };
        let (name_count, name_offset) = table()?;
        let (import_count, import_offset) = table()?;
        let (export_count, export_offset) = table()?;
        let (bundle_count, bundle_offset) = table()?;
        let (entry_count, entry_offset) = table()?;
        let arc_offset = r.read_u32()? as usize;

        let mut r = ByteReader::new(data);
        r.seek(name_offset)?;
        let names = (0..name_count)
            .map(|_| Ok(NameIndex(r.read_u32()?)))
            .collect::<ContainerResult<Vec<_>>>()?;

        r.seek(import_offset)?;
        let imports = (0..import_count)
            .map(|_| Ok(r.read_u32()?))
            .collect::<ContainerResult<Vec<_>>>()?;

        r.seek(export_offset)?;
        let mut exports = Vec::with_capacity(export_count.min(data.len() / EXPORT_RECORD_SIZE));
        for _ in 0..export_count {
            exports.push(StoreExport {
                object_name: NameIndex(r.read_u32()?),
                outer: read_index(&mut r)?,
                class: read_index(&mut r)?,
                super_struct: read_index(&mut r)?,
                template: read_index(&mut r)?,
                global_import: optional(r.read_u32()?),
                object_flags: r.read_u32()?,
                filter: r.read_u8()?,
                serial_offset: r.read_u64()?,
                serial_size: r.read_u64()?,
            });
        }

        r.seek(bundle_offset)?;
        let mut bundles = Vec::with_capacity(bundle_count.min(data.len() / BUNDLE_RECORD_SIZE));
        for _ in 0..bundle_count {
            bundles.push(StoreBundle {
                serial_offset: r.read_u64()?,
                load_order: r.read_u32()?,
                first_entry: r.read_u32()?,
                entry_count: r.read_u32()?,
            });
        }

        r.seek(entry_offset)?;
        let mut entries = Vec::with_capacity(entry_count.min(data.len() / ENTRY_RECORD_SIZE));
        for _ in 0..entry_count {
            let phase = match r.read_u8()? {
                0 => ExportPhase::Create,
                1 => ExportPhase::Serialize,
                other => {
                    return Err(ContainerError::corrupt(format!("unknown bundle command {other}")))
                }
            };
            let export = r.read_u32()?;
            if export as usize >= exports.len() {
                return Err(ContainerError::corrupt(format!(
                    "bundle entry references export {export} of {}",
                    exports.len()
                )));
            }
            entries.push(BundleEntry { export, phase });
        }
        if let Some(bundle) = bundles
            .iter()
            .find(|b| b.first_entry as u64 + b.entry_count as u64 > entries.len() as u64)
        {
            return Err(ContainerError::corrupt(format!(
                "bundle with load order {} exceeds the entry table",
                bundle.load_order
            )));
        }

        r.seek(arc_offset)?;
        let internal_count = r.read_u32()?;
        let internal_arcs = (0..internal_count)
            .map(|_| read_arc(&mut r))
            .collect::<ContainerResult<Vec<_>>>()?;
        let source_count = r.read_u32()?;
        let mut external_arcs = Vec::new();
        for _ in 0..source_count {
            let source = PackageId::from_raw(r.read_u64()?);
            let count = r.read_u32()?;
            let arcs = (0..count)
                .map(|_| read_arc(&mut r))
                .collect::<ContainerResult<Vec<_>>>()?;
            external_arcs.push((source, arcs));
        }

        let header = Self {
            flags,
            global_import,
            names,
            imports,
            exports,
            bundles,
            entries,
            internal_arcs,
            external_arcs,
        };
        Ok((header, header_size))
    }
}

/// Build the store header of `package` and lay its export data out in
/// bundle serialize order behind it.
///
/// `export_data` is the package's export data file, addressed by the serial
/// offsets of the source header.
pub fn serialize_package(
    package: &Package,
    export_data: &[u8],
    interner: &Interner,
    imports: &GlobalImportTable,
) -> ContainerResult<StorePackage> {
    let corrupt = |reason: String| ContainerError::corrupt(format!("{}: {reason}", package.name));

    let mut header = StorePackageHeader {
        flags: package.flags.bits(),
        global_import: interner
            .find_import(&package.name)
            .map(|index| imports.remap(index))
            .transpose()?,
        names: package.names.clone(),
        imports: package
            .imports
            .iter()
            .map(|import| imports.remap(import.global))
            .collect::<ContainerResult<Vec<_>>>()?,
        internal_arcs: package.internal_arcs.clone(),
        external_arcs: package
            .external_arcs
            .iter()
            .map(|(source, arcs)| (*source, arcs.clone()))
            .collect(),
        ..Default::default()
    };

    let mut placed: Vec<Option<u64>> = vec![None; package.exports.len()];
    let mut data = Vec::with_capacity(export_data.len());
    for bundle in &package.bundles {
        header.bundles.push(StoreBundle {
            serial_offset: data.len() as u64,
            load_order: bundle.load_order,
            first_entry: header.entries.len() as u32,
            entry_count: bundle.entries.len() as u32,
        });
        header.entries.extend_from_slice(&bundle.entries);
        for index in bundle.serialized_exports() {
            let export = package
                .exports
                .get(index as usize)
                .ok_or_else(|| corrupt(format!("bundle references missing export {index}")))?;
            let end = export
                .serial_offset
                .checked_add(export.serial_size)
                .filter(|&end| end <= export_data.len() as u64)
                .ok_or_else(|| {
                    corrupt(format!(
                        "export {index} serial range exceeds {} bytes of export data",
                        export_data.len()
                    ))
                })?;
            placed[index as usize] = Some(data.len() as u64);
            data.extend_from_slice(&export_data[export.serial_offset as usize..end as usize]);
        }
    }

    for (index, export) in package.exports.iter().enumerate() {
        let serial_offset = placed[index]
            .ok_or_else(|| corrupt(format!("export {index} is not serialized by any bundle")))?;
        header.exports.push(StoreExport {
            object_name: export.object_name,
            outer: export.outer,
            class: export.class,
            super_struct: export.super_struct,
            template: export.template,
            global_import: export.global_import.map(|i| imports.remap(i)).transpose()?,
            object_flags: export.object_flags,
            filter: export.filter.type_byte(),
            serial_offset,
            serial_size: export.serial_size,
        });
    }

    let mut payload = header.to_bytes();
    let header_size = payload.len();
    payload.extend_from_slice(&data);
    debug!(
        package = %package.name,
        header_size,
        export_data = data.len(),
        bundles = header.bundles.len(),
        "serialized package"
    );
    Ok(StorePackage {
        header,
        header_size,
        payload,
    })
}

fn optional(value: u32) -> Option<u32> {
    (value != NONE).then_some(value)
}

fn write_index(w: &mut ByteWriter, index: PackageIndex) {
    match index {
        PackageIndex::Null => {
            w.write_u8(0);
            w.write_u32(0);
        }
        PackageIndex::Export(i) => {
            w.write_u8(1);
            w.write_u32(i);
        }
        PackageIndex::Import(i) => {
            w.write_u8(2);
            w.write_u32(i);
        }
    }
}

fn read_index(r: &mut ByteReader<'_>) -> ContainerResult<PackageIndex> {
    let tag = r.read_u8()?;
    let value = r.read_u32()?;
    match tag {
        0 => Ok(PackageIndex::Null),
        1 => Ok(PackageIndex::Export(value)),
        2 => Ok(PackageIndex::Import(value)),
        other => Err(ContainerError::corrupt(format!("unknown reference tag {other}"))),
    }
}

fn write_arc(w: &mut ByteWriter, arc: &LoadArc) {
    w.write_u32(arc.from.node_index());
    w.write_u32(arc.to.node_index());
}

fn read_arc(r: &mut ByteReader<'_>) -> ContainerResult<LoadArc> {
    let from = LoadNode::from_node_index(r.read_u32()?);
    let to = LoadNode::from_node_index(r.read_u32()?);
    Ok(LoadArc::new(from, to))
}
