use iopack_package::{PackageArena, PackageSlot};
use iopack_types::{ByteReader, ByteWriter, PackageId};

use crate::error::ContainerResult;

const NO_LOAD_ORDER: u32 = u32::MAX;

/// Directory entry of one package in a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerHeaderEntry {
    pub package: PackageId,
    pub export_count: u32,
    pub bundle_count: u32,
    pub first_load_order: Option<u32>,
    /// Transitive import closure, sorted.
    pub imported_packages: Vec<PackageId>,
}

impl ContainerHeaderEntry {
    pub fn from_package(arena: &PackageArena, slot: PackageSlot) -> Self {
        let package = &arena[slot];
        Self {
            package: package.id,
            export_count: package.exports.len() as u32,
            bundle_count: package.bundles.len() as u32,
            first_load_order: package.first_load_order(),
            imported_packages: arena.import_closure(slot),
        }
    }
}

/// Package directory of a container, stored as its own chunk once every
/// package has been written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Derived from the container name.
    pub container: PackageId,
    pub entries: Vec<ContainerHeaderEntry>,
}

impl ContainerHeader {
    pub fn new(name: &str) -> Self {
        Self {
            container: PackageId::from_name(name),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ContainerHeaderEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, package: PackageId) -> Option<&ContainerHeaderEntry> {
        self.entries.iter().find(|e| e.package == package)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u64(self.container.value());
        w.write_u32(self.entries.len() as u32);
        for entry in &self.entries {
            w.write_u64(entry.package.value());
            w.write_u32(entry.export_count);
            w.write_u32(entry.bundle_count);
            w.write_u32(entry.first_load_order.unwrap_or(NO_LOAD_ORDER));
            w.write_u32(entry.imported_packages.len() as u32);
            for id in &entry.imported_packages {
                w.write_u64(id.value());
            }
        }
        w.into_inner()
    }

    pub fn parse(data: &[u8]) -> ContainerResult<Self> {
        let mut r = ByteReader::new(data);
        let container = PackageId::from_raw(r.read_u64()?);
        let count = r.read_u32()?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let package = PackageId::from_raw(r.read_u64()?);
            let export_count = r.read_u32()?;
            let bundle_count = r.read_u32()?;
            let load_order = r.read_u32()?;
            let imported = r.read_u32()?;
            let imported_packages = (0..imported)
                .map(|_| Ok(PackageId::from_raw(r.read_u64()?)))
                .collect::<ContainerResult<Vec<_>>>()?;
            entries.push(ContainerHeaderEntry {
                package,
                export_count,
                bundle_count,
                first_load_order: (load_order != NO_LOAD_ORDER).then_some(load_order),
                imported_packages,
            });
        }
        Ok(Self { container, entries })
    }
}
