//! Tables shared by every container of a build, written to the global container.

use iopack_hash::ContentHasher;
use iopack_package::{ImportEntry, Interner, PackageArena};
use iopack_types::{ByteReader, ByteWriter, ImportIndex, PackageId};
use tracing::debug;

use crate::error::{ContainerError, ContainerResult};

/// Name of the container holding the global tables.
pub const GLOBAL_CONTAINER: &str = "global";

const NO_IMPORT: u32 = u32::MAX;
const IMPORT_SCRIPT: u8 = 0x1;
const IMPORT_PACKAGE: u8 = 0x2;

/// The interner's import table in its final on-disk order.
///
/// Script imports come first, then imports grouped by their outermost
/// package, each group starting with the package itself.
#[derive(Clone, Debug, Default)]
pub struct GlobalImportTable {
    /// New position to interned index.
    order: Vec<ImportIndex>,
    /// Interned index to new position.
    remap: Vec<u32>,
}

impl GlobalImportTable {
    pub fn build(interner: &Interner) -> Self {
        let imports = interner.imports();
        let mut order: Vec<usize> = (0..imports.len()).collect();
        order.sort_by(|&a, &b| sort_key(imports, a).cmp(&sort_key(imports, b)));

        let mut remap = vec![0u32; imports.len()];
        for (position, &old) in order.iter().enumerate() {
            remap[old] = position as u32;
        }
        debug!(imports = order.len(), "sorted global import table");
        Self {
            order: order.into_iter().map(|i| ImportIndex(i as u32)).collect(),
            remap,
        }
    }

    /// Final position of an interned import.
    pub fn remap(&self, index: ImportIndex) -> ContainerResult<u32> {
        self.remap.get(index.as_usize()).copied().ok_or_else(|| {
            ContainerError::corrupt(format!("import {index} is not in the global import table"))
        })
    }

    /// Interned indices in final order.
    pub fn order(&self) -> &[ImportIndex] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// `count u32`, then per import: full name, object name index, outer
    /// position (`u32::MAX` for none) and script/package flags.
    pub fn encode(&self, interner: &Interner) -> ContainerResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.write_u32(self.order.len() as u32);
        for &index in &self.order {
            let entry = interner.import(index).ok_or_else(|| {
                ContainerError::corrupt(format!("import {index} missing from interner"))
            })?;
            w.write_string(&entry.full_name);
            w.write_u32(entry.object_name.0);
            w.write_u32(match entry.outer {
                Some(outer) => self.remap(outer)?,
                None => NO_IMPORT,
            });
            let mut flags = 0;
            if entry.is_script {
                flags |= IMPORT_SCRIPT;
            }
            if entry.is_package {
                flags |= IMPORT_PACKAGE;
            }
            w.write_u8(flags);
        }
        Ok(w.into_inner())
    }
}

fn sort_key(imports: &[ImportEntry], i: usize) -> (bool, &str, bool, &str) {
    let entry = &imports[i];
    let outermost = imports
        .get(entry.outermost.as_usize())
        .map_or(entry.full_name.as_str(), |e| e.full_name.as_str());
    (
        !entry.is_script,
        outermost,
        !entry.is_package,
        entry.full_name.as_str(),
    )
}

/// `count u32` followed by every interned name.
pub fn encode_names(interner: &Interner) -> Vec<u8> {
    let names = interner.names();
    let mut w = ByteWriter::new();
    w.write_u32(names.len() as u32);
    for name in names {
        w.write_string(name);
    }
    w.into_inner()
}

pub fn decode_names(data: &[u8]) -> ContainerResult<Vec<String>> {
    let mut r = ByteReader::new(data);
    let count = r.read_u32()?;
    (0..count).map(|_| Ok(r.read_string()?)).collect()
}

/// `count u32` followed by the case-insensitive 64-bit hash of every name,
/// parallel to the name batch.
pub fn encode_name_hashes(interner: &Interner) -> Vec<u8> {
    let names = interner.names();
    let mut w = ByteWriter::with_capacity(4 + names.len() * 8);
    w.write_u32(names.len() as u32);
    for name in names {
        w.write_u64(ContentHasher::NAME.name_hash(name));
    }
    w.into_inner()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackageScriptArcs {
    pub package: PackageId,
    /// First arc in [`InitialLoadMeta::script_arcs`].
    pub offset: u32,
    pub count: u32,
}

/// What a runtime needs before loading any package: the script packages to
/// create up front and, per package, the bundles waiting on script objects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitialLoadMeta {
    pub script_import_count: u32,
    pub packages: Vec<PackageScriptArcs>,
    /// Global import positions of script packages.
    pub script_outers: Vec<u32>,
    /// `(global import position, bundle index)` pairs.
    pub script_arcs: Vec<(u32, u32)>,
}

impl InitialLoadMeta {
    pub fn build(
        interner: &Interner,
        arena: &PackageArena,
        imports: &GlobalImportTable,
    ) -> ContainerResult<Self> {
        let mut meta = Self::default();
        for (i, entry) in interner.imports().iter().enumerate() {
            if !entry.is_script {
                continue;
            }
            meta.script_import_count += 1;
            if entry.is_package {
                meta.script_outers.push(imports.remap(ImportIndex(i as u32))?);
            }
        }
        meta.script_outers.sort_unstable();

        let mut packages: Vec<_> = arena.iter().collect();
        packages.sort_by_key(|p| p.id);
        for package in packages {
            let offset = meta.script_arcs.len() as u32;
            for arc in &package.script_arcs {
                meta.script_arcs.push((imports.remap(arc.import)?, arc.bundle));
            }
            meta.packages.push(PackageScriptArcs {
                package: package.id,
                offset,
                count: package.script_arcs.len() as u32,
            });
        }
        Ok(meta)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u32(self.packages.len() as u32);
        w.write_u32(self.script_import_count);
        for p in &self.packages {
            w.write_u64(p.package.value());
            w.write_u32(p.offset);
            w.write_u32(p.count);
        }
        w.write_u32(self.script_outers.len() as u32);
        for &outer in &self.script_outers {
            w.write_u32(outer);
        }
        w.write_u32(self.script_arcs.len() as u32);
        for &(import, bundle) in &self.script_arcs {
            w.write_u32(import);
            w.write_u32(bundle);
        }
        w.into_inner()
    }

    pub fn parse(data: &[u8]) -> ContainerResult<Self> {
        let mut r = ByteReader::new(data);
        let package_count = r.read_u32()?;
        let script_import_count = r.read_u32()?;
        let packages = (0..package_count)
            .map(|_| {
                Ok(PackageScriptArcs {
                    package: PackageId::from_raw(r.read_u64()?),
                    offset: r.read_u32()?,
                    count: r.read_u32()?,
                })
            })
            .collect::<ContainerResult<Vec<_>>>()?;
        let outer_count = r.read_u32()?;
        let script_outers = (0..outer_count)
            .map(|_| Ok(r.read_u32()?))
            .collect::<ContainerResult<Vec<_>>>()?;
        let arc_count = r.read_u32()?;
        let script_arcs = (0..arc_count)
            .map(|_| Ok((r.read_u32()?, r.read_u32()?)))
            .collect::<ContainerResult<Vec<_>>>()?;

        if let Some(p) = packages
            .iter()
            .find(|p| p.offset as u64 + p.count as u64 > script_arcs.len() as u64)
        {
            return Err(ContainerError::corrupt(format!(
                "script arcs of package {} exceed the arc table",
                p.package
            )));
        }
        Ok(Self {
            script_import_count,
            packages,
            script_outers,
            script_arcs,
        })
    }
}
