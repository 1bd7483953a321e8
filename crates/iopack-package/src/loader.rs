use iopack_types::{PackageId, PackageIndex};
use tracing::{debug, warn};

use crate::arena::{PackageArena, PackageSlot};
use crate::error::{PackageError, PackageResult};
use crate::header::{PackageHeader, DEPENDENCY_GROUPS};
use crate::interner::Interner;
use crate::package::{Export, Import, Package, PreloadDependency, OBJECT_FLAG_PUBLIC};

/// Turns a decoded source header into a [`Package`].
///
/// The header is validated completely before anything is interned, so a
/// corrupt header leaves the interner untouched. [`PackageLoader::load`]
/// registers the package's exports globally; a caller that may still reject
/// the package afterwards should go through [`PackageLoader::load_into`].
pub struct PackageLoader;

impl PackageLoader {
    /// Load a package and add it to `arena`. A package whose id is already
    /// taken (names differing only in case) is rejected before anything is
    /// interned, so its exports never shadow the first package's.
    pub fn load_into(
        interner: &mut Interner,
        arena: &mut PackageArena,
        name: &str,
        header: &PackageHeader,
        export_data_size: u64,
    ) -> PackageResult<PackageSlot> {
        let id = PackageId::from_name(name);
        if arena.slot_of(id).is_some() {
            return Err(PackageError::DuplicatePackage {
                name: name.to_string(),
                id,
            });
        }
        let package = Self::load(interner, name, header, export_data_size)?;
        arena.insert(package)
    }

    pub fn load(
        interner: &mut Interner,
        name: &str,
        header: &PackageHeader,
        export_data_size: u64,
    ) -> PackageResult<Package> {
        validate(header, export_data_size)?;

        let import_paths = import_paths(header);
        let export_paths = export_paths(header, &name.to_lowercase());

        let id = PackageId::from_name(name);
        let name_index = interner.intern(name);
        let names = header.names.iter().map(|n| interner.intern(n)).collect::<Vec<_>>();

        let mut imports = Vec::with_capacity(header.imports.len());
        for (raw, path) in header.imports.iter().zip(&import_paths) {
            let global = interner.intern_import(path);
            let (is_script, is_package, package) = match interner.import(global) {
                Some(entry) => {
                    let package = if entry.is_script {
                        None
                    } else {
                        interner
                            .import(entry.outermost)
                            .map(|root| PackageId::from_name(&root.full_name))
                    };
                    (entry.is_script, entry.is_package, package)
                }
                None => (false, false, None),
            };
            imports.push(Import {
                global,
                object_name: names[raw.object_name as usize],
                class_package: names[raw.class_package as usize],
                class_name: names[raw.class_name as usize],
                outer: raw.outer,
                package,
                is_script,
                is_package,
            });
        }

        let mut exports = Vec::with_capacity(header.exports.len());
        for (index, (raw, full_name)) in header.exports.iter().zip(export_paths).enumerate() {
            let index = index as u32;
            if let Some(previous) = interner.register_export(&full_name, id, index) {
                if previous.package != id {
                    warn!(
                        export = %full_name,
                        previous = %previous.package,
                        package = %id,
                        "export defined by more than one package, last one wins"
                    );
                }
            }
            exports.push(Export {
                index,
                object_name: names[raw.object_name as usize],
                full_name,
                outer: raw.outer,
                class: raw.class,
                super_struct: raw.super_struct,
                template: raw.template,
                object_flags: raw.object_flags,
                is_public: raw.object_flags & OBJECT_FLAG_PUBLIC != 0,
                serial_offset: raw.serial_offset,
                serial_size: raw.serial_size,
                filter: raw.filter,
                global_import: None,
            });
        }

        let mut preload_dependencies = Vec::with_capacity(header.preload.len());
        for (index, raw) in header.exports.iter().enumerate() {
            let Some(mut cursor) = raw.first_dependency.map(|f| f as usize) else {
                continue;
            };
            for (group, &count) in raw.dependency_counts.iter().enumerate() {
                let (from, to) = DEPENDENCY_GROUPS[group];
                for _ in 0..count {
                    preload_dependencies.push(PreloadDependency {
                        export: index as u32,
                        dependency: header.preload[cursor],
                        from,
                        to,
                    });
                    cursor += 1;
                }
            }
        }

        let mut imported_packages: Vec<PackageId> = imports
            .iter()
            .filter_map(|import| import.package)
            .filter(|package| *package != id)
            .collect();
        imported_packages.sort();
        imported_packages.dedup();

        debug!(
            package = name,
            %id,
            imports = imports.len(),
            exports = exports.len(),
            dependencies = preload_dependencies.len(),
            "loaded package"
        );

        Ok(Package {
            slot: PackageSlot(0),
            id,
            name: name.to_string(),
            name_index,
            flags: header.flags,
            header_size: header.total_size as u64,
            export_data_size,
            names,
            imports,
            exports,
            preload_dependencies,
            imported_packages,
            has_circular_import_dependencies: false,
            bundles: Vec::new(),
            internal_arcs: Vec::new(),
            external_arcs: Default::default(),
            script_arcs: Vec::new(),
        })
    }
}

/// Structural checks that need the whole header rather than one record.
fn validate(header: &PackageHeader, export_data_size: u64) -> PackageResult<()> {
    let import_count = header.imports.len();
    for start in 0..import_count {
        let mut current = header.imports[start].outer;
        let mut steps = 0;
        loop {
            match current {
                PackageIndex::Null => break,
                PackageIndex::Export(_) => {
                    return Err(PackageError::corrupt(format!(
                        "import {start} has an export in its outer chain"
                    )));
                }
                PackageIndex::Import(i) => {
                    steps += 1;
                    if steps > import_count {
                        return Err(PackageError::corrupt(format!(
                            "import {start} has a cyclic outer chain"
                        )));
                    }
                    current = header.imports[i as usize].outer;
                }
            }
        }
    }

    let export_count = header.exports.len();
    for (index, export) in header.exports.iter().enumerate() {
        let mut current = export.outer;
        let mut steps = 0;
        loop {
            match current {
                PackageIndex::Null => break,
                PackageIndex::Import(_) => {
                    return Err(PackageError::corrupt(format!(
                        "export {index} has an import in its outer chain"
                    )));
                }
                PackageIndex::Export(i) => {
                    steps += 1;
                    if steps > export_count {
                        return Err(PackageError::corrupt(format!(
                            "export {index} has a cyclic outer chain"
                        )));
                    }
                    current = header.exports[i as usize].outer;
                }
            }
        }

        let end = export.serial_offset.checked_add(export.serial_size);
        if end.map_or(true, |end| end > export_data_size) {
            return Err(PackageError::corrupt(format!(
                "export {index} serial range {}+{} exceeds export data of {export_data_size} bytes",
                export.serial_offset, export.serial_size
            )));
        }
    }
    Ok(())
}

fn import_paths(header: &PackageHeader) -> Vec<String> {
    fn path(header: &PackageHeader, index: usize, memo: &mut [Option<String>]) -> String {
        if let Some(done) = &memo[index] {
            return done.clone();
        }
        let raw = &header.imports[index];
        let object = &header.names[raw.object_name as usize];
        let full = match raw.outer {
            PackageIndex::Import(outer) => {
                format!("{}.{object}", path(header, outer as usize, memo))
            }
            _ => object.clone(),
        };
        memo[index] = Some(full.clone());
        full
    }

    let mut memo = vec![None; header.imports.len()];
    (0..header.imports.len())
        .map(|i| path(header, i, &mut memo))
        .collect()
}

fn export_paths(header: &PackageHeader, package: &str) -> Vec<String> {
    fn path(header: &PackageHeader, package: &str, index: usize, memo: &mut [Option<String>]) -> String {
        if let Some(done) = &memo[index] {
            return done.clone();
        }
        let raw = &header.exports[index];
        let object = header.names[raw.object_name as usize].to_lowercase();
        let full = match raw.outer {
            PackageIndex::Export(outer) => {
                format!("{}.{object}", path(header, package, outer as usize, memo))
            }
            _ => format!("{package}.{object}"),
        };
        memo[index] = Some(full.clone());
        full
    }

    let mut memo = vec![None; header.exports.len()];
    (0..header.exports.len())
        .map(|i| path(header, package, i, &mut memo))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderBuilder;
    use iopack_types::ExportPhase;

    fn hero_header() -> PackageHeader {
        let mut b = HeaderBuilder::new();
        let actor = b.import_object("/Script/Engine.Actor");
        let sword = b.import_object("/Game/Weapons/Sword.Sword");
        b.import_package("/Game/Shared");
        let hero = b.export("Hero", 64, true);
        let mesh = b.export_in(hero, "Mesh", 32, false);
        b.set_class(hero, actor);
        b.depend(hero, sword, ExportPhase::Serialize, ExportPhase::Serialize);
        b.depend(mesh, PackageIndex::Export(hero), ExportPhase::Create, ExportPhase::Create);
        b.depend(mesh, actor, ExportPhase::Create, ExportPhase::Serialize);
        b.build()
    }

    #[test]
    fn computes_full_names() {
        let mut interner = Interner::new();
        let pkg = PackageLoader::load(&mut interner, "/Game/Hero", &hero_header(), 96).unwrap();
        assert_eq!(pkg.exports[0].full_name, "/game/hero.hero");
        assert_eq!(pkg.exports[1].full_name, "/game/hero.hero.mesh");
        assert!(pkg.exports[0].is_public);
        assert!(!pkg.exports[1].is_public);

        let found = interner.find_export("/Game/Hero.Hero.Mesh").unwrap();
        assert_eq!(found.package, pkg.id);
        assert_eq!(found.export, 1);
    }

    #[test]
    fn resolves_import_packages() {
        let mut interner = Interner::new();
        let pkg = PackageLoader::load(&mut interner, "/Game/Hero", &hero_header(), 96).unwrap();

        let script = pkg.imports.iter().find(|i| i.is_script && !i.is_package).unwrap();
        assert_eq!(script.package, None);

        let sword_id = PackageId::from_name("/Game/Weapons/Sword");
        let sword = interner.find_import("/Game/Weapons/Sword.Sword").unwrap();
        let import = pkg.imports.iter().find(|i| i.global == sword).unwrap();
        assert_eq!(import.package, Some(sword_id));

        let mut expected = vec![sword_id, PackageId::from_name("/Game/Shared")];
        expected.sort();
        assert_eq!(pkg.imported_packages, expected);
    }

    #[test]
    fn duplicate_is_rejected_before_registering_exports() {
        let mut interner = Interner::new();
        let mut arena = PackageArena::new();
        let mut first = HeaderBuilder::new();
        first.export("E0", 4, true);
        PackageLoader::load_into(&mut interner, &mut arena, "/Game/A", &first.build(), 4).unwrap();

        let mut second = HeaderBuilder::new();
        for e in 0..3 {
            second.export(&format!("E{e}"), 4, true);
        }
        let err = PackageLoader::load_into(&mut interner, &mut arena, "/game/a", &second.build(), 12)
            .unwrap_err();
        assert!(matches!(err, PackageError::DuplicatePackage { .. }));
        assert_eq!(arena.len(), 1);
        assert!(interner.find_export("/Game/A.E2").is_none());
        assert_eq!(interner.find_export("/Game/A.E0").unwrap().export, 0);
    }

    #[test]
    fn self_imports_are_not_imported_packages() {
        let mut b = HeaderBuilder::new();
        b.import_object("/Game/Hero.Hero");
        b.export("Hero", 4, true);
        let mut interner = Interner::new();
        let pkg = PackageLoader::load(&mut interner, "/Game/Hero", &b.build(), 4).unwrap();
        assert!(pkg.imported_packages.is_empty());
    }

    #[test]
    fn flattens_preload_groups() {
        let mut interner = Interner::new();
        let pkg = PackageLoader::load(&mut interner, "/Game/Hero", &hero_header(), 96).unwrap();
        let deps = &pkg.preload_dependencies;
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].export, 0);
        assert_eq!((deps[0].from, deps[0].to), (ExportPhase::Serialize, ExportPhase::Serialize));
        // create-before-serialize is stored before create-before-create
        assert_eq!((deps[1].from, deps[1].to), (ExportPhase::Create, ExportPhase::Serialize));
        assert_eq!(deps[2].dependency, PackageIndex::Export(0));
        assert_eq!((deps[2].from, deps[2].to), (ExportPhase::Create, ExportPhase::Create));
    }

    #[test]
    fn import_outer_cycle_is_rejected_without_interning() {
        let mut header = hero_header();
        header.imports[0].outer = PackageIndex::Import(1);
        header.imports[1].outer = PackageIndex::Import(0);
        let mut interner = Interner::new();
        let err = PackageLoader::load(&mut interner, "/Game/Hero", &header, 96).unwrap_err();
        assert!(err.to_string().contains("cyclic outer chain"));
        assert!(interner.imports().is_empty());
        assert!(interner.names().is_empty());
    }

    #[test]
    fn export_as_import_outer_is_rejected() {
        let mut header = hero_header();
        header.imports[1].outer = PackageIndex::Export(0);
        let mut interner = Interner::new();
        let err = PackageLoader::load(&mut interner, "/Game/Hero", &header, 96).unwrap_err();
        assert!(matches!(err, PackageError::CorruptHeader(_)));
    }

    #[test]
    fn serial_range_beyond_export_data_is_rejected() {
        let mut interner = Interner::new();
        let err = PackageLoader::load(&mut interner, "/Game/Hero", &hero_header(), 95).unwrap_err();
        assert!(err.to_string().contains("serial range"));
    }
}
