use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Index, IndexMut};

use iopack_types::PackageId;

use crate::error::{PackageError, PackageResult};
use crate::package::Package;

/// Position of a package inside a [`PackageArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageSlot(pub u32);

impl PackageSlot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PackageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owns every loaded package. Cross-package references are ids or slots,
/// never pointers, so the import graph may freely contain cycles.
#[derive(Clone, Debug, Default)]
pub struct PackageArena {
    packages: Vec<Package>,
    by_id: HashMap<PackageId, PackageSlot>,
}

impl PackageArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Add a package, assigning its slot.
    pub fn insert(&mut self, mut package: Package) -> PackageResult<PackageSlot> {
        if self.by_id.contains_key(&package.id) {
            return Err(PackageError::DuplicatePackage {
                name: package.name,
                id: package.id,
            });
        }
        let slot = PackageSlot(self.packages.len() as u32);
        package.slot = slot;
        self.by_id.insert(package.id, slot);
        self.packages.push(package);
        Ok(slot)
    }

    pub fn get(&self, slot: PackageSlot) -> Option<&Package> {
        self.packages.get(slot.index())
    }

    pub fn slot_of(&self, id: PackageId) -> Option<PackageSlot> {
        self.by_id.get(&id).copied()
    }

    pub fn by_id(&self, id: PackageId) -> Option<&Package> {
        self.slot_of(id).map(|slot| &self.packages[slot.index()])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        self.packages.iter_mut()
    }

    pub fn slots(&self) -> impl Iterator<Item = PackageSlot> {
        (0..self.packages.len() as u32).map(PackageSlot)
    }

    /// Slots of the packages `slot` imports that are part of this arena,
    /// in the package's import order.
    pub fn imported_slots(&self, slot: PackageSlot) -> Vec<PackageSlot> {
        self.packages[slot.index()]
            .imported_packages
            .iter()
            .filter_map(|id| self.slot_of(*id))
            .collect()
    }

    /// Every package reachable through imports from `slot`, sorted, without
    /// `slot` itself. Packages outside the arena are included but not
    /// followed further.
    pub fn import_closure(&self, slot: PackageSlot) -> Vec<PackageId> {
        let root = self.packages[slot.index()].id;
        let mut seen = HashSet::new();
        let mut stack = self.packages[slot.index()].imported_packages.clone();
        while let Some(id) = stack.pop() {
            if id == root || !seen.insert(id) {
                continue;
            }
            if let Some(imported) = self.by_id(id) {
                stack.extend(imported.imported_packages.iter().copied());
            }
        }
        let mut closure: Vec<PackageId> = seen.into_iter().collect();
        closure.sort();
        closure
    }
}

impl Index<PackageSlot> for PackageArena {
    type Output = Package;

    fn index(&self, slot: PackageSlot) -> &Package {
        &self.packages[slot.index()]
    }
}

impl IndexMut<PackageSlot> for PackageArena {
    fn index_mut(&mut self, slot: PackageSlot) -> &mut Package {
        &mut self.packages[slot.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderBuilder;
    use crate::interner::Interner;
    use crate::loader::PackageLoader;

    fn load(interner: &mut Interner, name: &str, imports: &[&str]) -> Package {
        let mut builder = HeaderBuilder::new();
        for import in imports {
            builder.import_package(import);
        }
        builder.export("Root", 8, true);
        let header = builder.build();
        PackageLoader::load(interner, name, &header, 8).unwrap()
    }

    #[test]
    fn insert_assigns_slots_in_order() {
        let mut interner = Interner::new();
        let mut arena = PackageArena::new();
        let a = arena.insert(load(&mut interner, "/Game/A", &[])).unwrap();
        let b = arena.insert(load(&mut interner, "/Game/B", &[])).unwrap();
        assert_eq!(a, PackageSlot(0));
        assert_eq!(b, PackageSlot(1));
        assert_eq!(arena[b].slot, b);
        assert_eq!(arena.slot_of(PackageId::from_name("/Game/B")), Some(b));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut interner = Interner::new();
        let mut arena = PackageArena::new();
        arena.insert(load(&mut interner, "/Game/A", &[])).unwrap();
        let err = arena.insert(load(&mut interner, "/game/a", &[])).unwrap_err();
        assert!(matches!(err, PackageError::DuplicatePackage { .. }));
    }

    #[test]
    fn imported_slots_skip_missing_packages() {
        let mut interner = Interner::new();
        let mut arena = PackageArena::new();
        let a = arena
            .insert(load(&mut interner, "/Game/A", &["/Game/B", "/Game/Missing"]))
            .unwrap();
        let b = arena.insert(load(&mut interner, "/Game/B", &[])).unwrap();
        assert_eq!(arena.imported_slots(a), vec![b]);
        assert!(arena.imported_slots(b).is_empty());
    }

    #[test]
    fn import_closure_follows_imports_transitively() {
        let mut interner = Interner::new();
        let mut arena = PackageArena::new();
        let a = arena.insert(load(&mut interner, "/Game/A", &["/Game/B"])).unwrap();
        let b = arena
            .insert(load(&mut interner, "/Game/B", &["/Game/C", "/Game/Missing"]))
            .unwrap();
        arena.insert(load(&mut interner, "/Game/C", &["/Game/A"])).unwrap();

        let mut expected: Vec<PackageId> = ["/Game/B", "/Game/C", "/Game/Missing"]
            .iter()
            .map(|name| PackageId::from_name(name))
            .collect();
        expected.sort();
        assert_eq!(arena.import_closure(a), expected);
        assert!(!arena.import_closure(b).contains(&PackageId::from_name("/Game/B")));
        assert!(arena.import_closure(b).contains(&PackageId::from_name("/Game/A")));
    }
}
