use std::collections::HashMap;

use iopack_package::{PackageArena, PackageSlot};
use iopack_types::PackageId;
use tracing::debug;

use crate::hints::OrderHints;
use crate::union_find::UnionFind;

/// Ranking of a package or cluster: lower sorts first.
///
/// Tier 0 is an explicit order hint, tier 1 an open-order hint, tier 2 the
/// load order of the first bundle and tier 3 a package without bundles.
type Rank = (u8, i64);

/// Decides the order in which a container's packages are written.
pub struct LayoutPlanner<'a> {
    hints: &'a OrderHints,
}

impl<'a> LayoutPlanner<'a> {
    pub fn new(hints: &'a OrderHints) -> Self {
        Self { hints }
    }

    /// Order `packages` for writing.
    ///
    /// Packages sharing any transitive import form a cluster and are written
    /// next to each other. Imported packages outside `packages`, and even
    /// outside the build, still join clusters. Clusters are sorted by their
    /// best member rank, then by their smallest member name; packages within
    /// a cluster by first-bundle load order (packages without bundles last),
    /// then by name.
    pub fn order_packages(&self, arena: &PackageArena, packages: &[PackageSlot]) -> Vec<PackageSlot> {
        let mut clusters = cluster_by_imports(arena, packages);

        let names: Vec<String> = packages
            .iter()
            .map(|slot| arena[*slot].name.to_lowercase())
            .collect();

        let mut groups: Vec<(Rank, String, Vec<usize>)> = clusters
            .groups()
            .into_iter()
            .map(|mut members| {
                let rank = members
                    .iter()
                    .map(|&m| self.rank(arena, packages[m]))
                    .min()
                    .unwrap_or((3, 0));
                let smallest = members
                    .iter()
                    .map(|&m| names[m].clone())
                    .min()
                    .unwrap_or_default();
                members.sort_by(|&x, &y| {
                    let lx = arena[packages[x]].first_load_order();
                    let ly = arena[packages[y]].first_load_order();
                    (lx.is_none(), lx, &names[x]).cmp(&(ly.is_none(), ly, &names[y]))
                });
                (rank, smallest, members)
            })
            .collect();
        groups.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        debug!(
            packages = packages.len(),
            clusters = groups.len(),
            "ordered packages for layout"
        );

        groups
            .into_iter()
            .flat_map(|(_, _, members)| members)
            .map(|m| packages[m])
            .collect()
    }

    fn rank(&self, arena: &PackageArena, slot: PackageSlot) -> Rank {
        let package = &arena[slot];
        if let Some(order) = self.hints.explicit(&package.name) {
            return (0, order);
        }
        if let Some(order) = self.hints.open(&package.name) {
            return (1, order);
        }
        match package.first_load_order() {
            Some(order) => (2, order as i64),
            None => (3, 0),
        }
    }
}

/// Union `packages` (by position) over their transitive import closures.
///
/// Every package id reached is owned by the first package that reached it;
/// a later package reaching an owned id joins the owner's set. An owned id
/// is never walked twice, so each import edge is followed at most once.
fn cluster_by_imports(arena: &PackageArena, packages: &[PackageSlot]) -> UnionFind {
    let mut clusters = UnionFind::new(packages.len());
    let mut owner: HashMap<PackageId, usize> = packages
        .iter()
        .enumerate()
        .map(|(i, slot)| (arena[*slot].id, i))
        .collect();

    for (i, slot) in packages.iter().enumerate() {
        let mut stack: Vec<PackageId> = arena[*slot].imported_packages.clone();
        while let Some(id) = stack.pop() {
            if let Some(&j) = owner.get(&id) {
                clusters.union(i, j);
                continue;
            }
            owner.insert(id, i);
            if let Some(imported) = arena.by_id(id) {
                stack.extend(imported.imported_packages.iter().copied());
            }
        }
    }
    clusters
}
