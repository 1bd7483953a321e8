//! Circular import detection and package-level postload arcs.
//!
//! A package normally may not start postloading before every package it
//! imports has started postloading. Inside an import cycle that rule would
//! deadlock, so for the packages reachable on a newly found cycle the arc is
//! weakened to "wait until their exports are serialized".

use std::collections::{BTreeSet, HashSet};

use iopack_hash::ContentHasher;
use iopack_package::{PackageArena, PackageSlot};
use iopack_types::{ContentHash, LoadArc};
use tracing::{debug, info};

/// One distinct circular import chain, canonicalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircularChain {
    /// Lower-cased names of the packages on the chain, sorted.
    pub packages: Vec<String>,
    pub hash: ContentHash,
}

#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    pub chains: Vec<CircularChain>,
    pub circular_packages: usize,
    pub postload_arcs: usize,
    pub exports_done_arcs: usize,
}

/// Mark packages with circular imports and add the postload arcs of every
/// package in the arena.
pub fn add_postload_dependencies(arena: &mut PackageArena) -> CycleReport {
    let mut report = CycleReport::default();
    let mut seen = HashSet::new();
    let mut visited = BTreeSet::new();

    for slot in arena.slots().collect::<Vec<_>>() {
        let mut dependents = BTreeSet::new();
        let mut circular = false;

        for imported in arena.imported_slots(slot) {
            visited.clear();
            let mut chain = vec![imported];
            let mut search = ChainSearch {
                arena: &*arena,
                target: slot,
                visited: &mut visited,
                seen: &mut seen,
                chains: &mut report.chains,
            };
            if search.find(imported, &mut chain) {
                circular = true;
                dependents.extend(visited.iter().copied());
            }
        }

        let id = arena[slot].id;
        for imported in arena.imported_slots(slot) {
            if !dependents.contains(&imported) {
                let source = arena[imported].id;
                if arena[slot].add_external_arc(source, LoadArc::postload()) {
                    report.postload_arcs += 1;
                }
            }
        }
        for &dependent in &dependents {
            if dependent == slot {
                continue;
            }
            let source = arena[dependent].id;
            if arena[slot].add_external_arc(source, LoadArc::exports_done()) {
                report.exports_done_arcs += 1;
            }
        }

        if circular {
            arena[slot].has_circular_import_dependencies = true;
            report.circular_packages += 1;
            debug!(
                package = %arena[slot].name,
                %id,
                dependents = dependents.len(),
                "package has circular import dependencies"
            );
        }
    }

    info!(
        chains = report.chains.len(),
        circular_packages = report.circular_packages,
        postload_arcs = report.postload_arcs,
        exports_done_arcs = report.exports_done_arcs,
        "added postload dependencies"
    );
    report
}

struct ChainSearch<'a> {
    arena: &'a PackageArena,
    target: PackageSlot,
    visited: &'a mut BTreeSet<PackageSlot>,
    seen: &'a mut HashSet<ContentHash>,
    chains: &'a mut Vec<CircularChain>,
}

impl ChainSearch<'_> {
    /// Depth-first search from `current` back to `target`. Returns true if at
    /// least one chain not seen before was closed.
    fn find(&mut self, current: PackageSlot, chain: &mut Vec<PackageSlot>) -> bool {
        if current == self.target {
            return self.record(chain);
        }
        if !self.visited.insert(current) {
            return false;
        }
        let mut found = false;
        for next in self.arena.imported_slots(current) {
            chain.push(next);
            found |= self.find(next, chain);
            chain.pop();
        }
        found
    }

    fn record(&mut self, chain: &[PackageSlot]) -> bool {
        let packages: BTreeSet<String> = chain
            .iter()
            .map(|slot| self.arena[*slot].name.to_lowercase())
            .collect();
        let packages: Vec<String> = packages.into_iter().collect();
        let hash = ContentHasher::CHAIN.hash_parts(packages.iter().map(|p| p.as_bytes()));
        if !self.seen.insert(hash) {
            return false;
        }
        debug!(packages = %packages.join(", "), "new circular import chain");
        self.chains.push(CircularChain { packages, hash });
        true
    }
}
