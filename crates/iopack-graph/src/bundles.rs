//! Export bundles and the load order of the whole build.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use iopack_package::{PackageArena, PackageSlot};
use iopack_types::{BundleEntry, ExportBundle, LoadArc, ScriptArc};
use tracing::{debug, info};

use crate::error::{GraphError, GraphResult};
use crate::export_graph::{ExportGraph, NodeId};

#[derive(Clone, Debug, Default)]
pub struct BundleReport {
    /// Packages in load order, imported packages first.
    pub package_order: Vec<PackageSlot>,
    pub bundles: u32,
    pub internal_arcs: usize,
    pub external_arcs: usize,
    pub script_arcs: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first post-order over the import graph: packages are visited in id
/// order, their imports in id order, and back edges of import cycles are
/// ignored. Every package comes after the packages it imports unless they
/// share a cycle.
pub fn package_load_order(arena: &PackageArena) -> Vec<PackageSlot> {
    let mut roots: Vec<PackageSlot> = arena.slots().collect();
    roots.sort_by_key(|slot| arena[*slot].id);

    let mut marks = vec![Mark::Unvisited; arena.len()];
    let mut order = Vec::with_capacity(arena.len());
    for root in roots {
        if marks[root.index()] != Mark::Unvisited {
            continue;
        }
        marks[root.index()] = Mark::InProgress;
        let mut stack = vec![(root, arena.imported_slots(root), 0usize)];
        while let Some((slot, imports, next)) = stack.last_mut() {
            if *next < imports.len() {
                let child = imports[*next];
                *next += 1;
                if marks[child.index()] == Mark::Unvisited {
                    marks[child.index()] = Mark::InProgress;
                    stack.push((child, arena.imported_slots(child), 0));
                }
            } else {
                let done = *slot;
                marks[done.index()] = Mark::Done;
                order.push(done);
                stack.pop();
            }
        }
    }
    order
}

/// Order every export node, cut the order into bundles and convert the node
/// edges into bundle arcs on the packages.
///
/// Ready nodes are kept per package. The earliest package (in
/// [`package_load_order`]) with ready nodes is drained completely, including
/// nodes that become ready while draining, before the scan restarts from the
/// earliest package. Each drained run is one bundle.
pub fn build_bundles(graph: &ExportGraph, arena: &mut PackageArena) -> GraphResult<BundleReport> {
    let order = package_load_order(arena);
    let mut position = vec![0usize; arena.len()];
    for (pos, slot) in order.iter().enumerate() {
        position[slot.index()] = pos;
    }

    let mut in_degree = vec![0u32; graph.len()];
    for node in graph.nodes() {
        for succ in node.internal.iter().chain(&node.external) {
            in_degree[succ.index()] += 1;
        }
    }

    let mut ready: Vec<BinaryHeap<Reverse<NodeId>>> = vec![BinaryHeap::new(); order.len()];
    let mut ready_packages = BTreeSet::new();
    for (index, node) in graph.nodes().iter().enumerate() {
        if in_degree[index] == 0 {
            let pos = position[node.package.index()];
            ready[pos].push(Reverse(NodeId(index as u32)));
            ready_packages.insert(pos);
        }
    }

    let mut assignment: Vec<Option<u32>> = vec![None; graph.len()];
    let mut next_load_order = 0u32;
    let mut emitted = 0usize;
    let mut last: Option<PackageSlot> = None;
    let mut current = 0u32;

    while let Some(pos) = ready_packages.pop_first() {
        let slot = order[pos];
        while let Some(Reverse(id)) = ready[pos].pop() {
            if last != Some(slot) {
                let package = &mut arena[slot];
                package.bundles.push(ExportBundle::new(next_load_order));
                current = package.bundles.len() as u32 - 1;
                debug!(
                    package = %package.name,
                    bundle = current,
                    load_order = next_load_order,
                    "new bundle"
                );
                next_load_order += 1;
                last = Some(slot);
            }

            let node = graph.node(id);
            arena[slot].bundles[current as usize].entries.push(BundleEntry {
                export: node.export,
                phase: node.phase,
            });
            assignment[id.index()] = Some(current);
            emitted += 1;

            for succ in graph.successors(id) {
                let degree = &mut in_degree[succ.index()];
                *degree -= 1;
                if *degree == 0 {
                    let succ_pos = position[graph.node(succ).package.index()];
                    ready[succ_pos].push(Reverse(succ));
                    if succ_pos != pos {
                        ready_packages.insert(succ_pos);
                    }
                }
            }
        }
    }

    if emitted < graph.len() {
        let packages: BTreeSet<String> = graph
            .nodes()
            .iter()
            .zip(&assignment)
            .filter(|(_, bundle)| bundle.is_none())
            .map(|(node, _)| arena[node.package].name.clone())
            .collect();
        return Err(GraphError::CyclicExportGraph {
            remaining: graph.len() - emitted,
            packages: packages.into_iter().collect(),
        });
    }

    let mut report = BundleReport {
        package_order: order,
        bundles: next_load_order,
        ..Default::default()
    };

    for (index, node) in graph.nodes().iter().enumerate() {
        let Some(from_bundle) = assignment[index] else {
            continue;
        };
        let source = arena[node.package].id;

        for succ in &node.external {
            let Some(to_bundle) = assignment[succ.index()] else {
                continue;
            };
            let target = graph.node(*succ).package;
            if arena[target].add_external_arc(source, LoadArc::bundles(from_bundle, to_bundle)) {
                report.external_arcs += 1;
            }
        }
        for succ in &node.internal {
            let Some(to_bundle) = assignment[succ.index()] else {
                continue;
            };
            if from_bundle != to_bundle
                && arena[node.package].add_internal_arc(LoadArc::bundles(from_bundle, to_bundle))
            {
                report.internal_arcs += 1;
            }
        }
        for &import in &node.script_dependencies {
            let arc = ScriptArc {
                import,
                bundle: from_bundle,
            };
            if arena[node.package].add_script_arc(arc) {
                report.script_arcs += 1;
            }
        }
    }

    info!(
        packages = report.package_order.len(),
        bundles = report.bundles,
        internal_arcs = report.internal_arcs,
        external_arcs = report.external_arcs,
        script_arcs = report.script_arcs,
        "built export bundles"
    );
    Ok(report)
}
