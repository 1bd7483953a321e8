//! Export-level dependency graph.
//!
//! Every export contributes two nodes, `Create` and `Serialize`, joined by a
//! create-before-serialize edge. Node ids are dense: the nodes of the package
//! in slot `p` start at `base(p)` and export `e` in phase `ph` lives at
//! `base(p) + 2 * e + ph`.

use std::collections::HashSet;
use std::fmt;

use iopack_package::{Interner, PackageArena, PackageSlot};
use iopack_types::{ExportPhase, ImportIndex, PackageIndex};
use tracing::{debug, info, warn};

use crate::error::GraphError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct GraphNode {
    pub package: PackageSlot,
    pub export: u32,
    pub phase: ExportPhase,
    /// Successors in the same package.
    pub internal: Vec<NodeId>,
    /// Successors in other packages.
    pub external: Vec<NodeId>,
    /// Script objects that must exist before this node runs.
    pub script_dependencies: Vec<ImportIndex>,
}

#[derive(Clone, Debug, Default)]
pub struct ExportGraph {
    bases: Vec<u32>,
    nodes: Vec<GraphNode>,
    edges: HashSet<(NodeId, NodeId)>,
    external_edges: usize,
    missing: Vec<GraphError>,
}

impl ExportGraph {
    /// Build the graph for every package in the arena.
    ///
    /// Unresolvable imports are logged, collected in
    /// [`missing_imports`](Self::missing_imports) and otherwise ignored.
    pub fn build(interner: &Interner, arena: &PackageArena) -> Self {
        let mut graph = Self::default();
        for package in arena.iter() {
            graph.bases.push(graph.nodes.len() as u32);
            for export in 0..package.exports.len() as u32 {
                for phase in [ExportPhase::Create, ExportPhase::Serialize] {
                    graph.nodes.push(GraphNode {
                        package: package.slot,
                        export,
                        phase,
                        internal: Vec::new(),
                        external: Vec::new(),
                        script_dependencies: Vec::new(),
                    });
                }
            }
        }

        for package in arena.iter() {
            let slot = package.slot;
            for export in 0..package.exports.len() as u32 {
                let create = graph.node_id(slot, export, ExportPhase::Create);
                let serialize = graph.node_id(slot, export, ExportPhase::Serialize);
                graph.add_edge(create, serialize);
            }

            for dep in &package.preload_dependencies {
                let target = graph.node_id(slot, dep.export, dep.to);
                match dep.dependency {
                    PackageIndex::Null => {}
                    PackageIndex::Export(local) => {
                        let source = graph.node_id(slot, local, dep.from);
                        graph.add_edge(source, target);
                    }
                    PackageIndex::Import(local) => {
                        let import = &package.imports[local as usize];
                        if import.is_package {
                            continue;
                        }
                        if import.is_script {
                            let scripts = &mut graph.nodes[target.index()].script_dependencies;
                            if !scripts.contains(&import.global) {
                                scripts.push(import.global);
                            }
                            continue;
                        }

                        let full_name = interner
                            .import(import.global)
                            .map(|entry| entry.full_name.as_str())
                            .unwrap_or_default();
                        let resolved = interner
                            .find_export(full_name)
                            .and_then(|entry| Some((arena.slot_of(entry.package)?, entry.export)))
                            .filter(|&(slot, export)| (export as usize) < arena[slot].exports.len());
                        match resolved {
                            Some((source_slot, source_export)) => {
                                let source = graph.node_id(source_slot, source_export, dep.from);
                                graph.add_edge(source, target);
                            }
                            None => {
                                warn!(
                                    package = %package.name,
                                    import = full_name,
                                    "missing import, dependency dropped"
                                );
                                graph.missing.push(GraphError::MissingImport {
                                    package: package.name.clone(),
                                    import: full_name.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            external = graph.external_edges,
            missing = graph.missing.len(),
            "built export graph"
        );
        graph
    }

    pub fn node_id(&self, package: PackageSlot, export: u32, phase: ExportPhase) -> NodeId {
        NodeId(self.bases[package.index()] + 2 * export + phase.offset())
    }

    /// Add `from -> to` unless it already exists. Returns whether it was new.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        if !self.edges.insert((from, to)) {
            return false;
        }
        let external = self.nodes[from.index()].package != self.nodes[to.index()].package;
        let node = &mut self.nodes[from.index()];
        if external {
            node.external.push(to);
            self.external_edges += 1;
        } else {
            node.internal.push(to);
        }
        debug!(%from, %to, external, "export edge");
        true
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn external_edge_count(&self) -> usize {
        self.external_edges
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains(&(from, to))
    }

    /// All successors of `id`, internal first.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let node = &self.nodes[id.index()];
        node.internal.iter().chain(node.external.iter()).copied()
    }

    pub fn missing_imports(&self) -> &[GraphError] {
        &self.missing
    }
}

/// Record on each export the global import index under which other packages
/// refer to it. Returns the number of exports linked.
pub fn link_imported_exports(interner: &Interner, arena: &mut PackageArena) -> usize {
    let mut linked = 0;
    for (index, entry) in interner.imports().iter().enumerate() {
        if entry.is_script || entry.is_package {
            continue;
        }
        let Some(found) = interner.find_export(&entry.full_name) else {
            continue;
        };
        let Some(slot) = arena.slot_of(found.package) else {
            continue;
        };
        if let Some(export) = arena[slot].exports.get_mut(found.export as usize) {
            export.global_import = Some(ImportIndex(index as u32));
            linked += 1;
        }
    }
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use iopack_package::{HeaderBuilder, PackageLoader};

    #[test]
    fn two_nodes_per_export_with_create_before_serialize() {
        let mut fx = Fixture::new();
        let a = fx.add("/Game/A", |b| {
            b.export("First", 4, true);
            b.export("Second", 4, true);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        assert_eq!(graph.len(), 4);
        for export in 0..2 {
            let create = graph.node_id(a, export, ExportPhase::Create);
            let serialize = graph.node_id(a, export, ExportPhase::Serialize);
            assert_eq!(serialize.0, create.0 + 1);
            assert!(graph.has_edge(create, serialize));
        }
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn node_ids_are_offset_by_package_base() {
        let mut fx = Fixture::new();
        fx.add("/Game/A", |b| {
            b.export("One", 1, true);
            b.export("Two", 1, true);
        });
        let b_slot = fx.add("/Game/B", |b| {
            b.export("One", 1, true);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        assert_eq!(graph.node_id(b_slot, 0, ExportPhase::Create), NodeId(4));
        assert_eq!(graph.node(NodeId(5)).phase, ExportPhase::Serialize);
        assert_eq!(graph.node(NodeId(5)).package, b_slot);
    }

    #[test]
    fn internal_dependency() {
        let mut fx = Fixture::new();
        let a = fx.add("/Game/A", |b| {
            let base = b.export("Base", 4, true);
            let derived = b.export("Derived", 4, true);
            b.depend(derived, PackageIndex::Export(base), ExportPhase::Serialize, ExportPhase::Create);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        let from = graph.node_id(a, 0, ExportPhase::Serialize);
        let to = graph.node_id(a, 1, ExportPhase::Create);
        assert!(graph.has_edge(from, to));
        assert_eq!(graph.external_edge_count(), 0);
    }

    #[test]
    fn external_dependency_resolves_through_export_table() {
        let mut fx = Fixture::new();
        let a = fx.add("/Game/A", |b| {
            let sword = b.import_object("/Game/B.Sword");
            let hero = b.export("Hero", 4, true);
            b.depend(hero, sword, ExportPhase::Serialize, ExportPhase::Serialize);
        });
        let b_slot = fx.add("/Game/B", |b| {
            b.export("Shield", 4, true);
            b.export("Sword", 4, true);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        let from = graph.node_id(b_slot, 1, ExportPhase::Serialize);
        let to = graph.node_id(a, 0, ExportPhase::Serialize);
        assert!(graph.has_edge(from, to));
        assert_eq!(graph.external_edge_count(), 1);
        assert_eq!(graph.node(from).external, vec![to]);
        assert!(graph.missing_imports().is_empty());
    }

    #[test]
    fn import_of_own_export_is_internal() {
        let mut fx = Fixture::new();
        let a = fx.add("/Game/A", |b| {
            let me = b.import_object("/Game/A.Other");
            let hero = b.export("Hero", 4, true);
            b.export("Other", 4, true);
            b.depend(hero, me, ExportPhase::Create, ExportPhase::Create);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        let from = graph.node_id(a, 1, ExportPhase::Create);
        let to = graph.node_id(a, 0, ExportPhase::Create);
        assert!(graph.node(from).internal.contains(&to));
        assert_eq!(graph.external_edge_count(), 0);
    }

    #[test]
    fn script_and_package_imports() {
        let mut fx = Fixture::new();
        let a = fx.add("/Game/A", |b| {
            let actor = b.import_object("/Script/Engine.Actor");
            let pkg = b.import_package("/Game/B");
            let hero = b.export("Hero", 4, true);
            b.depend(hero, actor, ExportPhase::Serialize, ExportPhase::Create);
            b.depend(hero, actor, ExportPhase::Serialize, ExportPhase::Create);
            b.depend(hero, pkg, ExportPhase::Serialize, ExportPhase::Serialize);
        });
        fx.add("/Game/B", |b| {
            b.export("B", 4, true);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        let create = graph.node(graph.node_id(a, 0, ExportPhase::Create));
        let actor = fx.interner.find_import("/Script/Engine.Actor").unwrap();
        assert_eq!(create.script_dependencies, vec![actor]);
        assert_eq!(graph.external_edge_count(), 0);
        assert!(graph.missing_imports().is_empty());
    }

    #[test]
    fn missing_import_is_reported_and_dropped() {
        let mut fx = Fixture::new();
        fx.add("/Game/A", |b| {
            let ghost = b.import_object("/Game/Gone.Ghost");
            let hero = b.export("Hero", 4, true);
            b.depend(hero, ghost, ExportPhase::Serialize, ExportPhase::Serialize);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        assert_eq!(
            graph.missing_imports(),
            &[GraphError::MissingImport {
                package: "/Game/A".into(),
                import: "/game/gone.ghost".into(),
            }]
        );
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn export_index_past_the_owning_package_is_missing() {
        let mut fx = Fixture::new();
        fx.add("/Game/A", |b| {
            b.export("E0", 4, true);
        });
        let mut wider = HeaderBuilder::new();
        for e in 0..3 {
            wider.export(&format!("E{e}"), 4, true);
        }
        let wider = wider.build();
        assert!(fx.try_add("/game/a", &wider).is_err());

        // Register the rejected package's exports anyway, as a caller using
        // the bare loader would.
        let stale = PackageLoader::load(&mut fx.interner, "/game/a", &wider, 12).unwrap();
        assert!(fx.arena.insert(stale).is_err());

        fx.add("/Game/C", |b| {
            let e2 = b.import_object("/Game/A.E2");
            let user = b.export("User", 4, true);
            b.depend(user, e2, ExportPhase::Serialize, ExportPhase::Serialize);
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        assert_eq!(graph.len(), 4);
        assert_eq!(
            graph.missing_imports(),
            &[GraphError::MissingImport {
                package: "/Game/C".into(),
                import: "/game/a.e2".into(),
            }]
        );
    }

    #[test]
    fn duplicate_dependencies_collapse() {
        let mut fx = Fixture::new();
        fx.add("/Game/A", |b| {
            let first = b.export("First", 4, true);
            let second = b.export("Second", 4, true);
            for _ in 0..3 {
                b.depend(second, PackageIndex::Export(first), ExportPhase::Create, ExportPhase::Create);
            }
        });
        let graph = ExportGraph::build(&fx.interner, &fx.arena);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn link_sets_global_import_on_imported_exports() {
        let mut fx = Fixture::new();
        fx.add("/Game/A", |b| {
            b.import_object("/Game/B.Sword");
            b.export("Hero", 4, true);
        });
        let b_slot = fx.add("/Game/B", |b| {
            b.export("Sword", 4, true);
            b.export("Unused", 4, true);
        });
        let linked = link_imported_exports(&fx.interner, &mut fx.arena);
        assert_eq!(linked, 1);
        let sword = fx.interner.find_import("/Game/B.Sword");
        assert_eq!(fx.arena[b_slot].exports[0].global_import, sword);
        assert_eq!(fx.arena[b_slot].exports[1].global_import, None);
    }
}
