use serde::{Deserialize, Serialize};

use crate::ids::ImportIndex;
use crate::phase::ExportPhase;

/// One create or serialize step of an export inside a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleEntry {
    pub export: u32,
    pub phase: ExportPhase,
}

/// Ordered run of export steps of one package, requested by a streaming
/// runtime at position `load_order` of the global load sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub load_order: u32,
    pub entries: Vec<BundleEntry>,
}

impl ExportBundle {
    pub fn new(load_order: u32) -> Self {
        Self {
            load_order,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exports serialized by this bundle, in order.
    pub fn serialized_exports(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|e| e.phase == ExportPhase::Serialize)
            .map(|e| e.export)
    }
}

/// Bundle of a package that must wait for a script object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptArc {
    pub import: ImportIndex,
    pub bundle: u32,
}
