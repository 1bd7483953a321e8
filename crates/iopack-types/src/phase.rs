use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a single export: constructed, then populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExportPhase {
    Create = 0,
    Serialize = 1,
}

impl ExportPhase {
    pub fn offset(&self) -> u32 {
        *self as u32
    }

    pub fn type_byte(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("Create"),
            Self::Serialize => f.write_str("Serialize"),
        }
    }
}

/// Package-level phases a streaming runtime schedules around bundles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PackagePhase {
    ExportsSerialized = 0,
    StartPostLoad = 1,
    Tick = 2,
    Delete = 3,
}

impl PackagePhase {
    pub const COUNT: u32 = 4;

    fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::ExportsSerialized),
            1 => Some(Self::StartPostLoad),
            2 => Some(Self::Tick),
            3 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A node of the runtime load graph of one package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoadNode {
    Package(PackagePhase),
    /// Processing of the export bundle with this package-local index.
    Bundle(u32),
}

impl LoadNode {
    /// Flat node index: package phases first, then one node per bundle.
    pub fn node_index(&self) -> u32 {
        match *self {
            Self::Package(phase) => phase as u32,
            Self::Bundle(bundle) => PackagePhase::COUNT + bundle,
        }
    }

    pub fn from_node_index(index: u32) -> Self {
        match PackagePhase::from_index(index) {
            Some(phase) => Self::Package(phase),
            None => Self::Bundle(index - PackagePhase::COUNT),
        }
    }
}

/// "`from` must complete before `to` starts."
///
/// Stored on the target package; for external arcs `from` refers to a node of
/// the source package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoadArc {
    pub from: LoadNode,
    pub to: LoadNode,
}

impl LoadArc {
    pub fn new(from: LoadNode, to: LoadNode) -> Self {
        Self { from, to }
    }

    /// `StartPostLoad -> StartPostLoad`: the target's postload waits for the source's.
    pub fn postload() -> Self {
        Self::new(
            LoadNode::Package(PackagePhase::StartPostLoad),
            LoadNode::Package(PackagePhase::StartPostLoad),
        )
    }

    /// `ExportsSerialized -> StartPostLoad`: the target's postload only waits
    /// for the source's exports to exist.
    pub fn exports_done() -> Self {
        Self::new(
            LoadNode::Package(PackagePhase::ExportsSerialized),
            LoadNode::Package(PackagePhase::StartPostLoad),
        )
    }

    pub fn bundles(from: u32, to: u32) -> Self {
        Self::new(LoadNode::Bundle(from), LoadNode::Bundle(to))
    }
}
