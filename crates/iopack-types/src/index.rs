use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference from a package table entry to an object.
///
/// Package tables (export outers, classes, preload dependencies) point either
/// at an export of the same package, at an entry of the package's import
/// table, or at nothing. Source headers encode this as a signed integer; the
/// signed form only exists at the wire boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PackageIndex {
    #[default]
    Null,
    /// Index into the package's export table.
    Export(u32),
    /// Index into the package's import table.
    Import(u32),
}

impl PackageIndex {
    /// Decode the signed source-header encoding: `0` is null, `n > 0` is
    /// export `n - 1`, `n < 0` is import `-n - 1`.
    pub fn from_signed(raw: i32) -> Self {
        match raw {
            0 => Self::Null,
            n if n > 0 => Self::Export((n - 1) as u32),
            n => Self::Import((-(n as i64) - 1) as u32),
        }
    }

    /// Encode to the signed source-header form.
    pub fn to_signed(&self) -> i32 {
        match *self {
            Self::Null => 0,
            Self::Export(i) => i as i32 + 1,
            Self::Import(i) => -(i as i32) - 1,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_export(&self) -> Option<u32> {
        match *self {
            Self::Export(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_import(&self) -> Option<u32> {
        match *self {
            Self::Import(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for PackageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Export(i) => write!(f, "export[{i}]"),
            Self::Import(i) => write!(f, "import[{i}]"),
        }
    }
}
