use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable identifier of a package.
///
/// A `PackageId` is derived from the lower-cased package name, so the same
/// package always receives the same id across builds and machines. The id is
/// the first eight bytes (little endian) of a domain-separated BLAKE3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId(u64);

impl PackageId {
    const DOMAIN: &'static [u8] = b"iopack-package-v1:";

    /// Derive the id of the package called `name`.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(Self::DOMAIN);
        hasher.update(name.to_lowercase().as_bytes());
        let hash = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        Self(u64::from_le_bytes(prefix))
    }

    /// Wrap a raw id value.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The id used by container-wide chunks that belong to no package.
    pub const fn none() -> Self {
        Self(0)
    }

    /// Returns `true` for the container-wide id.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// The raw 64-bit value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Hex-encoded value (16 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parse from a 16 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| TypeError::InvalidLength {
            expected: 8,
            actual: bytes.len(),
        })?;
        Ok(Self(u64::from_be_bytes(arr)))
    }
}

impl fmt::Debug for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageId({})", self.to_hex())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Index into the global name table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameIndex(pub u32);

impl NameIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Index into the global import table.
///
/// Indices are handed out in interning order and are never reused or removed
/// during a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportIndex(pub u32);

impl ImportIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ImportIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_id_is_deterministic() {
        let a = PackageId::from_name("/Game/Maps/Arena");
        let b = PackageId::from_name("/Game/Maps/Arena");
        assert_eq!(a, b);
    }

    #[test]
    fn package_id_ignores_case() {
        let a = PackageId::from_name("/Game/Maps/Arena");
        let b = PackageId::from_name("/game/maps/arena");
        assert_eq!(a, b);
    }

    #[test]
    fn different_names_produce_different_ids() {
        let a = PackageId::from_name("/Game/A");
        let b = PackageId::from_name("/Game/B");
        assert_ne!(a, b);
    }

    #[test]
    fn none_is_zero() {
        assert!(PackageId::none().is_none());
        assert_eq!(PackageId::none().value(), 0);
        assert!(!PackageId::from_name("/Game/A").is_none());
    }

    #[test]
    fn hex_roundtrip() {
        let id = PackageId::from_name("/Game/Hero");
        let hex = id.to_hex();
        assert_eq!(hex.len(), 16);
        assert_eq!(PackageId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = PackageId::from_hex("abcd").unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 8, actual: 2 });
    }

    #[test]
    fn serde_roundtrip() {
        let id = PackageId::from_name("/Game/Serde");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: PackageId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
