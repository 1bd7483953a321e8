use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ContainerError, ContainerResult};

const ZSTD_LEVEL: i32 = 3;

/// Per-chunk compression applied before chunks are written.
///
/// A chunk that does not shrink is stored raw; the TOC flags record which
/// chunks were compressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    None,
    #[default]
    Zstd,
}

impl CompressionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zstd => "zstd",
        }
    }

    /// Compress `raw`. Returns `None` when the chunk should be stored as is.
    pub fn compress(&self, raw: &[u8]) -> ContainerResult<Option<Vec<u8>>> {
        match self {
            Self::None => Ok(None),
            Self::Zstd => {
                let compressed = zstd::encode_all(raw, ZSTD_LEVEL)
                    .map_err(|e| ContainerError::CompressionFailed(e.to_string()))?;
                Ok((compressed.len() < raw.len()).then_some(compressed))
            }
        }
    }

    pub fn decompress(&self, stored: &[u8], raw_size: u64) -> ContainerResult<Vec<u8>> {
        let raw = match self {
            Self::None => {
                return Err(ContainerError::DecompressionFailed(
                    "chunk is flagged compressed but the container uses no compression".into(),
                ))
            }
            Self::Zstd => zstd::decode_all(stored)
                .map_err(|e| ContainerError::DecompressionFailed(e.to_string()))?,
        };
        if raw.len() as u64 != raw_size {
            return Err(ContainerError::DecompressionFailed(format!(
                "expected {raw_size} bytes, got {}",
                raw.len()
            )));
        }
        Ok(raw)
    }
}

impl FromStr for CompressionMethod {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "zstd" => Ok(Self::Zstd),
            other => Err(ContainerError::UnknownCompression(other.to_string())),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_shrinks_repetitive_data() {
        let raw = vec![7u8; 4096];
        let stored = CompressionMethod::Zstd.compress(&raw).unwrap().unwrap();
        assert!(stored.len() < raw.len());
        let back = CompressionMethod::Zstd.decompress(&stored, 4096).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn incompressible_chunks_stay_raw() {
        assert_eq!(CompressionMethod::Zstd.compress(b"ab").unwrap(), None);
        assert_eq!(CompressionMethod::None.compress(&[0u8; 1024]).unwrap(), None);
    }

    #[test]
    fn wrong_raw_size_is_an_error() {
        let stored = CompressionMethod::Zstd.compress(&[1u8; 512]).unwrap().unwrap();
        assert!(matches!(
            CompressionMethod::Zstd.decompress(&stored, 100),
            Err(ContainerError::DecompressionFailed(_))
        ));
    }

    #[test]
    fn parses_names() {
        assert_eq!("zstd".parse::<CompressionMethod>().unwrap(), CompressionMethod::Zstd);
        assert_eq!("NONE".parse::<CompressionMethod>().unwrap(), CompressionMethod::None);
        assert!("lz4".parse::<CompressionMethod>().is_err());
        assert_eq!(CompressionMethod::Zstd.to_string(), "zstd");
    }
}
