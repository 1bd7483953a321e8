use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

/// Alignment rules and incremental-layout policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Chunks no larger than this never straddle a block boundary; larger
    /// chunks start on one.
    pub compression_block_size: u64,
    /// Start alignment of memory-mappable bulk data.
    pub memory_mapping_alignment: u64,
    /// Keep chunks of the previous release at their old offsets when their
    /// content is unchanged.
    pub reuse_previous_offsets: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            compression_block_size: 64 * 1024,
            memory_mapping_alignment: 16 * 1024,
            reuse_previous_offsets: true,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> LayoutResult<()> {
        for (name, value) in [
            ("compression_block_size", self.compression_block_size),
            ("memory_mapping_alignment", self.memory_mapping_alignment),
        ] {
            if !value.is_power_of_two() {
                return Err(LayoutError::InvalidConfig(format!(
                    "{name} must be a power of two, got {value}"
                )));
            }
        }
        Ok(())
    }
}
