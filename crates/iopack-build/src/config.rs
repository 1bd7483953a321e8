use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use iopack_container::{CompressionMethod, RemoteSinkConfig};
use iopack_layout::LayoutConfig;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// Settings of one optimizer run.
///
/// Loaded from a TOML file; every field is optional there and command-line
/// flags override what the file sets.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Root of the source package tree.
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Prefix of every discovered package name.
    pub mount_point: String,
    /// Container for packages no response-file rule matches.
    pub default_container: String,
    /// `container<TAB>package-prefix` rules.
    pub containers_file: Option<PathBuf>,
    pub order_file: Option<PathBuf>,
    pub open_order_file: Option<PathBuf>,
    /// Directory holding the `.release` snapshots of the previous build.
    pub previous_build_dir: Option<PathBuf>,
    pub write_release_snapshot: bool,
    pub compression: CompressionMethod,
    /// Worker threads for decoding and serialization, `0` for one per core.
    pub jobs: usize,
    pub layout: LayoutConfig,
    pub sink: SinkConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("Content"),
            output_dir: PathBuf::from("Paks"),
            mount_point: "/Game".to_string(),
            default_container: "base".to_string(),
            containers_file: None,
            order_file: None,
            open_order_file: None,
            previous_build_dir: None,
            write_release_snapshot: false,
            compression: CompressionMethod::Zstd,
            jobs: 0,
            layout: LayoutConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

/// Optional mirror of every chunk into a remote store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Directory-backed store receiving a copy of each chunk.
    pub remote_store: Option<PathBuf>,
    pub max_attempts: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            remote_store: None,
            max_attempts: RemoteSinkConfig::default().max_attempts,
        }
    }
}

impl SinkConfig {
    pub fn remote(&self) -> RemoteSinkConfig {
        RemoteSinkConfig {
            max_attempts: self.max_attempts,
        }
    }
}

impl BuildConfig {
    pub fn load(path: &Path) -> BuildResult<Self> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn from_toml(text: &str) -> BuildResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> BuildResult<()> {
        self.layout.validate()?;
        if self.default_container.is_empty() {
            return Err(BuildError::InvalidConfig(
                "default_container must not be empty".into(),
            ));
        }
        if self.default_container == iopack_container::GLOBAL_CONTAINER {
            return Err(BuildError::InvalidConfig(format!(
                "\"{}\" is reserved for the global container",
                iopack_container::GLOBAL_CONTAINER
            )));
        }
        if self.sink.max_attempts == 0 {
            return Err(BuildError::InvalidConfig(
                "sink.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        thread::available_parallelism().map_or(4, |n| n.get())
    }
}
