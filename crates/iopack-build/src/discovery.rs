//! Finding source packages and assigning them to containers.

use std::fs;
use std::path::{Path, PathBuf};

use iopack_types::ChunkType;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{BuildError, BuildResult};

pub const HEADER_EXTENSION: &str = "pkgh";
pub const EXPORT_EXTENSION: &str = "pkgx";

/// Bulk file extensions and the chunk type each becomes.
pub const BULK_EXTENSIONS: [(&str, ChunkType); 3] = [
    ("pkgb", ChunkType::BulkData),
    ("pkgo", ChunkType::OptionalBulkData),
    ("pkgm", ChunkType::MemoryMappedBulkData),
];

/// Files of one package on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcePackage {
    pub name: String,
    pub header_path: PathBuf,
    pub export_path: PathBuf,
    pub bulk: Vec<(ChunkType, PathBuf)>,
}

/// Every `.pkgh` below `input_dir`, sorted by package name.
pub fn discover_packages(input_dir: &Path, mount_point: &str) -> BuildResult<Vec<SourcePackage>> {
    if !input_dir.is_dir() {
        return Err(BuildError::MissingInput(input_dir.to_path_buf()));
    }
    let mount_point = mount_point.trim_end_matches('/');
    let mut packages = Vec::new();
    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(HEADER_EXTENSION)
        {
            continue;
        }
        let Ok(relative) = path.with_extension("").strip_prefix(input_dir).map(Path::to_path_buf)
        else {
            continue;
        };
        let relative: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let name = format!("{mount_point}/{}", relative.join("/"));

        let bulk = BULK_EXTENSIONS
            .iter()
            .map(|&(ext, chunk_type)| (chunk_type, path.with_extension(ext)))
            .filter(|(_, p)| p.is_file())
            .collect();
        debug!(package = %name, path = %path.display(), "discovered package");
        packages.push(SourcePackage {
            name,
            header_path: path.to_path_buf(),
            export_path: path.with_extension(EXPORT_EXTENSION),
            bulk,
        });
    }
    packages.sort_by(|a, b| a.name.cmp(&b.name));
    info!(input = %input_dir.display(), packages = packages.len(), "package discovery complete");
    Ok(packages)
}

/// Maps package names to containers.
///
/// Rules are `container<TAB>prefix` lines; blank lines and `#` comments are
/// skipped. The longest matching prefix wins, compared case-insensitively.
#[derive(Clone, Debug)]
pub struct ContainerRules {
    default: String,
    rules: Vec<(String, String)>,
}

impl ContainerRules {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            rules: Vec::new(),
        }
    }

    pub fn load(path: &Path, default: impl Into<String>) -> BuildResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, path, default)
    }

    pub fn parse(text: &str, path: &Path, default: impl Into<String>) -> BuildResult<Self> {
        let mut rules = Self::new(default);
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let error = |reason: &str| BuildError::ResponseFile {
                path: path.to_path_buf(),
                line: number + 1,
                reason: reason.to_string(),
            };
            let (container, prefix) = line
                .split_once('\t')
                .ok_or_else(|| error("expected container<TAB>prefix"))?;
            let (container, prefix) = (container.trim(), prefix.trim());
            if container.is_empty() || prefix.is_empty() {
                return Err(error("empty container or prefix"));
            }
            if container == iopack_container::GLOBAL_CONTAINER {
                return Err(error("the global container cannot hold packages"));
            }
            rules.add(container, prefix);
        }
        debug!(path = %path.display(), rules = rules.rules.len(), "loaded container rules");
        Ok(rules)
    }

    pub fn add(&mut self, container: &str, prefix: &str) {
        self.rules.push((container.to_string(), prefix.to_lowercase()));
    }

    pub fn container_for(&self, package: &str) -> &str {
        let package = package.to_lowercase();
        self.rules
            .iter()
            .filter(|(_, prefix)| package.starts_with(prefix.as_str()))
            .max_by_key(|(_, prefix)| prefix.len())
            .map_or(self.default.as_str(), |(container, _)| container.as_str())
    }

    pub fn default_container(&self) -> &str {
        &self.default
    }
}
