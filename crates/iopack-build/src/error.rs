use std::path::PathBuf;

use iopack_container::ContainerError;
use iopack_graph::GraphError;
use iopack_layout::LayoutError;
use iopack_package::PackageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("{path}:{line}: {reason}")]
    ResponseFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("input directory {0} does not exist")]
    MissingInput(PathBuf),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BuildResult<T> = Result<T, BuildError>;
