use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An import names an export that no package of the build defines.
    /// The dependency is dropped; the build continues.
    #[error("package {package}: missing import {import}")]
    MissingImport { package: String, import: String },

    /// Some export nodes could never become ready. The dependency data of the
    /// listed packages is corrupt.
    #[error("cyclic export graph: {remaining} nodes left unordered in {}", packages.join(", "))]
    CyclicExportGraph {
        remaining: usize,
        packages: Vec<String>,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;
