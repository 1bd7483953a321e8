use std::path::PathBuf;

use iopack_container::SinkReport;
use serde::Serialize;
use uuid::Uuid;

/// A package skipped by the build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PackageFailure {
    pub package: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub name: String,
    pub packages: usize,
    pub chunks: usize,
    pub bytes_written: u64,
    pub reused_chunks: usize,
    pub layout_conflicts: usize,
    pub path: Option<PathBuf>,
    /// Packages of the previous release missing from this one.
    pub removed_packages: usize,
}

impl ContainerStats {
    pub fn from_sink(report: SinkReport, removed_packages: usize) -> Self {
        Self {
            name: report.container,
            packages: report.packages,
            chunks: report.chunks,
            bytes_written: report.bytes_written,
            reused_chunks: report.reused_chunks,
            layout_conflicts: report.layout_conflicts,
            path: report.path,
            removed_packages,
        }
    }
}

/// Summary of one optimizer run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub packages: usize,
    pub exports: usize,
    pub bundles: u32,
    pub internal_arcs: usize,
    pub external_arcs: usize,
    pub script_arcs: usize,
    pub circular_packages: usize,
    pub circular_chains: usize,
    /// Package-level arcs added for imports outside any cycle.
    pub postload_arcs: usize,
    /// Package-level arcs added between packages of one cycle.
    pub exports_done_arcs: usize,
    pub missing_imports: usize,
    pub names: usize,
    pub global_imports: usize,
    pub containers: Vec<ContainerStats>,
    pub failed_packages: Vec<PackageFailure>,
    pub duration_ms: u64,
}

impl BuildReport {
    /// No package was skipped.
    pub fn succeeded(&self) -> bool {
        self.failed_packages.is_empty()
    }

    pub fn bytes_written(&self) -> u64 {
        self.containers.iter().map(|c| c.bytes_written).sum()
    }

    pub fn reused_chunks(&self) -> usize {
        self.containers.iter().map(|c| c.reused_chunks).sum()
    }

    pub fn chunks(&self) -> usize {
        self.containers.iter().map(|c| c.chunks).sum()
    }

    pub fn record_failure(&mut self, package: &str, reason: impl ToString) {
        self.failed_packages.push(PackageFailure {
            package: package.to_string(),
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_and_failures() {
        let mut report = BuildReport::default();
        assert!(report.succeeded());
        for (name, bytes, reused) in [("base", 100, 1), ("maps", 50, 2)] {
            report.containers.push(ContainerStats {
                name: name.into(),
                chunks: 3,
                bytes_written: bytes,
                reused_chunks: reused,
                ..Default::default()
            });
        }
        assert_eq!(report.bytes_written(), 150);
        assert_eq!(report.reused_chunks(), 3);
        assert_eq!(report.chunks(), 6);

        report.record_failure("/Game/Broken", "corrupt package header: bad magic");
        assert!(!report.succeeded());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed_packages"][0]["package"], "/Game/Broken");
        assert_eq!(json["containers"][1]["name"], "maps");
    }

    #[test]
    fn container_stats_from_sink_report() {
        let stats = ContainerStats::from_sink(
            SinkReport {
                container: "base".into(),
                packages: 2,
                chunks: 4,
                bytes_written: 4096,
                reused_chunks: 1,
                layout_conflicts: 0,
                path: Some(PathBuf::from("Paks/base.iopak")),
            },
            3,
        );
        assert_eq!(stats.name, "base");
        assert_eq!(stats.removed_packages, 3);
        assert_eq!(stats.path.as_deref(), Some(std::path::Path::new("Paks/base.iopak")));
    }
}
