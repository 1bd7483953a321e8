use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use iopack_build::{optimize, BuildConfig, BuildReport};
use iopack_container::{
    CompressionMethod, ContainerHeader, ContainerManifest, ContainerReader, StorePackageHeader,
    CONTAINER_EXTENSION,
};
use iopack_types::ChunkType;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Build(args) => cmd_build(args, cli.format),
        Command::List(args) => cmd_list(args, cli.format),
        Command::Verify(args) => cmd_verify(args, cli.format),
    }
}

fn build_config(args: BuildArgs) -> anyhow::Result<BuildConfig> {
    let mut config = match &args.config {
        Some(path) => BuildConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => BuildConfig::default(),
    };
    if let Some(input) = args.input {
        config.input_dir = input;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(mount_point) = args.mount_point {
        config.mount_point = mount_point;
    }
    if let Some(containers) = args.containers {
        config.containers_file = Some(containers);
    }
    if let Some(order) = args.order_file {
        config.order_file = Some(order);
    }
    if let Some(order) = args.open_order_file {
        config.open_order_file = Some(order);
    }
    if let Some(previous) = args.previous_build {
        config.previous_build_dir = Some(previous);
    }
    if args.release_snapshot {
        config.write_release_snapshot = true;
    }
    if let Some(compression) = args.compression {
        config.compression = match compression {
            CompressionArg::None => CompressionMethod::None,
            CompressionArg::Zstd => CompressionMethod::Zstd,
        };
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if let Some(remote) = args.remote_store {
        config.sink.remote_store = Some(remote);
    }
    Ok(config)
}

fn cmd_build(args: BuildArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = build_config(args)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(optimize(config))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_build_report(&report),
    }
    if !report.succeeded() {
        bail!("{} package(s) failed to build", report.failed_packages.len());
    }
    Ok(())
}

fn print_build_report(report: &BuildReport) {
    let mark = if report.succeeded() { "✓".green().bold() } else { "✗".red().bold() };
    println!(
        "{} Built {} packages into {} containers",
        mark,
        report.packages.to_string().bold(),
        report.containers.len()
    );
    println!("  Build: {}", report.build_id.to_string().cyan());
    println!(
        "  Exports: {}  Bundles: {}  Names: {}  Imports: {}",
        report.exports, report.bundles, report.names, report.global_imports
    );
    println!(
        "  Arcs: {} internal, {} external, {} script",
        report.internal_arcs, report.external_arcs, report.script_arcs
    );
    if report.circular_packages > 0 {
        println!(
            "  Circular imports: {} packages in {} chains",
            report.circular_packages.to_string().yellow(),
            report.circular_chains
        );
    }
    println!(
        "  Postload arcs: {}  Exports-done arcs: {}",
        report.postload_arcs, report.exports_done_arcs
    );
    if report.missing_imports > 0 {
        println!("  {} {} missing imports", "!".yellow().bold(), report.missing_imports);
    }
    for container in &report.containers {
        let path = container
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "  {:<12} {:>5} packages {:>6} chunks {:>10}  reused {:<5} {}",
            container.name.bold(),
            container.packages,
            container.chunks,
            format_size(container.bytes_written),
            container.reused_chunks,
            path.dimmed()
        );
    }
    for failure in &report.failed_packages {
        println!("  {} {}: {}", "✗".red(), failure.package.yellow(), failure.reason);
    }
    println!("  Done in {} ms", report.duration_ms);
}

fn container_path(args: &ContainerArgs) -> PathBuf {
    let direct = PathBuf::from(&args.container);
    if direct.is_file() {
        return direct;
    }
    args.dir.join(format!("{}.{CONTAINER_EXTENSION}", args.container))
}

/// The manifest written next to a container, if there is one.
fn manifest_for(path: &Path) -> Option<ContainerManifest> {
    let name = path.file_stem()?.to_str()?;
    let dir = path.parent()?;
    ContainerManifest::load(&ContainerManifest::path_for(dir, name)).ok()
}

fn open(args: &ContainerArgs) -> anyhow::Result<ContainerReader> {
    let path = container_path(args);
    ContainerReader::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

fn cmd_list(args: ContainerArgs, format: OutputFormat) -> anyhow::Result<()> {
    let reader = open(&args)?;
    let manifest = manifest_for(reader.path());
    let package_of = |entry: &iopack_container::TocEntry| {
        manifest
            .as_ref()
            .and_then(|m| m.find(&entry.id))
            .and_then(|m| m.package.clone())
    };

    match format {
        OutputFormat::Json => {
            let chunks: Vec<_> = reader
                .entries()
                .iter()
                .map(|entry| {
                    json!({
                        "id": entry.id.to_hex(),
                        "chunk_type": entry.id.chunk_type().to_string(),
                        "package": package_of(entry),
                        "offset": entry.offset,
                        "stored_size": entry.stored_size,
                        "raw_size": entry.raw_size,
                        "compressed": entry.is_compressed(),
                        "hash": entry.hash.to_hex(),
                    })
                })
                .collect();
            let listing = json!({
                "container": reader.path().display().to_string(),
                "compression": reader.toc().compression.name(),
                "chunks": chunks,
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        OutputFormat::Text => {
            println!(
                "{} ({} chunks, {})",
                reader.path().display().to_string().bold(),
                reader.entries().len(),
                reader.toc().compression
            );
            for entry in reader.entries() {
                let stored = if entry.is_compressed() {
                    format!("{} → {}", format_size(entry.raw_size), format_size(entry.stored_size))
                } else {
                    format_size(entry.raw_size)
                };
                println!(
                    "  {}  {:<22} {:>10}  {:<24} {}",
                    entry.id.to_hex().yellow(),
                    entry.id.chunk_type().to_string(),
                    entry.offset,
                    stored,
                    package_of(entry).unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn cmd_verify(args: ContainerArgs, format: OutputFormat) -> anyhow::Result<()> {
    let reader = open(&args)?;
    let report = reader.verify()?;

    let mut packages = 0usize;
    for entry in reader.entries() {
        let decode = || -> anyhow::Result<()> {
            match entry.id.chunk_type() {
                ChunkType::ExportBundleData => {
                    StorePackageHeader::parse(&reader.read_chunk(&entry.id)?)?;
                }
                ChunkType::ContainerHeader => {
                    ContainerHeader::parse(&reader.read_chunk(&entry.id)?)?;
                }
                _ => {}
            }
            Ok(())
        };
        decode().with_context(|| format!("chunk {} does not decode", entry.id))?;
        if entry.id.chunk_type() == ChunkType::ExportBundleData {
            packages += 1;
        }
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "container": reader.path().display().to_string(),
                "chunks": report.chunks,
                "packages": packages,
                "stored_bytes": report.stored_bytes,
                "raw_bytes": report.raw_bytes,
                "ok": true,
            }))?
        ),
        OutputFormat::Text => {
            println!(
                "{} {} verified",
                "✓".green().bold(),
                reader.path().display().to_string().bold()
            );
            println!("  Chunks: {} ({} packages)", report.chunks, packages);
            println!(
                "  Size: {} stored, {} raw",
                format_size(report.stored_bytes),
                format_size(report.raw_bytes)
            );
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
