use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "iopack",
    about = "Package-store optimizer: packs serialized packages into streaming containers",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CompressionArg {
    None,
    Zstd,
}

#[derive(Subcommand)]
pub enum Command {
    /// Optimize a package tree into containers
    Build(BuildArgs),
    /// List the chunks of a container
    List(ContainerArgs),
    /// Check a container's checksum and every chunk
    Verify(ContainerArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// TOML build configuration; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub input: Option<PathBuf>,
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub mount_point: Option<String>,
    /// `container<TAB>package-prefix` rules
    #[arg(long)]
    pub containers: Option<PathBuf>,
    #[arg(long)]
    pub order_file: Option<PathBuf>,
    #[arg(long)]
    pub open_order_file: Option<PathBuf>,
    /// Directory holding the release snapshots of the previous build
    #[arg(long)]
    pub previous_build: Option<PathBuf>,
    /// Write `<container>.release` next to each container
    #[arg(long)]
    pub release_snapshot: bool,
    #[arg(long)]
    pub compression: Option<CompressionArg>,
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// Mirror every chunk into this directory
    #[arg(long)]
    pub remote_store: Option<PathBuf>,
}

#[derive(Args)]
pub struct ContainerArgs {
    /// Container file, or a container name looked up in `--dir`
    pub container: String,
    #[arg(long, default_value = "Paks")]
    pub dir: PathBuf,
}
