//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use recast::util::config::FlagOverrides;

/// recast - cross-compile packages by capturing and replaying their native builds
#[derive(Parser)]
#[command(name = "recast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a package's native build and replay it with the target toolchain
    Build(BuildArgs),

    /// Build every package under a directory in dependency order
    BuildAll(BuildAllArgs),

    /// Replay an existing build log
    Replay(ReplayArgs),

    /// Install the toolchain shims and print their directory
    Shims(ShimsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Flags controlling how recorded commands are rewritten.
#[derive(Args, Debug, Clone, Default)]
pub struct FlagArgs {
    /// Extra flags for every target compile
    #[arg(long, env = "RECAST_CFLAGS", allow_hyphen_values = true)]
    pub cflags: Option<String>,

    /// Extra flags for every target shared link
    #[arg(long, env = "RECAST_LDFLAGS", allow_hyphen_values = true)]
    pub ldflags: Option<String>,

    /// Host Python installation
    #[arg(long, env = "RECAST_HOST_PYTHON")]
    pub host: Option<PathBuf>,

    /// Target Python installation
    #[arg(long, env = "RECAST_TARGET_PYTHON")]
    pub target: Option<PathBuf>,
}

impl FlagArgs {
    pub fn overrides(&self) -> FlagOverrides {
        FlagOverrides {
            cflags: self.cflags.clone(),
            ldflags: self.ldflags.clone(),
            host_python: self.host.clone(),
            target_python: self.target.clone(),
        }
    }
}

#[derive(Args)]
pub struct BuildArgs {
    /// Package source directory (defaults to the current directory)
    #[arg(long)]
    pub package_dir: Option<PathBuf>,

    #[command(flatten)]
    pub flags: FlagArgs,

    /// Discard an existing build log and run the native build again
    #[arg(long)]
    pub recapture: bool,

    /// Print the replayed commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Native build command (defaults to `<host>/bin/python3 setup.py install`)
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Args)]
pub struct BuildAllArgs {
    /// Directory containing one subdirectory with a meta.toml per package
    pub input: PathBuf,

    /// Directory receiving every package's outputs
    pub output: PathBuf,

    /// Only build these packages (and what they depend on)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    #[command(flatten)]
    pub flags: FlagArgs,

    /// Discard existing build logs and run native builds again
    #[arg(long)]
    pub recapture: bool,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Build log to replay (defaults to ./build.log)
    #[arg(long)]
    pub log: Option<PathBuf>,

    #[command(flatten)]
    pub flags: FlagArgs,

    /// Print the replayed commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ShimsArgs {
    /// Directory to install the shims into
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
