//! Cross-building a single package: capture, scrub, replay.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::native::NativeBuildDriver;
use crate::builder::replay::{ReplayEngine, ReplaySummary};
use crate::builder::rewrite::{RewriteConfig, RewriteRules};
use crate::builder::scrub::scrub_native_artifacts;
use crate::builder::shim::ShimInstaller;
use crate::builder::toolchain::TargetToolchain;
use crate::core::invocation::BuildLog;

/// Options for cross-building one package directory.
#[derive(Debug, Clone)]
pub struct CrossBuildOptions {
    /// Resolved rewrite configuration, package flags included
    pub rewrite: RewriteConfig,

    pub toolchain: TargetToolchain,

    /// Directory the shims are installed into
    pub shim_dir: PathBuf,

    /// Executable the shims point at (the recast binary)
    pub exe: PathBuf,

    /// Native build command
    pub command: Vec<String>,

    /// Discard an existing build log and capture again
    pub recapture: bool,

    /// Print replayed commands instead of running them
    pub dry_run: bool,
}

/// What happened while cross-building a package.
#[derive(Debug, Clone)]
pub struct CrossBuildResult {
    pub log: BuildLog,

    /// Whether the native build ran (as opposed to an existing log being reused)
    pub captured: bool,

    /// Native artifacts removed before replay
    pub scrubbed: usize,

    pub replay: ReplaySummary,
}

/// Cross-build the package whose sources are in `dir`.
///
/// Runs the native build through the shims unless a build log already
/// exists, removes the native artifacts, then replays the log with the
/// target toolchain. A dry run still captures when needed but neither
/// scrubs nor executes the replay.
pub fn cross_build(dir: &Path, opts: &CrossBuildOptions) -> Result<CrossBuildResult> {
    // Rules are compiled first so a bad regex fails before the native build runs.
    let rules = RewriteRules::new(opts.rewrite.clone(), opts.toolchain.clone())?;

    let mut log = BuildLog::in_dir(dir);
    if opts.recapture {
        log.remove()?;
    }

    let captured = if log.exists() {
        eprintln!("     Reusing {}", log.path().display());
        false
    } else {
        eprintln!("   Capturing {}", dir.display());
        let env = ShimInstaller::new(&opts.shim_dir)
            .install_for(&opts.exe, dir)
            .context("failed to install toolchain shims")?;
        log = NativeBuildDriver::new(&env).run(&opts.command, dir)?;
        true
    };

    let scrubbed = if opts.dry_run {
        0
    } else {
        scrub_native_artifacts(dir)?
    };

    eprintln!("   Replaying {}", dir.display());
    let replay = ReplayEngine::new(&rules, dir)
        .dry_run(opts.dry_run)
        .replay_log(&log)?;

    tracing::info!(
        "replayed {} command(s), skipped {} probe(s)",
        replay.replayed,
        replay.skipped
    );

    Ok(CrossBuildResult {
        log,
        captured,
        scrubbed,
        replay,
    })
}
