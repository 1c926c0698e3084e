//! `recast replay` command

use anyhow::{bail, Result};

use recast::builder::{ReplayEngine, RewriteRules};
use recast::core::invocation::BUILD_LOG_NAME;
use recast::core::BuildLog;
use recast::util::GlobalContext;

use crate::cli::ReplayArgs;
use crate::commands::resolve_rewrite;

pub fn execute(args: ReplayArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;

    let log_path = match args.log {
        Some(ref path) => ctx.cwd().join(path),
        None => ctx.cwd().join(BUILD_LOG_NAME),
    };
    if !log_path.is_file() {
        bail!("build log not found: {}", log_path.display());
    }

    // Recorded paths are relative to the directory the build ran in.
    let dir = log_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ctx.cwd().to_path_buf());

    let (rewrite, toolchain) = resolve_rewrite(&ctx, &args.flags)?;
    let rules = RewriteRules::new(rewrite, toolchain)?;

    let summary = ReplayEngine::new(&rules, dir)
        .dry_run(args.dry_run)
        .replay_log(&BuildLog::new(log_path))?;

    if !args.dry_run {
        eprintln!(
            "    Finished {} command(s) replayed, {} skipped",
            summary.replayed, summary.skipped
        );
    }

    Ok(())
}
