//! Command implementations

pub mod build;
pub mod build_all;
pub mod completions;
pub mod replay;
pub mod shims;

use anyhow::Result;

use recast::builder::{RewriteConfig, TargetToolchain};
use recast::util::GlobalContext;

use crate::cli::FlagArgs;

/// Resolve the rewrite configuration and target toolchain for a command.
///
/// Flags (and their environment variables) win over the config files.
pub fn resolve_rewrite(
    ctx: &GlobalContext,
    flags: &FlagArgs,
) -> Result<(RewriteConfig, TargetToolchain)> {
    let config = ctx.load_config()?;
    let rewrite = config.rewrite_config(&flags.overrides(), ctx.cwd());
    let toolchain = config.target_toolchain();

    for tool in toolchain.missing() {
        tracing::warn!("target tool `{}` not found", tool.display());
    }

    Ok((rewrite, toolchain))
}
