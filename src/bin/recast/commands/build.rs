//! `recast build` command

use std::time::Instant;

use anyhow::{Context, Result};

use recast::builder::native::default_build_command;
use recast::ops::{cross_build, CrossBuildOptions};
use recast::util::GlobalContext;

use crate::cli::BuildArgs;
use crate::commands::resolve_rewrite;

pub fn execute(args: BuildArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let start = Instant::now();

    let dir = match args.package_dir {
        Some(ref dir) => ctx.cwd().join(dir),
        None => ctx.cwd().to_path_buf(),
    };

    let (rewrite, toolchain) = resolve_rewrite(&ctx, &args.flags)?;

    let command = if args.command.is_empty() {
        default_build_command(&rewrite.host)
    } else {
        args.command
    };

    let opts = CrossBuildOptions {
        rewrite,
        toolchain,
        shim_dir: ctx.shim_dir(),
        exe: std::env::current_exe().context("failed to locate the recast executable")?,
        command,
        recapture: args.recapture,
        dry_run: args.dry_run,
    };

    let result = cross_build(&dir, &opts)?;

    for shared in &result.replay.shared_objects {
        eprintln!("    Produced {}", shared.display());
    }
    eprintln!(
        "    Finished {} command(s) replayed, {} skipped in {:.2}s",
        result.replay.replayed,
        result.replay.skipped,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
