//! `recast build-all` command

use anyhow::{Context, Result};

use recast::ops::{build_all, BuildAllOptions, CrossPackageBuilder};
use recast::sources::TomlDescriptorSource;
use recast::util::GlobalContext;

use crate::cli::BuildAllArgs;
use crate::commands::resolve_rewrite;

pub fn execute(args: BuildAllArgs, verbose: bool) -> Result<()> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(verbose);

    let input = ctx.cwd().join(&args.input);
    let output = ctx.cwd().join(&args.output);

    let (rewrite, toolchain) = resolve_rewrite(&ctx, &args.flags)?;

    let builder = CrossPackageBuilder {
        rewrite,
        toolchain,
        shim_dir: ctx.shim_dir(),
        exe: std::env::current_exe().context("failed to locate the recast executable")?,
        recapture: args.recapture,
    };

    let opts = BuildAllOptions {
        only: args.only,
        progress: !ctx.is_verbose(),
    };

    let report = build_all(&input, &output, &opts, &TomlDescriptorSource::new(), &builder)?;
    tracing::debug!("wrote {}", report.manifest.display());

    Ok(())
}
