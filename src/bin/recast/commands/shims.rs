//! `recast shims` command

use anyhow::{Context, Result};

use recast::builder::ShimInstaller;
use recast::util::GlobalContext;

use crate::cli::ShimsArgs;

pub fn execute(args: ShimsArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;

    let dir = match args.dir {
        Some(ref dir) => ctx.cwd().join(dir),
        None => ctx.shim_dir(),
    };

    let exe = std::env::current_exe().context("failed to locate the recast executable")?;
    ShimInstaller::new(&dir).install(&exe)?;

    println!("{}", dir.display());
    Ok(())
}
