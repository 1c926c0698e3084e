//! recast CLI, and the toolchain shims when invoked as `cc`, `c++`, `ld`, `ar` or `gcc`

use std::ffi::{OsStr, OsString};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use recast::builder::shim::{capture, CaptureContext, Role};
use recast::core::errors::exit_code_of;
use recast::core::Tool;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let mut argv = std::env::args_os();
    let argv0 = argv.next().unwrap_or_default();

    // The shim role must stay silent and exit with the real tool's status.
    if let Role::Shim(tool) = Role::from_argv0(&argv0) {
        std::process::exit(run_shim(tool, &argv0, argv));
    }

    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(exit_code_of(&e));
    }
}

fn run_shim(tool: Tool, argv0: &OsStr, args: impl Iterator<Item = OsString>) -> i32 {
    let args: Vec<OsString> = args.collect();

    match CaptureContext::from_env(argv0).and_then(|ctx| capture(tool, &args, &ctx)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("recast: {:#}", e);
            1
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("recast=debug")
    } else {
        EnvFilter::new("recast=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args),
        Commands::BuildAll(args) => commands::build_all::execute(args, cli.verbose),
        Commands::Replay(args) => commands::replay::execute(args),
        Commands::Shims(args) => commands::shims::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
