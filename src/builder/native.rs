//! Native build driver.
//!
//! Runs a package's own build once, through the shims, purely to populate
//! the build log. The native artifacts it produces are thrown away.

use std::path::Path;

use anyhow::Result;

use crate::builder::shim::ShimEnv;
use crate::core::errors::CrossBuildError;
use crate::core::invocation::BuildLog;
use crate::util::process::{exit_code, ProcessBuilder};

/// The native build entry point used when a package declares none.
pub fn default_build_command(host_python: &Path) -> Vec<String> {
    vec![
        host_python
            .join("bin")
            .join("python3")
            .display()
            .to_string(),
        "setup.py".to_string(),
        "install".to_string(),
    ]
}

/// Runs native builds under a shim environment.
pub struct NativeBuildDriver<'a> {
    env: &'a ShimEnv,
}

impl<'a> NativeBuildDriver<'a> {
    pub fn new(env: &'a ShimEnv) -> Self {
        NativeBuildDriver { env }
    }

    /// Run `command` in `cwd`, capturing into a fresh build log.
    ///
    /// On failure the partially captured log is deleted, so a half-captured
    /// log can never be replayed.
    pub fn run(&self, command: &[String], cwd: &Path) -> Result<BuildLog> {
        let log = BuildLog::new(self.env.log_path());
        log.remove()?;

        let pb = self.env.apply(ProcessBuilder::from_argv(command)?.cwd(cwd));
        tracing::info!("capturing `{}` in {}", pb.display_command(), cwd.display());

        let status = match pb.status() {
            Ok(status) => status,
            Err(e) => {
                log.remove()?;
                return Err(e);
            }
        };

        if !status.success() {
            log.remove()?;
            return Err(CrossBuildError::NativeBuildFailed {
                command: pb.display_command(),
                code: Some(exit_code(&status)),
            }
            .into());
        }

        if log.exists() {
            tracing::debug!("captured build log {}", log.path().display());
        } else {
            tracing::info!("native build made no toolchain calls");
        }

        Ok(log)
    }
}
