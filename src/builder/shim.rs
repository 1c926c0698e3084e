//! Toolchain shims: the invocation recorder and its installer.
//!
//! The recast binary doubles as every shim. Installed as symlinks named
//! `cc`, `c++`, `ld`, `ar` and `gcc` in a shim directory that is put first
//! on the native build's `PATH`, it is started under one of those names,
//! appends the invocation to the build log, and hands the call on to the
//! real tool of the same name.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::invocation::{BuildLog, Invocation, Tool, BUILD_LOG_NAME};
use crate::util::fs::{ensure_dir, is_broken_symlink, symlink};
use crate::util::process::{
    exit_code, find_executable_in, prepend_path_entry, strip_path_entry, ProcessBuilder,
};

/// Environment variable naming the build log shims append to.
pub const BUILD_LOG_ENV: &str = "RECAST_BUILD_LOG";

/// Environment variable naming the shim directory to strip from `PATH`.
pub const SHIM_DIR_ENV: &str = "RECAST_SHIM_DIR";

/// Exit code for a shim whose real tool cannot be found.
const TOOL_NOT_FOUND: i32 = 127;

/// What this process is, decided once at startup from its invoked name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Standing in for a native toolchain executable
    Shim(Tool),
    /// The recast command-line driver
    Driver,
}

impl Role {
    /// Determine the role from `argv[0]`.
    pub fn from_argv0(argv0: &OsStr) -> Role {
        Path::new(argv0)
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse::<Tool>().ok())
            .map(Role::Shim)
            .unwrap_or(Role::Driver)
    }
}

/// Environment handed to a native build so that it runs through the shims.
///
/// Only the child process sees these values; the driver's own environment
/// is never modified.
#[derive(Debug, Clone)]
pub struct ShimEnv {
    shim_dir: PathBuf,
    log: PathBuf,
    path: OsString,
}

impl ShimEnv {
    /// Environment for shims in `shim_dir` writing to `log`, in front of `base_path`.
    pub fn new(shim_dir: PathBuf, log: PathBuf, base_path: Option<&OsStr>) -> Result<Self> {
        let path = prepend_path_entry(base_path, &shim_dir)?;
        Ok(ShimEnv {
            shim_dir,
            log,
            path,
        })
    }

    pub fn shim_dir(&self) -> &Path {
        &self.shim_dir
    }

    /// The build log the shims append to.
    pub fn log_path(&self) -> &Path {
        &self.log
    }

    /// Variables to set on the native build process.
    pub fn vars(&self) -> Vec<(String, OsString)> {
        let mut vars = vec![
            ("PATH".to_string(), self.path.clone()),
            (BUILD_LOG_ENV.to_string(), self.log.clone().into_os_string()),
            (
                SHIM_DIR_ENV.to_string(),
                self.shim_dir.clone().into_os_string(),
            ),
        ];
        for tool in Tool::ALL {
            if let Some(var) = tool.env_var() {
                vars.push((
                    var.to_string(),
                    self.shim_dir.join(tool.as_str()).into_os_string(),
                ));
            }
        }
        vars
    }

    /// Apply the shim environment to a process.
    pub fn apply(&self, pb: ProcessBuilder) -> ProcessBuilder {
        pb.envs(self.vars())
    }
}

/// Creates the shim symlinks.
#[derive(Debug, Clone)]
pub struct ShimInstaller {
    dir: PathBuf,
}

impl ShimInstaller {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ShimInstaller { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the shim standing in for `tool`.
    pub fn shim_path(&self, tool: Tool) -> PathBuf {
        self.dir.join(tool.as_str())
    }

    /// Ensure every shim exists and points at `exe`.
    ///
    /// Missing shims are created, broken or stale symlinks replaced. A
    /// regular file in a shim's place is left alone.
    pub fn install(&self, exe: &Path) -> Result<()> {
        ensure_dir(&self.dir)?;

        for tool in Tool::ALL {
            let link = self.shim_path(tool);

            let stale = match std::fs::read_link(&link) {
                Ok(target) => target != exe || is_broken_symlink(&link),
                Err(_) => false,
            };
            if stale {
                std::fs::remove_file(&link)
                    .with_context(|| format!("failed to remove stale shim: {}", link.display()))?;
            }

            if link.symlink_metadata().is_ok() {
                if !stale && std::fs::read_link(&link).is_err() {
                    tracing::warn!("{} is not a recast shim, leaving it alone", link.display());
                }
                continue;
            }

            symlink(exe, &link).with_context(|| {
                format!("failed to create shim {} -> {}", link.display(), exe.display())
            })?;
            tracing::debug!("installed shim {}", link.display());
        }

        Ok(())
    }

    /// Install the shims and return the environment for a build in `cwd`.
    pub fn install_for(&self, exe: &Path, cwd: &Path) -> Result<ShimEnv> {
        self.install(exe)?;
        let base_path = std::env::var_os("PATH");
        ShimEnv::new(
            self.dir.clone(),
            cwd.join(BUILD_LOG_NAME),
            base_path.as_deref(),
        )
    }
}

/// Where a shim records to and how it finds the real tool.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    pub log: BuildLog,
    pub shim_dir: Option<PathBuf>,
    pub path: Option<OsString>,
    pub cwd: PathBuf,
}

impl CaptureContext {
    /// Read the context a shim was started with.
    ///
    /// Without `RECAST_BUILD_LOG` the log is `build.log` in the working
    /// directory; without `RECAST_SHIM_DIR` the shim directory is the one
    /// `argv0` was found in.
    pub fn from_env(argv0: &OsStr) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let log = match std::env::var_os(BUILD_LOG_ENV) {
            Some(path) => BuildLog::new(PathBuf::from(path)),
            None => BuildLog::in_dir(&cwd),
        };
        let shim_dir = std::env::var_os(SHIM_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                Path::new(argv0)
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(|p| cwd.join(p))
            });

        Ok(CaptureContext {
            log,
            shim_dir,
            path: std::env::var_os("PATH"),
            cwd,
        })
    }

    /// `PATH` with the shim directory removed.
    pub fn clean_path(&self) -> OsString {
        let path = self.path.clone().unwrap_or_default();
        match self.shim_dir {
            Some(ref dir) => strip_path_entry(&path, dir),
            None => path,
        }
    }
}

/// Record one invocation and forward it to the real tool.
///
/// Returns the exit code the shim process must exit with: the real tool's.
/// The log stores arguments as UTF-8 (lossily); the real tool receives them
/// untouched.
pub fn capture(tool: Tool, args: &[OsString], ctx: &CaptureContext) -> Result<i32> {
    let recorded = args.iter().map(|a| a.to_string_lossy().into_owned());
    ctx.log.append(&Invocation::new(tool.as_str(), recorded))?;

    let path = ctx.clean_path();
    let Some(real) = find_executable_in(tool.as_str(), &path, &ctx.cwd) else {
        eprintln!("recast: cannot find the real `{}` on PATH", tool);
        return Ok(TOOL_NOT_FOUND);
    };

    let status = ProcessBuilder::new(&real)
        .args(args)
        .cwd(&ctx.cwd)
        .env("PATH", &path)
        .status()?;

    Ok(exit_code(&status))
}
