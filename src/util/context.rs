//! Global context for recast operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::util::config::{self, Config};

/// Environment variable overriding the recast home directory.
pub const HOME_ENV: &str = "RECAST_HOME";

/// Project directories for recast
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("com", "recast", "recast"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Directory for recast's own data (installed shims)
    home: PathBuf,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let home = match (std::env::var_os(HOME_ENV), PROJECT_DIRS.as_ref()) {
            (Some(home), _) => cwd.join(home),
            (None, Some(dirs)) => dirs.cache_dir().to_path_buf(),
            (None, None) => cwd.join(".recast"),
        };

        Ok(GlobalContext {
            cwd,
            home,
            verbose: false,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Default directory the toolchain shims are installed into.
    pub fn shim_dir(&self) -> PathBuf {
        self.home.join("shims")
    }

    /// Get the project-local recast directory.
    pub fn project_dir(&self) -> PathBuf {
        self.cwd.join(".recast")
    }

    /// Load the merged global and project configuration.
    pub fn load_config(&self) -> Result<Config> {
        let global = config::global_config_path();
        config::load_config(global.as_deref(), &config::project_config_path(&self.cwd))
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
