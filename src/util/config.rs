//! Configuration file support for recast.
//!
//! recast reads two configuration files:
//! - Global: `~/.recast/config.toml` - User-wide defaults
//! - Project: `.recast/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, field by field.
//! Command-line flags and `RECAST_*` environment variables take precedence
//! over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::rewrite::{ProbeFilter, RewriteConfig};
use crate::builder::toolchain::TargetToolchain;

/// Link flags used when neither the command line nor a config file sets any.
pub const DEFAULT_LDFLAGS: &str = "-O3 -s SIDE_MODULE=1 -s WASM=1 -s EMULATED_FUNCTION_POINTERS=1 -s EMULATE_FUNCTION_POINTER_CASTS=1 -Werror --memory-init-file 0";

/// Compile flags used when neither the command line nor a config file sets any.
pub const DEFAULT_CFLAGS: &str = "";

/// Host Python installation, relative to the working directory.
pub const DEFAULT_HOST_PYTHON: &str = "cpython/build/host";

/// Target Python installation, relative to the working directory.
pub const DEFAULT_TARGET_PYTHON: &str = "cpython/installs/python";

/// recast configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target toolchain executables
    pub toolchain: ToolchainSettings,

    /// Replay rewrite settings
    pub replay: ReplaySettings,

    /// Flag and installation defaults
    pub build: BuildSettings,
}

/// Target toolchain executables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// C compiler (e.g. `emcc`)
    pub cc: Option<PathBuf>,

    /// C++ compiler (e.g. `em++`)
    pub cxx: Option<PathBuf>,

    /// Archiver (e.g. `emar`)
    pub ar: Option<PathBuf>,
}

/// Settings for rewriting recorded invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReplaySettings {
    /// Directory prefixes whose `-I`/`-L` arguments are dropped
    pub system_prefixes: Option<Vec<String>>,

    /// Path component marking the host's package-installation subtree
    pub site_packages: Option<String>,

    /// Native-build probes that are never replayed
    pub filters: Option<Vec<ProbeFilter>>,

    /// Regexes matching platform tags to strip from shared object names
    pub platform_tags: Option<Vec<String>>,
}

/// Flag and installation defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildSettings {
    /// Extra compile flags for the target compiler
    pub cflags: Option<String>,

    /// Extra link flags for shared links
    pub ldflags: Option<String>,

    /// Host Python installation
    pub host_python: Option<PathBuf>,

    /// Target Python installation
    pub target_python: Option<PathBuf>,
}

/// Values given on the command line (or through `RECAST_*` variables).
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub cflags: Option<String>,
    pub ldflags: Option<String>,
    pub host_python: Option<PathBuf>,
    pub target_python: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.toolchain.cc, other.toolchain.cc);
        take(&mut self.toolchain.cxx, other.toolchain.cxx);
        take(&mut self.toolchain.ar, other.toolchain.ar);

        take(&mut self.replay.system_prefixes, other.replay.system_prefixes);
        take(&mut self.replay.site_packages, other.replay.site_packages);
        take(&mut self.replay.filters, other.replay.filters);
        take(&mut self.replay.platform_tags, other.replay.platform_tags);

        take(&mut self.build.cflags, other.build.cflags);
        take(&mut self.build.ldflags, other.build.ldflags);
        take(&mut self.build.host_python, other.build.host_python);
        take(&mut self.build.target_python, other.build.target_python);
    }

    /// The target toolchain, with built-in defaults for unset tools.
    pub fn target_toolchain(&self) -> TargetToolchain {
        let defaults = TargetToolchain::default();
        TargetToolchain {
            cc: self.toolchain.cc.clone().unwrap_or(defaults.cc),
            cxx: self.toolchain.cxx.clone().unwrap_or(defaults.cxx),
            ar: self.toolchain.ar.clone().unwrap_or(defaults.ar),
        }
    }

    /// Resolve the rewrite configuration.
    ///
    /// Precedence: overrides, then this config, then built-in defaults.
    /// Relative Python paths are made absolute against `cwd`.
    pub fn rewrite_config(&self, overrides: &FlagOverrides, cwd: &Path) -> RewriteConfig {
        let cflags = overrides
            .cflags
            .clone()
            .or_else(|| self.build.cflags.clone())
            .unwrap_or_else(|| DEFAULT_CFLAGS.to_string());
        let ldflags = overrides
            .ldflags
            .clone()
            .or_else(|| self.build.ldflags.clone())
            .unwrap_or_else(|| DEFAULT_LDFLAGS.to_string());
        let host = overrides
            .host_python
            .clone()
            .or_else(|| self.build.host_python.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOST_PYTHON));
        let target = overrides
            .target_python
            .clone()
            .or_else(|| self.build.target_python.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_PYTHON));

        let mut config = RewriteConfig::new(cwd.join(host), cwd.join(target))
            .with_cflags(&cflags)
            .with_ldflags(&ldflags);

        if let Some(ref prefixes) = self.replay.system_prefixes {
            config.system_prefixes = prefixes.clone();
        }
        if let Some(ref marker) = self.replay.site_packages {
            config.site_packages = marker.clone();
        }
        if let Some(ref filters) = self.replay.filters {
            config.filters = filters.clone();
        }
        if let Some(ref tags) = self.replay.platform_tags {
            config.platform_tags = tags.clone();
        }

        config
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.recast/config.toml)
/// 2. Global config (~/.recast/config.toml)
/// 3. Defaults
///
/// Missing files are skipped; unreadable ones are errors.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path.filter(|p| p.exists()) {
        config.merge(Config::load(global_path)?);
    }

    if project_path.exists() {
        config.merge(Config::load(project_path)?);
    }

    Ok(config)
}

/// Get the global recast config directory (~/.recast).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".recast"))
}

/// Get the global config path (~/.recast/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.recast/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".recast").join("config.toml")
}
