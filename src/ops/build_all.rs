//! Building a whole packages directory in dependency order.
//!
//! Each package is cross-built once; a build marker inside the package's
//! `build/` directory records a successful build so later runs skip it.
//! Outputs of every package, built or skipped, are copied into the shared
//! output directory, and a `packages.json` manifest of the full dependency
//! map is written at the end.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::builder::native::default_build_command;
use crate::builder::rewrite::RewriteConfig;
use crate::builder::toolchain::TargetToolchain;
use crate::core::errors::CrossBuildError;
use crate::core::invocation::BuildLog;
use crate::core::package::{DependencyMap, PackageDescriptor};
use crate::ops::build_order::build_order;
use crate::ops::cross_build::{cross_build, CrossBuildOptions};
use crate::sources::DescriptorSource;
use crate::util::fs::{copy_atomic, ensure_dir, read_to_string, write_string};
use crate::util::hash::{sha256_file, Fingerprint};
use crate::util::process::{exit_code, ProcessBuilder};

/// File name of the build marker inside a package's build directory.
pub const MARKER_FILE_NAME: &str = ".recast-built";

/// File name of the dependency manifest written to the output directory.
pub const MANIFEST_FILE_NAME: &str = "packages.json";

/// Environment variable naming the package to a packaging command.
pub const PACKAGE_NAME_ENV: &str = "RECAST_PACKAGE";

/// Builds one package, leaving its data and loader files in its build directory.
pub trait PackageBuilder {
    /// Build `pkg`. Its dependencies have already been built.
    fn build(&self, pkg: &PackageDescriptor) -> Result<()>;

    /// Fingerprint of the configuration `pkg` is built with.
    fn fingerprint(&self, pkg: &PackageDescriptor) -> String;
}

/// Settings shared by every package in a `build-all` run.
#[derive(Debug, Clone)]
pub struct CrossPackageBuilder {
    /// Global rewrite configuration, before per-package flags
    pub rewrite: RewriteConfig,
    pub toolchain: TargetToolchain,
    pub shim_dir: PathBuf,
    pub exe: PathBuf,
    pub recapture: bool,
}

impl CrossPackageBuilder {
    fn options_for(&self, pkg: &PackageDescriptor) -> CrossBuildOptions {
        let command = pkg
            .recipe
            .command
            .clone()
            .unwrap_or_else(|| default_build_command(&self.rewrite.host));

        CrossBuildOptions {
            rewrite: self
                .rewrite
                .clone()
                .with_extra_flags(&pkg.recipe.cflags, &pkg.recipe.ldflags),
            toolchain: self.toolchain.clone(),
            shim_dir: self.shim_dir.clone(),
            exe: self.exe.clone(),
            command,
            recapture: self.recapture,
            dry_run: false,
        }
    }

    fn run_packaging(&self, pkg: &PackageDescriptor, argv: &[String]) -> Result<()> {
        ensure_dir(&pkg.build_dir())?;

        let pb = ProcessBuilder::from_argv(argv)?
            .cwd(&pkg.root)
            .env(PACKAGE_NAME_ENV, &pkg.name);
        eprintln!("   Packaging {}", pkg.name);

        let status = pb.status()?;
        if !status.success() {
            return Err(CrossBuildError::PackagingFailed {
                package: pkg.name.clone(),
                command: pb.display_command(),
                code: Some(exit_code(&status)),
            }
            .into());
        }
        Ok(())
    }
}

impl PackageBuilder for CrossPackageBuilder {
    fn build(&self, pkg: &PackageDescriptor) -> Result<()> {
        let opts = self.options_for(pkg);
        cross_build(&pkg.source_dir(), &opts)?;

        if let Some(ref argv) = pkg.recipe.package_command {
            self.run_packaging(pkg, argv)?;
        }
        Ok(())
    }

    fn fingerprint(&self, pkg: &PackageDescriptor) -> String {
        let opts = self.options_for(pkg);
        let mut fp = Fingerprint::new();
        fp.update_strs(opts.command.iter().map(String::as_str))
            .update_strs(opts.rewrite.cflags.iter().map(String::as_str))
            .update_strs(opts.rewrite.ldflags.iter().map(String::as_str))
            .update_str(&opts.rewrite.host.to_string_lossy())
            .update_str(&opts.rewrite.target.to_string_lossy())
            .update_str(&opts.toolchain.cc.to_string_lossy())
            .update_str(&opts.toolchain.cxx.to_string_lossy())
            .update_str(&opts.toolchain.ar.to_string_lossy());
        fp.finish()
    }
}

/// Contents of a build marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMarker {
    pub package: String,

    /// SHA-256 of the replayed build log; absent for packages that made no
    /// toolchain calls
    pub log_sha256: Option<String>,

    pub fingerprint: String,
}

impl BuildMarker {
    pub fn path_for(pkg: &PackageDescriptor) -> PathBuf {
        pkg.build_dir().join(MARKER_FILE_NAME)
    }

    /// Read the marker of `pkg`. `Ok(None)` means the package is unbuilt.
    pub fn load(pkg: &PackageDescriptor) -> Result<Option<BuildMarker>> {
        let path = Self::path_for(pkg);
        if !path.exists() {
            return Ok(None);
        }
        let contents = read_to_string(&path)?;
        let marker = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse build marker: {}", path.display()))?;
        Ok(Some(marker))
    }

    pub fn save(&self, pkg: &PackageDescriptor) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        write_string(&Self::path_for(pkg), &contents)
    }
}

/// Options for [`build_all`].
#[derive(Debug, Clone, Default)]
pub struct BuildAllOptions {
    /// Packages to build, with their dependencies (empty = all)
    pub only: Vec<String>,

    /// Show a progress bar
    pub progress: bool,
}

/// Result of a [`build_all`] run.
#[derive(Debug, Clone, Default)]
pub struct BuildAllReport {
    /// Packages built in this run, in build order
    pub built: Vec<String>,

    /// Packages skipped because they were already built
    pub skipped: Vec<String>,

    /// Path of the written manifest
    pub manifest: PathBuf,
}

/// The manifest written to the output directory.
#[derive(Debug, Serialize)]
struct Manifest<'a> {
    dependencies: &'a DependencyMap,
}

/// Build every package under `input` and collect the outputs in `output`.
///
/// Any failure aborts the run: packages later in the order, including
/// everything depending on the failed package, are never attempted.
pub fn build_all(
    input: &Path,
    output: &Path,
    opts: &BuildAllOptions,
    source: &dyn DescriptorSource,
    builder: &dyn PackageBuilder,
) -> Result<BuildAllReport> {
    let start = Instant::now();

    let descriptors = source.descriptors(input)?;
    let map = DependencyMap::from_descriptors(&descriptors)?;
    map.validate()?;
    let order = build_order(&map, &opts.only)?;

    tracing::info!("build order: {}", order.join(", "));
    ensure_dir(output)?;

    let progress = if opts.progress && order.len() > 1 {
        let pb = ProgressBar::new(order.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut report = BuildAllReport::default();

    for name in &order {
        let Some(pkg) = descriptors.iter().find(|d| &d.name == name) else {
            continue;
        };
        if let Some(ref pb) = progress {
            pb.set_message(name.clone());
        }

        // Status lines, logging and the native build's own output print
        // while the bar is cleared.
        let built = match progress {
            Some(ref pb) => pb.suspend(|| build_package(pkg, builder))?,
            None => build_package(pkg, builder)?,
        };
        if built {
            report.built.push(name.clone());
        } else {
            report.skipped.push(name.clone());
        }
        copy_outputs(pkg, output)?;

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message("done");
    }

    report.manifest = output.join(MANIFEST_FILE_NAME);
    let manifest = serde_json::to_string_pretty(&Manifest { dependencies: &map })?;
    write_string(&report.manifest, &manifest)?;

    eprintln!(
        "    Finished {} package(s) ({} already built) in {:.2}s",
        order.len(),
        report.skipped.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(report)
}

/// Build one package unless its marker says it is done. Returns whether it was built.
fn build_package(pkg: &PackageDescriptor, builder: &dyn PackageBuilder) -> Result<bool> {
    let fingerprint = builder.fingerprint(pkg);

    if let Some(marker) = BuildMarker::load(pkg)? {
        if marker.fingerprint != fingerprint {
            tracing::warn!(
                "`{}` was built with a different configuration; remove {} to rebuild it",
                pkg.name,
                BuildMarker::path_for(pkg).display()
            );
        }
        eprintln!("       Fresh {}", pkg.name);
        return Ok(false);
    }

    eprintln!("    Building {}", pkg.name);
    builder
        .build(pkg)
        .with_context(|| format!("failed to build `{}`", pkg.name))?;

    verify_outputs(pkg)?;

    let log = BuildLog::in_dir(&pkg.source_dir());
    let log_sha256 = if log.exists() {
        Some(sha256_file(log.path())?)
    } else {
        None
    };

    BuildMarker {
        package: pkg.name.clone(),
        log_sha256,
        fingerprint,
    }
    .save(pkg)?;

    Ok(true)
}

fn verify_outputs(pkg: &PackageDescriptor) -> Result<(), CrossBuildError> {
    for path in pkg.outputs() {
        if !path.is_file() {
            return Err(CrossBuildError::MissingOutput {
                package: pkg.name.clone(),
                path,
            });
        }
    }
    Ok(())
}

fn copy_outputs(pkg: &PackageDescriptor, output: &Path) -> Result<()> {
    verify_outputs(pkg)?;
    for path in pkg.outputs() {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        copy_atomic(&path, &output.join(file_name))?;
    }
    Ok(())
}
