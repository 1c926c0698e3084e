//! Package descriptor discovery.
//!
//! Descriptors live one directory below the packages root, as
//! `<root>/<package>/meta.toml`:
//!
//! ```toml
//! [package]
//! name = "numpy"
//!
//! [source]
//! path = "src"
//!
//! [build]
//! command = ["python3", "setup.py", "install"]
//! cflags = "-DFOO"
//! package = ["sh", "../package.sh"]
//!
//! [requirements]
//! run = ["six"]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::core::package::{BuildRecipe, PackageDescriptor};
use crate::util::fs::{glob_files, read_to_string};

/// File name of a package descriptor.
pub const DESCRIPTOR_FILE_NAME: &str = "meta.toml";

/// Where package descriptors come from.
pub trait DescriptorSource {
    /// Every descriptor found under `root`, sorted by package directory.
    fn descriptors(&self, root: &Path) -> Result<Vec<PackageDescriptor>>;
}

/// Reads `meta.toml` descriptors from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlDescriptorSource;

impl TomlDescriptorSource {
    pub fn new() -> Self {
        TomlDescriptorSource
    }

    /// Parse a single descriptor file.
    pub fn load(path: &Path) -> Result<PackageDescriptor> {
        let contents = read_to_string(path)?;
        let meta: MetaFile = toml::from_str(&contents)
            .with_context(|| format!("failed to parse package descriptor: {}", path.display()))?;

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        meta.into_descriptor(root)
            .with_context(|| format!("invalid package descriptor: {}", path.display()))
    }
}

impl DescriptorSource for TomlDescriptorSource {
    fn descriptors(&self, root: &Path) -> Result<Vec<PackageDescriptor>> {
        if !root.is_dir() {
            bail!("packages directory not found: {}", root.display());
        }

        let pattern = format!("*/{}", DESCRIPTOR_FILE_NAME);
        let files = glob_files(root, &[pattern])?;
        tracing::debug!("found {} descriptor(s) under {}", files.len(), root.display());

        files.iter().map(|path| Self::load(path)).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetaFile {
    package: MetaPackage,
    #[serde(default)]
    source: MetaSource,
    #[serde(default)]
    build: MetaBuild,
    #[serde(default)]
    requirements: MetaRequirements,
}

#[derive(Debug, Deserialize)]
struct MetaPackage {
    name: String,
    // Informational only.
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaSource {
    #[serde(default = "default_source_path")]
    path: PathBuf,
}

impl Default for MetaSource {
    fn default() -> Self {
        MetaSource {
            path: default_source_path(),
        }
    }
}

fn default_source_path() -> PathBuf {
    PathBuf::from("src")
}

#[derive(Debug, Default, Deserialize)]
struct MetaBuild {
    command: Option<Vec<String>>,
    #[serde(default)]
    cflags: String,
    #[serde(default)]
    ldflags: String,
    package: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct MetaRequirements {
    #[serde(default)]
    run: Vec<String>,
}

impl MetaFile {
    fn into_descriptor(self, root: PathBuf) -> Result<PackageDescriptor> {
        let name = self.package.name.trim().to_string();
        if name.is_empty() {
            bail!("`package.name` must not be empty");
        }
        if self.build.command.as_ref().is_some_and(Vec::is_empty) {
            bail!("`build.command` must not be empty");
        }
        if self.build.package.as_ref().is_some_and(Vec::is_empty) {
            bail!("`build.package` must not be empty");
        }

        let recipe = BuildRecipe {
            command: self.build.command,
            cflags: self.build.cflags,
            ldflags: self.build.ldflags,
            source_dir: self.source.path,
            package_command: self.build.package,
        };

        let mut desc =
            PackageDescriptor::new(name, root).with_dependencies(self.requirements.run);
        desc.recipe = recipe;
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_meta(root: &Path, dir: &str, contents: &str) {
        fs::create_dir_all(root.join(dir)).unwrap();
        fs::write(root.join(dir).join(DESCRIPTOR_FILE_NAME), contents).unwrap();
    }

    #[test]
    fn test_full_descriptor() {
        let tmp = TempDir::new().unwrap();
        write_meta(
            tmp.path(),
            "numpy",
            r#"
            [package]
            name = "numpy"
            version = "1.15.1"

            [source]
            path = "numpy-1.15.1"

            [build]
            command = ["python3", "setup.py", "install"]
            cflags = "-DNDEBUG"
            package = ["sh", "../package.sh"]

            [requirements]
            run = ["six"]
            "#,
        );

        let desc = TomlDescriptorSource::load(&tmp.path().join("numpy/meta.toml")).unwrap();
        assert_eq!(desc.name, "numpy");
        assert_eq!(desc.root, tmp.path().join("numpy"));
        assert_eq!(desc.dependencies, ["six"]);
        assert_eq!(desc.source_dir(), tmp.path().join("numpy/numpy-1.15.1"));
        assert_eq!(desc.recipe.cflags, "-DNDEBUG");
        assert_eq!(desc.recipe.ldflags, "");
        assert_eq!(
            desc.recipe.package_command.as_deref(),
            Some(&["sh".to_string(), "../package.sh".to_string()][..])
        );
    }

    #[test]
    fn test_minimal_descriptor_defaults() {
        let tmp = TempDir::new().unwrap();
        write_meta(tmp.path(), "six", "[package]\nname = \"six\"\n");

        let desc = TomlDescriptorSource::load(&tmp.path().join("six/meta.toml")).unwrap();
        assert!(desc.dependencies.is_empty());
        assert!(desc.recipe.command.is_none());
        assert_eq!(desc.recipe.source_dir, PathBuf::from("src"));
    }

    #[test]
    fn test_discovers_one_level_down() {
        let tmp = TempDir::new().unwrap();
        write_meta(tmp.path(), "b", "[package]\nname = \"b\"\n[requirements]\nrun = [\"a\"]\n");
        write_meta(tmp.path(), "a", "[package]\nname = \"a\"\n");
        write_meta(tmp.path(), "a/nested", "[package]\nname = \"nested\"\n");
        fs::write(tmp.path().join("meta.toml"), "[package]\nname = \"top\"\n").unwrap();

        let descs = TomlDescriptorSource::new().descriptors(tmp.path()).unwrap();
        let names: Vec<_> = descs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_invalid_descriptors_rejected() {
        let tmp = TempDir::new().unwrap();
        write_meta(tmp.path(), "x", "[package]\nname = \"\"\n");
        assert!(TomlDescriptorSource::new().descriptors(tmp.path()).is_err());

        write_meta(tmp.path(), "x", "[package]\nname = \"x\"\n[build]\ncommand = []\n");
        assert!(TomlDescriptorSource::new().descriptors(tmp.path()).is_err());

        write_meta(tmp.path(), "x", "[pkg]\nname = \"x\"\n");
        let err = TomlDescriptorSource::new().descriptors(tmp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("x/meta.toml"));
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(TomlDescriptorSource::new()
            .descriptors(&tmp.path().join("absent"))
            .is_err());
    }
}
