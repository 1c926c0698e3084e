//! Package descriptors and the dependency map built from them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::CrossBuildError;

/// Directory (relative to the package directory) holding build outputs.
pub const BUILD_DIR_NAME: &str = "build";

/// How one package is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRecipe {
    /// Native build entry point. `None` means the configured default.
    pub command: Option<Vec<String>>,
    /// Extra compile flags appended to the global ones.
    pub cflags: String,
    /// Extra link flags appended to the global ones.
    pub ldflags: String,
    /// Source tree, relative to the package directory.
    pub source_dir: PathBuf,
    /// Packaging step run after replay, producing the data and loader files.
    pub package_command: Option<Vec<String>>,
}

/// A package to cross-build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    /// Directory containing the descriptor.
    pub root: PathBuf,
    /// Run-time dependencies, by name.
    pub dependencies: Vec<String>,
    pub recipe: BuildRecipe,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        PackageDescriptor {
            name: name.into(),
            root: root.into(),
            dependencies: Vec::new(),
            recipe: BuildRecipe::default(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Source tree the native build runs in.
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(&self.recipe.source_dir)
    }

    /// Directory receiving this package's outputs and build marker.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(BUILD_DIR_NAME)
    }

    /// The data payload produced for this package.
    pub fn data_file(&self) -> PathBuf {
        self.build_dir().join(format!("{}.data", self.name))
    }

    /// The loader script produced for this package.
    pub fn loader_file(&self) -> PathBuf {
        self.build_dir().join(format!("{}.js", self.name))
    }

    /// Both declared outputs, data payload first.
    pub fn outputs(&self) -> [PathBuf; 2] {
        [self.data_file(), self.loader_file()]
    }
}

/// Mapping from package name to the names it requires.
///
/// Ordered so that iteration, and the manifest written from it, are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyMap {
    deps: BTreeMap<String, Vec<String>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        DependencyMap::default()
    }

    /// Build the map from a set of descriptors, rejecting duplicate names.
    pub fn from_descriptors(descriptors: &[PackageDescriptor]) -> Result<Self, CrossBuildError> {
        let mut map = DependencyMap::new();
        let mut roots: BTreeMap<&str, &Path> = BTreeMap::new();

        for desc in descriptors {
            if let Some(first) = roots.insert(desc.name.as_str(), desc.root.as_path()) {
                return Err(CrossBuildError::DuplicatePackage {
                    package: desc.name.clone(),
                    first: first.to_path_buf(),
                    second: desc.root.clone(),
                });
            }
            map.insert(desc.name.clone(), desc.dependencies.clone());
        }

        Ok(map)
    }

    pub fn insert(&mut self, name: impl Into<String>, deps: Vec<String>) {
        self.deps.insert(name.into(), deps);
    }

    /// Dependencies of `name`, if the package is known.
    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.deps.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.deps.contains_key(name)
    }

    /// Package names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.deps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Check that every dependency names a known package.
    pub fn validate(&self) -> Result<(), CrossBuildError> {
        for (name, deps) in &self.deps {
            if let Some(missing) = deps.iter().find(|d| !self.deps.contains_key(*d)) {
                return Err(CrossBuildError::UnknownDependency {
                    package: name.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }
}
