//! Core data types.

pub mod errors;
pub mod invocation;
pub mod package;

pub use errors::CrossBuildError;
pub use invocation::{BuildLog, Invocation, Tool};
pub use package::{BuildRecipe, DependencyMap, PackageDescriptor};
