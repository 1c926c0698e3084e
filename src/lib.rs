//! recast - capture native builds and replay them with a cross toolchain
//!
//! A package's own build runs once natively with its compiler, linker and
//! archiver calls recorded by shims. The recording is then replayed with
//! every call rewritten for the target toolchain, so packages cross-compile
//! without any change to their build descriptions. A scheduler drives this
//! over a directory of packages in dependency order.

pub mod builder;
pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

pub use core::{BuildLog, CrossBuildError, DependencyMap, Invocation, PackageDescriptor, Tool};
pub use util::context::GlobalContext;
