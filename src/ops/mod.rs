//! High-level operations.
//!
//! This module contains the implementation of recast commands.

pub mod build_all;
pub mod build_order;
pub mod cross_build;

pub use build_all::{
    build_all, BuildAllOptions, BuildAllReport, BuildMarker, CrossPackageBuilder, PackageBuilder,
};
pub use build_order::build_order;
pub use cross_build::{cross_build, CrossBuildOptions, CrossBuildResult};
