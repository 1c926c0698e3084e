//! Capture and replay of native builds.
//!
//! A native build runs once through the toolchain shims ([`shim`]) under
//! the [`NativeBuildDriver`], which leaves a build log behind. The native
//! artifacts are scrubbed ([`scrub`]) and the log is replayed against the
//! target toolchain by the [`ReplayEngine`], using the pure rules in
//! [`rewrite`].

pub mod native;
pub mod replay;
pub mod rewrite;
pub mod scrub;
pub mod shim;
pub mod toolchain;

pub use native::NativeBuildDriver;
pub use replay::{ReplayEngine, ReplaySummary};
pub use rewrite::{ProbeFilter, RewriteConfig, RewriteRules};
pub use scrub::scrub_native_artifacts;
pub use shim::{Role, ShimEnv, ShimInstaller};
pub use toolchain::{CommandSpec, TargetTool, TargetToolchain};
