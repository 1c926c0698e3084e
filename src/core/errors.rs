//! Error taxonomy for capture, replay and scheduling.

use std::path::PathBuf;

use thiserror::Error;

/// A fatal error raised while cross-building one or more packages.
///
/// Every variant is fatal to the enclosing package build and, transitively,
/// to everything depending on it. Nothing here is retried.
#[derive(Debug, Error)]
pub enum CrossBuildError {
    #[error("native build `{command}` failed with {}", describe_code(.code))]
    NativeBuildFailed { command: String, code: Option<i32> },

    #[error("replayed command `{command}` failed with {}", describe_code(.code))]
    ReplayFailed { command: String, code: Option<i32> },

    #[error("packaging command `{command}` for `{package}` failed with {}", describe_code(.code))]
    PackagingFailed {
        package: String,
        command: String,
        code: Option<i32>,
    },

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("package `{package}` depends on unknown package `{dependency}`")]
    UnknownDependency { package: String, dependency: String },

    #[error(
        "package `{package}` is declared twice ({} and {})",
        .first.display(),
        .second.display()
    )]
    DuplicatePackage {
        package: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("package `{package}` did not produce {}", .path.display())]
    MissingOutput { package: String, path: PathBuf },

    #[error("invalid record on line {line} of {}: {message}", .path.display())]
    InvalidLogRecord {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl CrossBuildError {
    /// Process exit code to report for this error.
    ///
    /// Subprocess failures propagate the child's own exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            CrossBuildError::NativeBuildFailed { code, .. }
            | CrossBuildError::ReplayFailed { code, .. }
            | CrossBuildError::PackagingFailed { code, .. } => match code {
                Some(0) | None => 1,
                Some(c) => *c,
            },
            _ => 1,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

/// Find the exit code carried by an error chain, defaulting to 1.
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<CrossBuildError>())
        .map(CrossBuildError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprocess_failure_propagates_code() {
        let err = CrossBuildError::ReplayFailed {
            command: "emcc -c foo.c".to_string(),
            code: Some(42),
        };
        assert_eq!(err.exit_code(), 42);

        let err = CrossBuildError::NativeBuildFailed {
            command: "make".to_string(),
            code: None,
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_through_context() {
        let err = anyhow::Error::new(CrossBuildError::NativeBuildFailed {
            command: "make".to_string(),
            code: Some(2),
        })
        .context("failed to build `zlib`");

        assert_eq!(exit_code_of(&err), 2);
        assert_eq!(exit_code_of(&anyhow::anyhow!("plain")), 1);
    }

    #[test]
    fn test_cycle_message() {
        let err = CrossBuildError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }
}
