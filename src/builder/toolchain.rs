//! The target (cross) toolchain that recorded invocations are replayed against.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::util::process::{find_executable, ProcessBuilder};

/// Role of a target toolchain executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTool {
    /// C compiler and linker driver
    Cc,
    /// C++ compiler and linker driver
    Cxx,
    /// Static archiver
    Ar,
}

/// Paths of the target toolchain executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetToolchain {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
}

impl Default for TargetToolchain {
    fn default() -> Self {
        TargetToolchain {
            cc: PathBuf::from("emcc"),
            cxx: PathBuf::from("em++"),
            ar: PathBuf::from("emar"),
        }
    }
}

impl TargetToolchain {
    /// Executable for a tool role.
    pub fn path(&self, tool: TargetTool) -> &Path {
        match tool {
            TargetTool::Cc => &self.cc,
            TargetTool::Cxx => &self.cxx,
            TargetTool::Ar => &self.ar,
        }
    }

    /// Tools that cannot be found, for diagnostics before a replay.
    pub fn missing(&self) -> Vec<&Path> {
        [&self.cc, &self.cxx, &self.ar]
            .into_iter()
            .filter(|p| {
                if p.components().count() > 1 {
                    !p.exists()
                } else {
                    find_executable(&p.to_string_lossy()).is_none()
                }
            })
            .map(PathBuf::as_path)
            .collect()
    }
}

/// A command to execute: program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run (e.g., "emcc")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// The full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.display().to_string()];
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// A process builder for this command.
    pub fn to_process(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.program).args(&self.args)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_toolchain_is_emscripten() {
        let tc = TargetToolchain::default();
        assert_eq!(tc.path(TargetTool::Cc), Path::new("emcc"));
        assert_eq!(tc.path(TargetTool::Cxx), Path::new("em++"));
        assert_eq!(tc.path(TargetTool::Ar), Path::new("emar"));
    }

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("emar").args(["rcs", "libz.a", "adler32.bc"]);
        assert_eq!(spec.to_string(), "emar rcs libz.a adler32.bc");
        assert_eq!(spec.argv().len(), 4);
    }

    #[test]
    fn test_missing_reports_absent_paths() {
        let tc = TargetToolchain {
            cc: PathBuf::from("/nonexistent/bin/emcc"),
            cxx: PathBuf::from("recast-no-such-tool++"),
            ar: PathBuf::from("/nonexistent/bin/emar"),
        };
        assert_eq!(tc.missing().len(), 3);
    }
}
