//! Subprocess execution utilities.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{bail, Context, Result};

/// Builder for subprocess execution.
///
/// Children inherit stdio; the wrapped builds and compilers write straight
/// to the terminal.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<OsString>,
    env: BTreeMap<String, OsString>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Create a builder from an argument vector whose first element is the program.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("cannot run an empty command");
        };
        Ok(ProcessBuilder::new(program).args(args))
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_os_string()));
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_os_string());
        self
    }

    /// Set several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<OsStr>,
    {
        for (k, v) in vars {
            self = self.env(k, v);
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Get an explicitly set environment variable.
    pub fn get_env(&self, key: &str) -> Option<&OsStr> {
        self.env.get(key).map(OsString::as_os_str)
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute and return status only.
    pub fn status(&self) -> Result<ExitStatus> {
        tracing::debug!("running `{}`", self.display_command());
        let mut cmd = self.build_command();
        let status = cmd
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))?;
        Ok(status)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Find an executable in an explicit search path.
pub fn find_executable_in(name: &str, path: &OsStr, cwd: &Path) -> Option<PathBuf> {
    which::which_in(name, Some(path), cwd).ok()
}

/// Remove every occurrence of `dir` from a `PATH`-style list.
pub fn strip_path_entry(path: &OsStr, dir: &Path) -> OsString {
    let kept: Vec<PathBuf> = std::env::split_paths(path)
        .filter(|entry| entry != dir)
        .collect();
    // Entries came out of split_paths, so they cannot contain the separator.
    std::env::join_paths(kept).unwrap_or_default()
}

/// Put `dir` in front of a `PATH`-style list.
pub fn prepend_path_entry(path: Option<&OsStr>, dir: &Path) -> Result<OsString> {
    let mut entries = vec![dir.to_path_buf()];
    if let Some(path) = path {
        entries.extend(std::env::split_paths(path).filter(|entry| entry != dir));
    }
    std::env::join_paths(entries)
        .with_context(|| format!("cannot add {} to PATH", dir.display()))
}

/// Exit code to report for a finished child.
///
/// A child killed by a signal reports `128 + signal`, as shells do.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("emcc").args(["-O3", "-c", "foo.c", "-o", "foo.bc"]);

        assert_eq!(pb.display_command(), "emcc -O3 -c foo.c -o foo.bc");
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["em++".to_string(), "-c".to_string(), "a.cpp".to_string()];
        let pb = ProcessBuilder::from_argv(&argv).unwrap();
        assert_eq!(pb.get_program(), Path::new("em++"));
        assert_eq!(pb.get_args(), [OsString::from("-c"), OsString::from("a.cpp")]);

        assert!(ProcessBuilder::from_argv(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_status_reports_exit_code() {
        let status = ProcessBuilder::new("sh")
            .args(["-c", "exit 3"])
            .status()
            .unwrap();
        assert_eq!(exit_code(&status), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_args_pass_through() {
        use std::os::unix::ffi::OsStrExt;

        let name = OsStr::from_bytes(b"caf\xe9.c");
        let pb = ProcessBuilder::new("sh").args([OsStr::new("-c"), OsStr::new("exit 0")]).arg(name);
        assert_eq!(pb.get_args()[2].as_bytes(), b"caf\xe9.c");
        assert_eq!(pb.display_command(), "sh -c exit 0 caf\u{FFFD}.c");
    }

    #[cfg(unix)]
    #[test]
    fn test_path_entries() {
        let path = OsString::from("/shims:/usr/bin:/shims:/bin");
        let stripped = strip_path_entry(&path, Path::new("/shims"));
        assert_eq!(stripped, OsString::from("/usr/bin:/bin"));

        let prepended = prepend_path_entry(Some(&stripped), Path::new("/shims")).unwrap();
        assert_eq!(prepended, OsString::from("/shims:/usr/bin:/bin"));

        let alone = prepend_path_entry(None, Path::new("/shims")).unwrap();
        assert_eq!(alone, OsString::from("/shims"));
    }
}
