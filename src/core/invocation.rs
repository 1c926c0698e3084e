//! Recorded toolchain invocations and the build log that holds them.
//!
//! Each line of a build log is one JSON array: the tool's basename followed
//! by the exact arguments it received, e.g.
//!
//! ```text
//! ["cc","-I/usr/include","-c","foo.c","-o","foo.o"]
//! ["cc","-shared","foo.o","-o","foo.so"]
//! ```
//!
//! Line order is execution order.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::errors::CrossBuildError;
use crate::util::fs::remove_file_if_exists;

/// File name of the build log inside a package's working directory.
pub const BUILD_LOG_NAME: &str = "build.log";

/// A native toolchain executable that the shims stand in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Cc,
    Cxx,
    Ld,
    Ar,
    Gcc,
}

impl Tool {
    /// Every tool a shim is installed for.
    pub const ALL: [Tool; 5] = [Tool::Cc, Tool::Cxx, Tool::Ld, Tool::Ar, Tool::Gcc];

    /// The executable name of this tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Cc => "cc",
            Tool::Cxx => "c++",
            Tool::Ld => "ld",
            Tool::Ar => "ar",
            Tool::Gcc => "gcc",
        }
    }

    /// Environment variable that build systems consult to find this tool.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Tool::Cc => Some("CC"),
            Tool::Cxx => Some("CXX"),
            Tool::Ld => Some("LD"),
            Tool::Ar => Some("AR"),
            Tool::Gcc => None,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("`{}` is not a captured tool", s))
    }
}

/// One execution of a toolchain executable during the native build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    /// Create a record for `program` invoked with `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Basename of the tool that was invoked.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The captured tool, if the program is one of the shimmed names.
    pub fn tool(&self) -> Option<Tool> {
        self.program.parse().ok()
    }

    /// Arguments, excluding the program name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Serialize as a single log line (no trailing newline).
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize invocation record")
    }
}

impl From<Invocation> for Vec<String> {
    fn from(inv: Invocation) -> Self {
        let mut out = Vec::with_capacity(inv.args.len() + 1);
        out.push(inv.program);
        out.extend(inv.args);
        out
    }
}

impl TryFrom<Vec<String>> for Invocation {
    type Error = String;

    fn try_from(mut value: Vec<String>) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err("empty invocation record".to_string());
        }
        let program = value.remove(0);
        Ok(Invocation {
            program,
            args: value,
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// The build log of one package.
#[derive(Debug, Clone)]
pub struct BuildLog {
    path: PathBuf,
}

impl BuildLog {
    /// A log stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BuildLog { path: path.into() }
    }

    /// The conventional log inside a package working directory.
    pub fn in_dir(dir: &Path) -> Self {
        BuildLog::new(dir.join(BUILD_LOG_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the log file is present.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Append one record.
    ///
    /// The whole line goes out in a single `write` on an append-mode handle,
    /// so shims running concurrently under a parallel build do not
    /// interleave partial lines.
    pub fn append(&self, invocation: &Invocation) -> Result<()> {
        let mut line = invocation.to_line()?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open build log: {}", self.path.display()))?;

        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to build log: {}", self.path.display()))
    }

    /// Read every record in order. An absent log reads as empty.
    pub fn read(&self) -> Result<Vec<Invocation>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read build log: {}", self.path.display()))?;

        let mut records = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Invocation =
                serde_json::from_str(line).map_err(|e| CrossBuildError::InvalidLogRecord {
                    path: self.path.clone(),
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Delete the log if present.
    pub fn remove(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tool_names() {
        assert_eq!("c++".parse::<Tool>(), Ok(Tool::Cxx));
        assert_eq!("gcc".parse::<Tool>(), Ok(Tool::Gcc));
        assert!("clang".parse::<Tool>().is_err());
        assert_eq!(Tool::Cxx.env_var(), Some("CXX"));
        assert_eq!(Tool::Gcc.env_var(), None);
    }

    #[test]
    fn test_invocation_line_format() {
        let inv = Invocation::new("cc", ["-c", "foo.c", "-o", "foo.o"]);
        assert_eq!(
            inv.to_line().unwrap(),
            r#"["cc","-c","foo.c","-o","foo.o"]"#
        );
        assert_eq!(inv.to_string(), "cc -c foo.c -o foo.o");
        assert_eq!(inv.tool(), Some(Tool::Cc));
    }

    #[test]
    fn test_empty_record_rejected() {
        let err = serde_json::from_str::<Invocation>("[]").unwrap_err();
        assert!(err.to_string().contains("empty invocation record"));
    }

    #[test]
    fn test_log_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let log = BuildLog::in_dir(tmp.path());

        log.append(&Invocation::new("cc", ["-c", "a.c"])).unwrap();
        log.append(&Invocation::new("ar", ["rcs", "liba.a", "a.o"]))
            .unwrap();
        log.append(&Invocation::new("cc", ["-shared", "a.o", "-o", "a.so"]))
            .unwrap();

        let records = log.read().unwrap();
        let programs: Vec<_> = records.iter().map(|r| r.program()).collect();
        assert_eq!(programs, ["cc", "ar", "cc"]);
        assert_eq!(records[1].args(), ["rcs", "liba.a", "a.o"]);
    }

    #[test]
    fn test_absent_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let log = BuildLog::in_dir(tmp.path());
        assert!(!log.exists());
        assert!(log.read().unwrap().is_empty());
        log.remove().unwrap();
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let tmp = TempDir::new().unwrap();
        let log = BuildLog::in_dir(tmp.path());
        std::fs::write(log.path(), "[\"cc\",\"-c\"]\n\nnot json\n").unwrap();

        let err = log.read().unwrap_err();
        match err.downcast_ref::<CrossBuildError>() {
            Some(CrossBuildError::InvalidLogRecord { line, .. }) => assert_eq!(*line, 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
