//! Rewrite rules turning recorded native invocations into target invocations.
//!
//! Everything here is a pure function of the recorded [`Invocation`] and the
//! static [`RewriteConfig`]: no filesystem access, no environment lookups.
//! Replaying the same log with the same configuration always yields the same
//! argument vectors.
//!
//! Per record the rules are:
//!
//! 1. records touching a native-build probe (see [`ProbeFilter`]) are dropped
//! 2. `ar` maps to the target archiver, `c++` (or any C++ source argument)
//!    to the target C++ compiler, everything else to the target C compiler
//! 3. shared links get the configured link flags, compiles the compile flags
//! 4. each argument is rewritten: system `-I`/`-L` dropped, host Python
//!    headers rebased onto the target Python, threaded library tags
//!    normalized, `.o` renamed to `.bc`, a shared link's `.so` output renamed
//!    to `.wasm`

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::{CommandSpec, TargetTool, TargetToolchain};
use crate::core::invocation::{Invocation, Tool};

/// Extension native objects are written with.
pub const NATIVE_OBJECT_EXT: &str = ".o";
/// Extension of target intermediate objects.
pub const TARGET_OBJECT_EXT: &str = ".bc";
/// Extension of native shared objects.
pub const NATIVE_SHARED_EXT: &str = ".so";
/// Extension the target linker writes shared objects with.
pub const TARGET_SHARED_EXT: &str = ".wasm";

/// Source extensions that force the C++ compiler.
const CXX_SOURCE_EXTS: &[&str] = &[".cpp", ".cxx", ".cc"];

/// An argument pattern identifying a native-build probe.
///
/// Probes are configuration checks and self-tests the native build runs
/// (`_configtest.c`, scratch files under `/tmp`, `-print-multiarch`) that
/// have no cross-compiled counterpart. The defaults match distutils and
/// numpy builds; other ecosystems configure their own list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "lowercase")]
pub enum ProbeFilter {
    /// Argument contains the pattern
    Contains(String),
    /// Argument starts with the pattern
    Prefix(String),
    /// Argument equals the pattern
    Exact(String),
    /// Argument matches the regular expression
    Regex(String),
}

impl ProbeFilter {
    /// The probes skipped when no filter list is configured.
    pub fn defaults() -> Vec<ProbeFilter> {
        vec![
            ProbeFilter::Contains("/file.c".to_string()),
            ProbeFilter::Contains("_configtest".to_string()),
            ProbeFilter::Regex(r"^/tmp/.*/source\.[bco]+$".to_string()),
            ProbeFilter::Exact("-print-multiarch".to_string()),
        ]
    }

    fn compile(&self) -> Result<CompiledFilter> {
        Ok(match self {
            ProbeFilter::Contains(p) => CompiledFilter::Contains(p.clone()),
            ProbeFilter::Prefix(p) => CompiledFilter::Prefix(p.clone()),
            ProbeFilter::Exact(p) => CompiledFilter::Exact(p.clone()),
            ProbeFilter::Regex(p) => CompiledFilter::Regex(
                Regex::new(p).with_context(|| format!("invalid probe filter regex `{}`", p))?,
            ),
        })
    }
}

#[derive(Debug)]
enum CompiledFilter {
    Contains(String),
    Prefix(String),
    Exact(String),
    Regex(Regex),
}

impl CompiledFilter {
    fn matches(&self, arg: &str) -> bool {
        match self {
            CompiledFilter::Contains(p) => arg.contains(p.as_str()),
            CompiledFilter::Prefix(p) => arg.starts_with(p.as_str()),
            CompiledFilter::Exact(p) => arg == p.as_str(),
            CompiledFilter::Regex(re) => re.is_match(arg),
        }
    }
}

/// Static configuration the rewrite rules are a function of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Flags appended to every non-archiver compile
    pub cflags: Vec<String>,
    /// Flags appended to every shared link
    pub ldflags: Vec<String>,
    /// Host Python installation tree
    pub host: PathBuf,
    /// Target Python installation tree
    pub target: PathBuf,
    /// Include/library directories the target toolchain replaces
    pub system_prefixes: Vec<String>,
    /// Path component marking the package-installation subtree
    pub site_packages: String,
    pub filters: Vec<ProbeFilter>,
    /// Regexes for platform tags stripped from produced shared objects
    pub platform_tags: Vec<String>,
}

impl RewriteConfig {
    /// Configuration with default prefixes, filters and platform tags.
    pub fn new(host: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        RewriteConfig {
            cflags: Vec::new(),
            ldflags: Vec::new(),
            host: host.into(),
            target: target.into(),
            system_prefixes: vec!["/usr".to_string()],
            site_packages: "site-packages".to_string(),
            filters: ProbeFilter::defaults(),
            platform_tags: vec![
                r"\.(cpython|pypy)[-0-9a-z_]*$".to_string(),
                r"\.abi3$".to_string(),
            ],
        }
    }

    /// Replace the compile flags with a whitespace-separated flag string.
    pub fn with_cflags(mut self, flags: &str) -> Self {
        self.cflags = split_flags(flags);
        self
    }

    /// Replace the link flags with a whitespace-separated flag string.
    pub fn with_ldflags(mut self, flags: &str) -> Self {
        self.ldflags = split_flags(flags);
        self
    }

    /// Append package-specific flags to the global ones.
    pub fn with_extra_flags(mut self, cflags: &str, ldflags: &str) -> Self {
        self.cflags.extend(split_flags(cflags));
        self.ldflags.extend(split_flags(ldflags));
        self
    }
}

fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_string).collect()
}

/// What a recorded invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Compile (or a non-shared link)
    Compile,
    /// Link producing a shared object
    SharedLink,
    /// Static archive creation
    Archive,
}

/// A record rewritten for the target toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub command: CommandSpec,
    pub mode: InvocationMode,
    /// Shared object written by a shared link, with the target extension
    pub output: Option<PathBuf>,
}

/// Compiled rewrite rules.
#[derive(Debug)]
pub struct RewriteRules {
    config: RewriteConfig,
    toolchain: TargetToolchain,
    host: PathBuf,
    target: PathBuf,
    filters: Vec<CompiledFilter>,
    platform_tags: Vec<Regex>,
    threaded_tag: Regex,
}

impl RewriteRules {
    /// Compile the rules. Fails on an invalid regular expression.
    pub fn new(config: RewriteConfig, toolchain: TargetToolchain) -> Result<Self> {
        let filters = config
            .filters
            .iter()
            .map(ProbeFilter::compile)
            .collect::<Result<Vec<_>>>()?;
        let platform_tags = config
            .platform_tags
            .iter()
            .map(|p| {
                Regex::new(p).with_context(|| format!("invalid platform tag regex `{}`", p))
            })
            .collect::<Result<Vec<_>>>()?;
        let threaded_tag = Regex::new(r"(/|-l)python([0-9]+\.[0-9]+)m\b")
            .context("invalid threaded tag regex")?;

        Ok(RewriteRules {
            host: normalize(&config.host),
            target: normalize(&config.target),
            config,
            toolchain,
            filters,
            platform_tags,
            threaded_tag,
        })
    }

    /// Whether a record is a native-build probe that must not be replayed.
    pub fn is_probe(&self, record: &Invocation) -> bool {
        record
            .args()
            .iter()
            .any(|arg| self.filters.iter().any(|f| f.matches(arg)))
    }

    /// Records that survive probe filtering, in order.
    pub fn filter<'a>(&self, records: &'a [Invocation]) -> Vec<&'a Invocation> {
        records.iter().filter(|r| !self.is_probe(r)).collect()
    }

    /// Target tool for a record.
    pub fn select_tool(record: &Invocation) -> TargetTool {
        match record.tool() {
            Some(Tool::Ar) => TargetTool::Ar,
            Some(Tool::Cxx) => TargetTool::Cxx,
            _ if record
                .args()
                .iter()
                .any(|a| CXX_SOURCE_EXTS.iter().any(|ext| a.ends_with(ext))) =>
            {
                TargetTool::Cxx
            }
            _ => TargetTool::Cc,
        }
    }

    /// Classify a record.
    pub fn mode(record: &Invocation) -> InvocationMode {
        if record.tool() == Some(Tool::Ar) {
            InvocationMode::Archive
        } else if record.args().iter().any(|a| a == "-shared") {
            InvocationMode::SharedLink
        } else {
            InvocationMode::Compile
        }
    }

    /// Rewrite a record, or `None` if it is a probe.
    pub fn rewrite(&self, record: &Invocation) -> Option<Rewritten> {
        if self.is_probe(record) {
            return None;
        }

        let tool = Self::select_tool(record);
        let mode = Self::mode(record);

        let mut command = CommandSpec::new(self.toolchain.path(tool));
        command = match mode {
            InvocationMode::SharedLink => command.args(self.config.ldflags.iter().cloned()),
            InvocationMode::Compile => command.args(self.config.cflags.iter().cloned()),
            InvocationMode::Archive => command,
        };

        let mut output = None;
        let mut args = record.args().iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                // Split forms: the directory is the next argument.
                "-I" | "-L" => {
                    let Some(dir) = args.next() else {
                        command = command.arg(arg.clone());
                        continue;
                    };
                    if let Some(dir) = self.rewrite_dir(arg, dir) {
                        command = command.arg(arg.clone()).arg(dir);
                    }
                }
                "-o" => {
                    command = command.arg("-o");
                    if let Some(path) = args.next() {
                        let path = self.rewrite_output(path, mode, &mut output);
                        command = command.arg(path);
                    }
                }
                _ if arg.starts_with("-I") || arg.starts_with("-L") => {
                    let (flag, dir) = arg.split_at(2);
                    if let Some(dir) = self.rewrite_dir(flag, dir) {
                        command = command.arg(format!("{}{}", flag, dir));
                    }
                }
                _ if arg.starts_with("-o") => {
                    let path = self.rewrite_output(&arg[2..], mode, &mut output);
                    command = command.arg(format!("-o{}", path));
                }
                _ => command = command.arg(self.rewrite_plain(arg)),
            }
        }

        Some(Rewritten {
            command,
            mode,
            output,
        })
    }

    /// Rewrite the directory of an `-I`/`-L` argument; `None` drops it.
    fn rewrite_dir(&self, flag: &str, dir: &str) -> Option<String> {
        let path = normalize(Path::new(dir));
        if self.is_system_dir(&path) {
            return None;
        }

        if flag == "-I" && path.starts_with(&self.host) && !self.is_site_packages(&path) {
            let rel = path.strip_prefix(&self.host).unwrap_or(Path::new(""));
            let rebased = if rel.as_os_str().is_empty() {
                self.target.clone()
            } else {
                self.target.join(rel)
            };
            return Some(self.normalize_threaded(&rebased.to_string_lossy()));
        }

        Some(self.rewrite_plain(dir))
    }

    fn rewrite_output(
        &self,
        path: &str,
        mode: InvocationMode,
        output: &mut Option<PathBuf>,
    ) -> String {
        let path = self.normalize_threaded(path);
        if mode == InvocationMode::SharedLink {
            if let Some(stem) = path.strip_suffix(NATIVE_SHARED_EXT) {
                let renamed = format!("{}{}", stem, TARGET_SHARED_EXT);
                *output = Some(PathBuf::from(&renamed));
                return renamed;
            }
        }
        swap_object_ext(&path)
    }

    fn rewrite_plain(&self, arg: &str) -> String {
        swap_object_ext(&self.normalize_threaded(arg))
    }

    fn normalize_threaded(&self, arg: &str) -> String {
        self.threaded_tag.replace_all(arg, "${1}python${2}").into_owned()
    }

    fn is_system_dir(&self, path: &Path) -> bool {
        self.config
            .system_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    fn is_site_packages(&self, path: &Path) -> bool {
        path.components()
            .any(|c| c.as_os_str() == self.config.site_packages.as_str())
    }

    /// Final name of a shared object produced by a replayed link.
    ///
    /// `.wasm` goes back to `.so` and native platform tags are stripped, so
    /// `bar.cpython-37m-x86_64-linux-gnu.wasm` becomes `bar.so`.
    pub fn final_shared_name(&self, produced: &Path) -> PathBuf {
        let file_name = produced
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut stem = file_name
            .strip_suffix(TARGET_SHARED_EXT)
            .unwrap_or(&file_name)
            .to_string();

        loop {
            let before = stem.len();
            for tag in &self.platform_tags {
                stem = tag.replace(&stem, "").into_owned();
            }
            if stem.len() == before || stem.is_empty() {
                break;
            }
        }

        produced.with_file_name(format!("{}{}", stem, NATIVE_SHARED_EXT))
    }
}

fn swap_object_ext(arg: &str) -> String {
    match arg.strip_suffix(NATIVE_OBJECT_EXT) {
        Some(stem) if !stem.is_empty() => format!("{}{}", stem, TARGET_OBJECT_EXT),
        _ => arg.to_string(),
    }
}

/// Lexically normalize a path: drop `.` and resolve `..` without touching
/// the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RewriteRules {
        RewriteRules::new(RewriteConfig::new("/h", "/t"), TargetToolchain::default()).unwrap()
    }

    fn rules_with_ldflags(ldflags: &str) -> RewriteRules {
        RewriteRules::new(
            RewriteConfig::new("/h", "/t").with_ldflags(ldflags),
            TargetToolchain::default(),
        )
        .unwrap()
    }

    fn inv(argv: &[&str]) -> Invocation {
        Invocation::new(argv[0], argv[1..].iter().copied())
    }

    fn argv(rules: &RewriteRules, argv: &[&str]) -> Vec<String> {
        rules.rewrite(&inv(argv)).unwrap().command.argv()
    }

    #[test]
    fn test_compile_scenario() {
        let out = argv(
            &rules(),
            &["cc", "-I/h/include", "-c", "foo.c", "-o", "foo.o"],
        );
        assert_eq!(out, ["emcc", "-I/t/include", "-c", "foo.c", "-o", "foo.bc"]);
    }

    #[test]
    fn test_shared_link_scenario() {
        let rules = rules_with_ldflags("-O3 -s SIDE_MODULE=1");
        let rewritten = rules
            .rewrite(&inv(&["cc", "-shared", "bar.o", "-o", "bar.cpython-37m.so"]))
            .unwrap();

        assert_eq!(rewritten.mode, InvocationMode::SharedLink);
        assert_eq!(
            rewritten.command.argv(),
            [
                "emcc",
                "-O3",
                "-s",
                "SIDE_MODULE=1",
                "-shared",
                "bar.bc",
                "-o",
                "bar.cpython-37m.wasm"
            ]
        );
        let produced = rewritten.output.unwrap();
        assert_eq!(produced, PathBuf::from("bar.cpython-37m.wasm"));
        assert_eq!(rules.final_shared_name(&produced), PathBuf::from("bar.so"));
    }

    #[test]
    fn test_final_shared_name_strips_platform_tags() {
        let rules = rules();
        for (produced, expected) in [
            ("build/lib/bar.cpython-37m-x86_64-linux-gnu.wasm", "build/lib/bar.so"),
            ("foo.abi3.wasm", "foo.so"),
            ("_pypy.pypy36-pp73.wasm", "_pypy.so"),
            ("libz.wasm", "libz.so"),
        ] {
            assert_eq!(
                rules.final_shared_name(Path::new(produced)),
                PathBuf::from(expected),
                "{}",
                produced
            );
        }
    }

    #[test]
    fn test_compile_flags_only_for_compiles() {
        let rules = RewriteRules::new(
            RewriteConfig::new("/h", "/t")
                .with_cflags("-O2 -fPIC")
                .with_ldflags("-s SIDE_MODULE=1"),
            TargetToolchain::default(),
        )
        .unwrap();

        assert_eq!(
            argv(&rules, &["gcc", "-c", "a.c"]),
            ["emcc", "-O2", "-fPIC", "-c", "a.c"]
        );
        assert_eq!(
            argv(&rules, &["ar", "rcs", "liba.a", "a.o"]),
            ["emar", "rcs", "liba.a", "a.bc"]
        );
        assert_eq!(
            argv(&rules, &["cc", "-shared", "a.o", "-o", "a.so"]),
            ["emcc", "-s", "SIDE_MODULE=1", "-shared", "a.bc", "-o", "a.wasm"]
        );
    }

    #[test]
    fn test_tool_selection() {
        assert_eq!(RewriteRules::select_tool(&inv(&["ar", "rcs", "x.a"])), TargetTool::Ar);
        assert_eq!(RewriteRules::select_tool(&inv(&["c++", "-c", "x.c"])), TargetTool::Cxx);
        assert_eq!(RewriteRules::select_tool(&inv(&["ld", "x.o"])), TargetTool::Cc);
        assert_eq!(
            RewriteRules::select_tool(&inv(&["cc", "-c", "src/x.cpp"])),
            TargetTool::Cxx
        );
        assert_eq!(
            RewriteRules::select_tool(&inv(&["gcc", "-c", "x.c"])),
            TargetTool::Cc
        );
    }

    #[test]
    fn test_system_dirs_dropped() {
        let out = argv(
            &rules(),
            &[
                "cc",
                "-I/usr/include/python3.7m",
                "-I",
                "/usr/local/include",
                "-Iinclude",
                "-L/usr/lib",
                "-Lbuild",
                "-c",
                "a.c",
            ],
        );
        assert_eq!(out, ["emcc", "-Iinclude", "-Lbuild", "-c", "a.c"]);
    }

    #[test]
    fn test_system_prefix_is_component_wise() {
        let out = argv(&rules(), &["cc", "-I/usrlocal/include", "-c", "a.c"]);
        assert_eq!(out, ["emcc", "-I/usrlocal/include", "-c", "a.c"]);
    }

    #[test]
    fn test_host_headers_rebased() {
        let out = argv(
            &rules(),
            &[
                "cc",
                "-I/h/include/python3.7m",
                "-I",
                "/h/lib/../include",
                "-I/h/lib/python3.7/site-packages/numpy/core/include",
                "-c",
                "a.c",
            ],
        );
        assert_eq!(
            out,
            [
                "emcc",
                "-I/t/include/python3.7",
                "-I",
                "/t/include",
                "-I/h/lib/python3.7/site-packages/numpy/core/include",
                "-c",
                "a.c"
            ]
        );
    }

    #[test]
    fn test_host_prefix_is_component_wise() {
        let out = argv(&rules(), &["cc", "-I/home/include", "-c", "a.c"]);
        assert_eq!(out, ["emcc", "-I/home/include", "-c", "a.c"]);
    }

    #[test]
    fn test_threaded_tag_normalized() {
        let out = argv(
            &rules(),
            &["cc", "-shared", "a.o", "-L.", "-lpython3.7m", "-o", "a.so"],
        );
        assert!(out.contains(&"-lpython3.7".to_string()));

        let out = argv(&rules(), &["cc", "-c", "build/python3.7m/x.c"]);
        assert_eq!(out, ["emcc", "-c", "build/python3.7/x.c"]);
    }

    #[test]
    fn test_object_outputs_become_bitcode() {
        for record in [
            &["cc", "-c", "foo.c", "-o", "build/foo.o"][..],
            &["cc", "-c", "foo.c", "-obuild/foo.o"][..],
            &["c++", "-c", "foo.cpp", "-o", "foo.o"][..],
        ] {
            let out = argv(&rules(), record);
            let last = out.last().unwrap();
            assert!(last.ends_with(".bc"), "{:?}", out);
            assert!(!out.iter().any(|a| a.ends_with(".o")), "{:?}", out);
        }
    }

    #[test]
    fn test_compile_so_output_untouched() {
        let rewritten = rules()
            .rewrite(&inv(&["cc", "a.o", "-o", "a.so"]))
            .unwrap();
        assert_eq!(rewritten.mode, InvocationMode::Compile);
        assert!(rewritten.output.is_none());
        assert_eq!(rewritten.command.argv(), ["emcc", "a.bc", "-o", "a.so"]);
    }

    #[test]
    fn test_probes_skipped() {
        let rules = rules();
        for record in [
            &["cc", "-c", "_configtest.c", "-o", "_configtest.o"][..],
            &["cc", "-c", "/tmp/tmpab12/source.c", "-o", "/tmp/tmpab12/source.o"][..],
            &["gcc", "-print-multiarch"][..],
            &["cc", "-c", "/tmp/x/file.c"][..],
        ] {
            assert!(rules.rewrite(&inv(record)).is_none(), "{:?}", record);
        }
        assert!(rules.rewrite(&inv(&["cc", "-c", "/tmp/build/a.c"])).is_some());
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let rules = rules();
        let log = vec![
            inv(&["cc", "-c", "a.c"]),
            inv(&["cc", "-c", "_configtest.c"]),
            inv(&["ar", "rcs", "liba.a", "a.o"]),
            inv(&["gcc", "-print-multiarch"]),
        ];

        let once: Vec<Invocation> = rules.filter(&log).into_iter().cloned().collect();
        let twice: Vec<Invocation> = rules.filter(&once).into_iter().cloned().collect();
        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_one_rewrite_per_record_in_order() {
        let rules = rules();
        let log = vec![
            inv(&["cc", "-c", "a.c", "-o", "a.o"]),
            inv(&["cc", "-c", "b.c", "-o", "b.o"]),
            inv(&["ar", "rcs", "libab.a", "a.o", "b.o"]),
            inv(&["cc", "-shared", "a.o", "b.o", "-o", "ab.so"]),
        ];

        let rewritten: Vec<_> = log.iter().filter_map(|r| rules.rewrite(r)).collect();
        assert_eq!(rewritten.len(), log.len());
        let programs: Vec<_> = rewritten
            .iter()
            .map(|r| r.command.program.display().to_string())
            .collect();
        assert_eq!(programs, ["emcc", "emcc", "emar", "emcc"]);
        assert_eq!(rewritten[1].command.args.last().unwrap(), "b.bc");
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let record = inv(&[
            "cc",
            "-shared",
            "-I/h/include/python3.7m",
            "x.o",
            "-o",
            "x.cpython-37m-x86_64-linux-gnu.so",
        ]);
        let first = rules_with_ldflags("-O3").rewrite(&record);
        let second = rules_with_ldflags("-O3").rewrite(&record);
        assert_eq!(first, second);
    }

    #[test]
    fn test_extra_flags_append() {
        let config = RewriteConfig::new("/h", "/t")
            .with_cflags("-O2")
            .with_extra_flags("-DNDEBUG", "");
        assert_eq!(config.cflags, ["-O2", "-DNDEBUG"]);
        assert!(config.ldflags.is_empty());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut config = RewriteConfig::new("/h", "/t");
        config.filters = vec![ProbeFilter::Regex("(".to_string())];
        assert!(RewriteRules::new(config, TargetToolchain::default()).is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/h/lib/../include/./x")), PathBuf::from("/h/include/x"));
        assert_eq!(normalize(Path::new("../a")), PathBuf::from("../a"));
    }
}
