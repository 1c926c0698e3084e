//! Removal of native artifacts left behind by the captured build.

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Extensions of native objects, static libraries and shared libraries.
const NATIVE_ARTIFACT_EXTS: &[&str] = &["o", "a", "so"];

/// Delete every native object, archive and shared library under `root`.
///
/// Returns the number of files removed. The build log is never touched.
pub fn scrub_native_artifacts(root: &Path) -> Result<usize> {
    let mut removed = 0;

    for entry in WalkDir::new(root) {
        let entry =
            entry.with_context(|| format!("failed to walk build tree: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let is_native = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| NATIVE_ARTIFACT_EXTS.contains(&ext));

        if is_native {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            removed += 1;
        }
    }

    tracing::debug!("removed {} native artifact(s) under {}", removed, root.display());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scrub_removes_only_native_artifacts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let nested = root.join("build/temp.linux-x86_64-3.7/src");
        fs::create_dir_all(&nested).unwrap();

        for file in ["foo.o", "libfoo.a", "foo.cpython-37m.so"] {
            fs::write(nested.join(file), "").unwrap();
        }
        for file in ["foo.c", "foo.h", "bar.bc", "setup.py"] {
            fs::write(nested.join(file), "").unwrap();
        }
        fs::write(root.join("build.log"), "[\"cc\",\"-c\",\"foo.c\"]\n").unwrap();
        fs::write(root.join("top.so"), "").unwrap();

        let removed = scrub_native_artifacts(root).unwrap();
        assert_eq!(removed, 4);

        assert!(!nested.join("foo.o").exists());
        assert!(!root.join("top.so").exists());
        assert!(nested.join("foo.c").exists());
        assert!(nested.join("bar.bc").exists());
        assert!(root.join("build.log").exists());
    }

    #[test]
    fn test_scrub_empty_tree() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(scrub_native_artifacts(tmp.path()).unwrap(), 0);
    }
}
