//! C++ source discovery and generated-test naming.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;
use walkdir::WalkDir;

/// Recognized C++ translation unit extensions.
pub const SOURCE_EXTENSIONS: [&str; 2] = ["cc", "cpp"];
/// Path component excluded from discovery at any depth.
pub const EXCLUDED_COMPONENT: &str = "third_party";
/// Prefix mapping a source file to its generated test file.
pub const TEST_FILE_PREFIX: &str = "test_";

/// Whether `path` names a recognized C++ translation unit.
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn contains_excluded_component(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == EXCLUDED_COMPONENT)
}

/// Recursively enumerate C++ sources under `project_dir`.
///
/// Paths with a `third_party` component below the project root are skipped,
/// at any nesting depth. Order is the walker's traversal order: unspecified,
/// but repeatable over an unchanged tree.
pub fn discover_sources(project_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    let walker = WalkDir::new(project_dir).into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(project_dir)
            .map(|relative| !contains_excluded_component(relative))
            .unwrap_or(true)
    });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", project_dir.display()))?;
        if entry.file_type().is_file() && is_source_file(entry.path()) {
            sources.push(entry.path().to_path_buf());
        }
    }
    debug!(count = sources.len(), project_dir = %project_dir.display(), "discovered sources");
    Ok(sources)
}

/// Name of the generated test file for `source` (`test_<base name>`).
///
/// The mapping is 1:1 and idempotent: rerunning a stage overwrites the same
/// file instead of accumulating duplicates.
pub fn test_file_name(source: &Path) -> Result<String> {
    let base = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("source path has no file name: {}", source.display()))?;
    Ok(format!("{TEST_FILE_PREFIX}{base}"))
}

/// List candidate test files directly under `tests_dir` (non-recursive).
pub fn list_test_files(tests_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries =
        fs::read_dir(tests_dir).with_context(|| format!("read {}", tests_dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", tests_dir.display()))?;
        let path = entry.path();
        if path.is_file() && is_source_file(&path) {
            files.push(path);
        }
    }
    Ok(files)
}
