//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - Credential secrets are only exposed where a request is built
//! - No sleep() calls in production code outside the reset scheduler
//! - No blocking I/O on the request path
//!
//! The helpers below walk the workspace sources and hand each test the
//! production part of every file (everything before the first
//! `#[cfg(test)]`, with `//` comments stripped).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["switchboard/core/src", "switchboard/cli/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File path relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Trimmed source line
    pub code: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.code)
    }
}

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Every `.rs` file under a workspace-relative directory, sorted
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root.join(dir))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter(|e| e.file_name() != "test_utils.rs")
        .map(|e| {
            e.path()
                .strip_prefix(&root)
                .map_or_else(|_| e.path().to_path_buf(), Path::to_path_buf)
        })
        .collect();
    files.sort();
    files
}

/// Numbered code lines that ship in release builds
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line)))
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// Scan every production file, reporting lines for which `is_violation` holds
///
/// `is_violation` receives the workspace-relative path, all production lines
/// of the file and the index of the line under test.
pub fn scan<F>(is_violation: F) -> Vec<Violation>
where
    F: Fn(&Path, &[(usize, &str)], usize) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(dir) {
            let Ok(content) = fs::read_to_string(root.join(&path)) else {
                continue;
            };
            let lines = production_lines(&content);
            for idx in 0..lines.len() {
                if is_violation(&path, &lines, idx) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: lines[idx].0,
                        code: lines[idx].1.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

/// Whether a path ends with one of the allowed workspace-relative suffixes
#[must_use]
pub fn is_allowed(path: &Path, allowed: &[&str]) -> bool {
    allowed.iter().any(|suffix| path.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {} // trailing\n\n// only a comment\n#[cfg(test)]\nmod tests { fn b() {} }\n";
        let lines = production_lines(source);
        assert_eq!(lines, vec![(1, "fn a() {} ")]);
    }

    #[test]
    fn test_workspace_root_contains_core() {
        assert!(workspace_root().join("switchboard/core/Cargo.toml").exists());
    }

    #[test]
    fn test_rust_files_found() {
        let files = rust_files("switchboard/core/src");
        assert!(files.iter().any(|p| p.ends_with("routing/router.rs")));
        assert!(!files.iter().any(|p| p.ends_with("test_utils.rs")));
    }
}
