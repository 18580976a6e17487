//! Glob and content search over an overlay's merged file view, backing
//! the sandbox's `search_files`/`search_content` external functions.
//!
//! Resolves the original's unfinished "materialized workspace vs
//! overlay scan" question in favor of scanning the overlay directly —
//! every read goes through the same overlay handle, consistent with the
//! rest of the store.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use cairn_core::Result;

use crate::overlay::FileOverlay;

/// Build a matcher for `pattern`. A bare pattern with no `/` is
/// normalized to `**/<pattern>` so it matches recursively through
/// subdirectories, per the sandbox contract.
fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    let normalized = if pattern.contains('/') {
        pattern.to_string()
    } else {
        format!("**/{pattern}")
    };
    GlobBuilder::new(&normalized)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| cairn_core::Error::ValidationError(format!("invalid glob {pattern}: {e}")))
}

fn all_paths_recursive(overlay: &FileOverlay, root: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_string()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = overlay.readdir(&dir) else { continue };
        for entry in entries {
            let path = if dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{dir}/{}", entry.name)
            };
            if entry.is_dir {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

/// Every path in the overlay matching `pattern`.
pub fn search_files(overlay: &FileOverlay, pattern: &str) -> Result<Vec<String>> {
    let matcher = compile_glob(pattern)?;
    Ok(all_paths_recursive(overlay, "")
        .into_iter()
        .filter(|p| matcher.is_match(p))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatch {
    pub file: String,
    pub line: u32,
    pub text: String,
}

/// Regex search across every file under `root`, line by line.
pub fn search_content(overlay: &FileOverlay, pattern: &str, root: &str) -> Result<Vec<ContentMatch>> {
    let re = Regex::new(pattern)
        .map_err(|e| cairn_core::Error::ValidationError(format!("invalid regex {pattern}: {e}")))?;

    let mut matches = Vec::new();
    for path in all_paths_recursive(overlay, root) {
        let Ok(content) = overlay.read_file(&path) else { continue };
        let Ok(text) = String::from_utf8(content) else { continue };
        for (idx, line) in text.lines().enumerate() {
            if re.is_match(line) {
                matches.push(ContentMatch {
                    file: path.clone(),
                    line: (idx + 1) as u32,
                    text: line.to_string(),
                });
            }
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;
    use std::sync::Arc;

    fn overlay() -> FileOverlay {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn crate::object_store::ObjectStore> =
            Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));
        std::mem::forget(dir);
        FileOverlay::new("o", store, None)
    }

    #[tokio::test]
    async fn bare_pattern_matches_recursively() {
        let o = overlay();
        o.write_file("src/main.rs", b"fn main() {}".to_vec()).await.unwrap();
        o.write_file("README.md", b"hi".to_vec()).await.unwrap();

        let matches = search_files(&o, "*.rs").unwrap();
        assert_eq!(matches, vec!["src/main.rs".to_string()]);
    }

    #[tokio::test]
    async fn search_content_finds_matching_lines() {
        let o = overlay();
        o.write_file("a.txt", b"hello\nworld\nhello again".to_vec())
            .await
            .unwrap();

        let matches = search_content(&o, "hello", "").unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line, 1);
        assert_eq!(matches[1].line, 3);
    }
}
