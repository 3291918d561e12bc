//! File-marker sections.
//!
//! A context string may concatenate several files, each introduced by a
//! marker line of the literal form `=== FILE: <path> ===`. The merge
//! and split functions here are inverse on each other's images:
//! `merge(split(s)) == s` for any `s` produced by `merge`, and
//! `split(merge(f)) == f` for any well-formed file list.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ContextQuery, SCAN_CAP};

#[allow(clippy::unwrap_used)]
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^=== FILE: (.+) ===$").unwrap()
});

/// One file inside a merged context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSection {
    /// Repo-relative path.
    pub path: String,
    /// File body.
    pub content: String,
}

/// Concatenates file sections into one marked-up context string.
///
/// Each section renders as the marker line, a newline, the content,
/// and one final newline. An empty list yields the empty string.
#[must_use]
pub fn merge_files_to_context(files: &[FileSection]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str("=== FILE: ");
        out.push_str(&file.path);
        out.push_str(" ===\n");
        out.push_str(&file.content);
        out.push('\n');
    }
    out
}

/// Splits a marked-up context back into file sections.
///
/// Text before the first marker is ignored; a context without markers
/// yields an empty list. The single trailing newline `merge` appends
/// is stripped from each body.
#[must_use]
pub fn split_context_to_files(context: &str) -> Vec<FileSection> {
    let markers: Vec<(usize, usize, String)> = MARKER
        .captures_iter(context)
        .take(SCAN_CAP)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let path = caps.get(1)?.as_str().to_string();
            Some((whole.start(), whole.end(), path))
        })
        .collect();

    let mut files = Vec::with_capacity(markers.len());
    for (i, (_, header_end, path)) in markers.iter().enumerate() {
        // Body starts after the marker line's newline.
        let body_start = (*header_end + 1).min(context.len());
        let body_end = markers
            .get(i + 1)
            .map_or(context.len(), |(next_start, _, _)| *next_start);
        let body = &context[body_start..body_end];
        let content = body.strip_suffix('\n').unwrap_or(body);
        files.push(FileSection {
            path: path.clone(),
            content: content.to_string(),
        });
    }
    files
}

impl ContextQuery {
    /// Paths of every file section, in order. Empty when the context
    /// carries no markers.
    #[must_use]
    pub fn list_files(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for caps in MARKER.captures_iter(self.text()) {
            if let Some(path) = caps.get(1) {
                paths.push(path.as_str().to_string());
            }
            if paths.len() >= SCAN_CAP {
                warn!("list_files hit the {SCAN_CAP}-iteration cap, returning partial results");
                break;
            }
        }
        paths
    }

    /// Body of the section for `path`, or `None` when no marker
    /// matches.
    #[must_use]
    pub fn get_file(&self, path: &str) -> Option<String> {
        split_context_to_files(self.text())
            .into_iter()
            .find(|f| f.path == path)
            .map(|f| f.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn section(path: &str, content: &str) -> FileSection {
        FileSection {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_merge_contains_markers_in_order() {
        let merged =
            merge_files_to_context(&[section("a.ts", "A"), section("b.ts", "B")]);
        assert!(merged.contains("=== FILE: a.ts ==="));
        assert!(merged.contains("=== FILE: b.ts ==="));
        let split = split_context_to_files(&merged);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0], section("a.ts", "A"));
        assert_eq!(split[1], section("b.ts", "B"));
    }

    #[test]
    fn test_empty_list_round_trips_to_empty_string() {
        assert_eq!(merge_files_to_context(&[]), "");
        assert!(split_context_to_files("").is_empty());
    }

    #[test]
    fn test_merge_split_merge_is_identity() {
        let files = vec![
            section("x.py", "def f():\n    pass\n"),
            section("y.py", ""),
            section("z.py", "no trailing newline"),
        ];
        let merged = merge_files_to_context(&files);
        let round = merge_files_to_context(&split_context_to_files(&merged));
        assert_eq!(round, merged);
    }

    #[test]
    fn test_context_without_markers_has_no_files() {
        let q = ContextQuery::new("plain file body, no sections");
        assert!(q.list_files().is_empty());
        assert!(q.get_file("a.ts").is_none());
    }

    #[test]
    fn test_list_files_and_get_file() {
        let merged = merge_files_to_context(&[
            section("src/a.ts", "const a = 1;"),
            section("src/b.ts", "const b = 2;"),
        ]);
        let q = ContextQuery::new(merged);
        assert_eq!(q.list_files(), vec!["src/a.ts", "src/b.ts"]);
        assert_eq!(q.get_file("src/b.ts").as_deref(), Some("const b = 2;"));
        assert!(q.get_file("src/c.ts").is_none());
    }

    proptest! {
        #[test]
        fn prop_split_merge_round_trip(
            bodies in proptest::collection::vec("[a-z \n]{0,80}", 0..5)
        ) {
            // Well-formed: distinct paths, bodies that don't contain
            // marker lines themselves.
            let files: Vec<FileSection> = bodies
                .iter()
                .enumerate()
                .map(|(i, body)| section(&format!("f{i}.txt"), body))
                .collect();
            let merged = merge_files_to_context(&files);
            prop_assert_eq!(split_context_to_files(&merged), files);
            let again = merge_files_to_context(&split_context_to_files(&merged));
            prop_assert_eq!(again, merged);
        }
    }
}
