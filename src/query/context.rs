//! Positional and search operations.

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use super::{ContextQuery, SCAN_CAP};

/// A regex match with its byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// Byte offset of the match start.
    pub offset: usize,
    /// Matched text.
    pub text: String,
}

/// One grep hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrepLine {
    /// 1-indexed line number.
    pub line: usize,
    /// The matching line's content.
    pub content: String,
}

impl ContextQuery {
    /// Byte length of the context.
    #[must_use]
    pub fn length(&self) -> usize {
        self.text().len()
    }

    /// Number of lines.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.text().lines().count()
    }

    /// Byte offset of the first occurrence of `needle`, or −1.
    #[must_use]
    pub fn find(&self, needle: &str) -> i64 {
        self.text()
            .find(needle)
            .and_then(|i| i64::try_from(i).ok())
            .unwrap_or(-1)
    }

    /// Byte offsets of every occurrence of `needle`, capped at
    /// [`SCAN_CAP`] results.
    #[must_use]
    pub fn find_all(&self, needle: &str) -> Vec<usize> {
        if needle.is_empty() {
            return Vec::new();
        }
        let mut offsets = Vec::new();
        let mut from = 0usize;
        while let Some(rel) = self.text()[from..].find(needle) {
            offsets.push(from + rel);
            if offsets.len() >= SCAN_CAP {
                warn!("find_all hit the {SCAN_CAP}-iteration cap, returning partial results");
                break;
            }
            from += rel + needle.len();
        }
        offsets
    }

    /// First regex match, or `None` (also for invalid patterns, with a
    /// warning).
    #[must_use]
    pub fn search(&self, pattern: &str) -> Option<SearchMatch> {
        let re = compile(pattern)?;
        re.find(self.text()).map(|m| SearchMatch {
            offset: m.start(),
            text: m.as_str().to_string(),
        })
    }

    /// Lines matching the regex, 1-indexed, capped at [`SCAN_CAP`]
    /// results. Invalid patterns yield an empty list with a warning.
    #[must_use]
    pub fn grep(&self, pattern: &str) -> Vec<GrepLine> {
        let Some(re) = compile(pattern) else {
            return Vec::new();
        };
        let mut hits = Vec::new();
        for (i, line) in self.text().lines().enumerate() {
            if re.is_match(line) {
                hits.push(GrepLine {
                    line: i + 1,
                    content: line.to_string(),
                });
                if hits.len() >= SCAN_CAP {
                    warn!("grep hit the {SCAN_CAP}-iteration cap, returning partial results");
                    break;
                }
            }
        }
        hits
    }

    /// Byte-indexed slice, end exclusive. Bounds are clamped and
    /// rounded to char boundaries, so no input can panic.
    #[must_use]
    pub fn slice(&self, start: usize, end: Option<usize>) -> String {
        let text = self.text();
        let len = text.len();
        let start = floor_boundary(text, start.min(len));
        let end = floor_boundary(text, end.unwrap_or(len).min(len)).max(start);
        text[start..end].to_string()
    }

    /// Lines `start..=end`, 1-indexed inclusive.
    #[must_use]
    pub fn get_lines(&self, start: usize, end: usize) -> String {
        if start == 0 || end < start {
            return String::new();
        }
        self.text()
            .lines()
            .skip(start - 1)
            .take(end - start + 1)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First `n` lines.
    #[must_use]
    pub fn head(&self, n: usize) -> String {
        self.text().lines().take(n).collect::<Vec<_>>().join("\n")
    }

    /// Last `n` lines.
    #[must_use]
    pub fn tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self.text().lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

/// Compiles a pattern with a bounded DFA size; failures warn and
/// return `None` so queries never raise on LLM-authored patterns.
fn compile(pattern: &str) -> Option<Regex> {
    match regex::RegexBuilder::new(pattern)
        .size_limit(1_000_000)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("invalid pattern {pattern:?}: {e}");
            None
        }
    }
}

/// Largest char boundary ≤ `i`.
fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
