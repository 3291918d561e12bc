//! Declaration extraction over raw context text.
//!
//! Language-agnostic fallbacks: declarations are found by keyword
//! scanning and delimited by brace matching (or indentation for
//! Python-style blocks). A miss returns `None`, never an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::{ContextQuery, SCAN_CAP};

#[allow(clippy::unwrap_used)]
static IMPORT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"import\s+(?:.+?\s+from\s+)?['"]([^'"]+)['"]"#,
        r#"require\(\s*['"]([^'"]+)['"]\s*\)"#,
        r"^\s*from\s+([\w.]+)\s+import\s",
        r"^\s*import\s+([\w.]+)\s*$",
        r"^\s*(?:pub\s+)?use\s+([\w:]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[allow(clippy::unwrap_used)]
static EXPORT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*export\s+(?:default\s+)?(?:abstract\s+)?(?:async\s+)?(?:function|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)",
        r"^\s*module\.exports\.(\w+)",
        r"^\s*pub\s+(?:async\s+)?(?:fn|struct|enum|trait)\s+(\w+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[allow(clippy::unwrap_used)]
static OUTLINE_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\s*)(?:(?:export|pub(?:\([^)]*\))?)\s+)?(?:default\s+)?(?:const\s+)?(async\s+)?(?:function\s*\*?\s*|def\s+|fn\s+)(\w+)",
    )
    .unwrap()
});

#[allow(clippy::unwrap_used)]
static OUTLINE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:export|pub(?:\([^)]*\))?)\s+)?(?:default\s+)?(?:abstract\s+)?(?:class|struct|trait)\s+(\w+)",
    )
    .unwrap()
});

#[allow(clippy::unwrap_used)]
static METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(?:pub\s+)?(?:async\s+)?(?:static\s+)?(?:get\s+|set\s+)?(?:fn\s+|def\s+)?([A-Za-z_$][\w$]*)\s*\([^;]*\)\s*[:{]")
        .unwrap()
});

/// Keywords that look like methods to the scanner but are control flow.
const NON_METHODS: &[&str] = &["if", "for", "while", "switch", "catch", "return"];

/// One entry in a context outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineItem {
    /// `"function"` or `"class"`.
    pub item_type: String,
    /// Declared name.
    pub name: String,
    /// The declaration line, trimmed.
    pub signature: String,
    /// 1-indexed start line.
    pub start_line: usize,
    /// 1-indexed end line (inclusive).
    pub end_line: usize,
    /// Nested declarations (class methods).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineItem>,
}

impl ContextQuery {
    /// Extracts a top-level function declaration by name, or `None`.
    #[must_use]
    pub fn get_function(&self, name: &str) -> Option<String> {
        let lines: Vec<&str> = self.text().lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = OUTLINE_FUNCTION.captures(line) else {
                continue;
            };
            if caps.get(3).map(|m| m.as_str()) != Some(name) {
                continue;
            }
            if !caps.get(1).is_some_and(|m| m.as_str().is_empty()) {
                continue;
            }
            let end = block_end(&lines, i);
            return Some(lines[i..=end].join("\n"));
        }
        None
    }

    /// Extracts a top-level class declaration by name, or `None`.
    #[must_use]
    pub fn get_class(&self, name: &str) -> Option<String> {
        let lines: Vec<&str> = self.text().lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = OUTLINE_CLASS.captures(line) else {
                continue;
            };
            if caps.get(1).map(|m| m.as_str()) != Some(name) {
                continue;
            }
            let end = block_end(&lines, i);
            return Some(lines[i..=end].join("\n"));
        }
        None
    }

    /// Import sources found by pattern scanning, in order, deduped.
    #[must_use]
    pub fn get_imports(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for line in self.text().lines() {
            for pattern in IMPORT_PATTERNS.iter() {
                if let Some(caps) = pattern.captures(line)
                    && let Some(source) = caps.get(1)
                {
                    let source = source.as_str().to_string();
                    if !sources.contains(&source) {
                        sources.push(source);
                    }
                    break;
                }
            }
            if sources.len() >= SCAN_CAP {
                break;
            }
        }
        sources
    }

    /// Exported names found by pattern scanning, in order, deduped.
    #[must_use]
    pub fn get_exports(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for line in self.text().lines() {
            for pattern in EXPORT_PATTERNS.iter() {
                if let Some(caps) = pattern.captures(line)
                    && let Some(name) = caps.get(1)
                {
                    let name = name.as_str().to_string();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                    break;
                }
            }
            if names.len() >= SCAN_CAP {
                break;
            }
        }
        names
    }

    /// Structural outline: top-level functions and classes, with class
    /// methods as children.
    #[must_use]
    pub fn get_outline(&self) -> Vec<OutlineItem> {
        let lines: Vec<&str> = self.text().lines().collect();
        let mut outline: Vec<OutlineItem> = Vec::new();
        let mut i = 0usize;

        while i < lines.len() && outline.len() < SCAN_CAP {
            let line = lines[i];

            if let Some(caps) = OUTLINE_CLASS.captures(line) {
                let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
                let end = block_end(&lines, i);
                let children = lines[i..=end]
                    .iter()
                    .enumerate()
                    .skip(1)
                    .filter_map(|(off, l)| {
                        let child_name = METHOD
                            .captures(l)
                            .and_then(|c| c.get(1))
                            .map(|m| m.as_str().to_string())?;
                        if NON_METHODS.contains(&child_name.as_str()) {
                            return None;
                        }
                        Some(OutlineItem {
                            item_type: "function".to_string(),
                            name: child_name,
                            signature: l.trim().to_string(),
                            start_line: i + off + 1,
                            end_line: i + off + 1,
                            children: Vec::new(),
                        })
                    })
                    .collect();
                outline.push(OutlineItem {
                    item_type: "class".to_string(),
                    name,
                    signature: line.trim().to_string(),
                    start_line: i + 1,
                    end_line: end + 1,
                    children,
                });
                i = end + 1;
                continue;
            }

            if let Some(caps) = OUTLINE_FUNCTION.captures(line)
                && caps.get(1).is_some_and(|m| m.as_str().is_empty())
            {
                let name = caps.get(3).map_or("", |m| m.as_str()).to_string();
                let end = block_end(&lines, i);
                outline.push(OutlineItem {
                    item_type: "function".to_string(),
                    name,
                    signature: line.trim().to_string(),
                    start_line: i + 1,
                    end_line: end + 1,
                    children: Vec::new(),
                });
                i = end + 1;
                continue;
            }

            i += 1;
        }

        outline
    }
}

/// Finds the last line of the block opened at `start` (0-indexed).
///
/// Brace-delimited blocks end at the balancing `}`; colon-introduced
/// blocks (Python) end where indentation returns to the opener's
/// level.
fn block_end(lines: &[&str], start: usize) -> usize {
    let opener = lines[start];
    if opener.trim_end().ends_with(':') || !opener.contains('{') && opener.trim_end().ends_with("=>") {
        return indent_end(lines, start);
    }
    if opener.contains('{') || lines.get(start + 1).is_some_and(|l| l.trim_start().starts_with('{')) {
        return crate::parser::brace_block_end(lines, start);
    }
    // Single-line declaration (e.g. `pub struct Thing;`).
    start
}

fn indent_end(lines: &[&str], start: usize) -> usize {
    let opener_indent = indent_of(lines[start]);
    let mut end = start;
    for (i, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= opener_indent {
            break;
        }
        end = i;
    }
    end
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}
