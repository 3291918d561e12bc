//! Rust structural extraction.
//!
//! `use` declarations map to imports, `pub` items to exports. Structs
//! and enums are reported as classes; their methods come from matching
//! `impl` blocks in the same file.

use std::sync::LazyLock;

use regex::Regex;

use super::{ClassDecl, FunctionDecl, Import, ParsedSource, brace_block_end};

#[allow(clippy::unwrap_used)]
static USE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([\w:]+)(?:::\{([^}]*)\})?").unwrap()
});

#[allow(clippy::unwrap_used)]
static FN_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(pub(?:\([^)]*\))?\s+)?(?:const\s+)?(async\s+)?(?:unsafe\s+)?fn\s+(\w+)")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(pub(?:\([^)]*\))?\s+)?(struct|enum|trait)\s+(\w+)").unwrap()
});

#[allow(clippy::unwrap_used)]
static IMPL_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^impl(?:<[^>]*>)?\s+(?:\w+\s+for\s+)?(\w+)").unwrap()
});

/// Parses Rust source.
#[must_use]
pub fn parse(source: &str) -> ParsedSource {
    let lines: Vec<&str> = source.lines().collect();
    let mut parsed = ParsedSource::default();
    // name → index into parsed.classes, for attaching impl methods
    let mut class_index: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();

    for (i, line) in lines.iter().enumerate() {
        let line_no = i + 1;

        if let Some(caps) = USE_DECL.captures(line) {
            let source = caps
                .get(1)
                .map_or("", |m| m.as_str())
                .trim_end_matches("::")
                .to_string();
            let specifiers = caps.get(2).map_or_else(Vec::new, |group| {
                group
                    .as_str()
                    .split(',')
                    .map(|s| s.split_whitespace().next_back().unwrap_or("").to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });
            parsed.imports.push(Import {
                source,
                specifiers,
                line: line_no,
            });
        }

        if let Some(caps) = FN_DECL.captures(line) {
            let indent = caps.get(1).map_or("", |m| m.as_str());
            if indent.is_empty() {
                let name = caps.get(4).map_or("", |m| m.as_str()).to_string();
                if caps.get(2).is_some() {
                    parsed.exports.push(name.clone());
                }
                parsed.functions.push(FunctionDecl {
                    name,
                    start_line: line_no,
                    end_line: brace_block_end(&lines, i) + 1,
                    is_async: caps.get(3).is_some(),
                });
            }
        }

        if let Some(caps) = TYPE_DECL.captures(line) {
            let name = caps.get(3).map_or("", |m| m.as_str()).to_string();
            if caps.get(1).is_some() {
                parsed.exports.push(name.clone());
            }
            class_index.insert(name.clone(), parsed.classes.len());
            parsed.classes.push(ClassDecl {
                name,
                start_line: line_no,
                end_line: brace_block_end(&lines, i) + 1,
                methods: Vec::new(),
            });
        }

        if let Some(caps) = IMPL_DECL.captures(line) {
            let target = caps.get(1).map_or("", |m| m.as_str());
            let end = brace_block_end(&lines, i);
            let methods: Vec<String> = lines[i..=end.min(lines.len().saturating_sub(1))]
                .iter()
                .skip(1)
                .filter_map(|l| FN_DECL.captures(l))
                .filter(|c| !c.get(1).map_or("", |m| m.as_str()).is_empty())
                .filter_map(|c| c.get(4).map(|m| m.as_str().to_string()))
                .collect();
            if let Some(&idx) = class_index.get(target) {
                parsed.classes[idx].methods.extend(methods);
                let impl_end = end + 1;
                if impl_end > parsed.classes[idx].end_line {
                    parsed.classes[idx].end_line = impl_end;
                }
            }
        }
    }

    parsed
}
