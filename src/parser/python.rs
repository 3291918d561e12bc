//! Python structural extraction.
//!
//! Python has no explicit export syntax, so every top-level function
//! and class name is considered exported. Block ends are found by
//! indentation scanning.

use std::sync::LazyLock;

use regex::Regex;

use super::{ClassDecl, FunctionDecl, Import, ParsedSource};

#[allow(clippy::unwrap_used)]
static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*import\s+([\w.]+)(?:\s+as\s+(\w+))?").unwrap()
});

#[allow(clippy::unwrap_used)]
static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+(.+)").unwrap()
});

#[allow(clippy::unwrap_used)]
static DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(async\s+)?def\s+(\w+)").unwrap()
});

#[allow(clippy::unwrap_used)]
static CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^class\s+(\w+)").unwrap()
});

/// Parses Python source.
#[must_use]
pub fn parse(source: &str) -> ParsedSource {
    let lines: Vec<&str> = source.lines().collect();
    let mut parsed = ParsedSource::default();

    for (i, line) in lines.iter().enumerate() {
        let line_no = i + 1;

        if let Some(caps) = FROM_IMPORT.captures(line) {
            let source = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let specifiers = caps
                .get(2)
                .map_or("", |m| m.as_str())
                .trim_start_matches('(')
                .trim_end_matches(')')
                .split(',')
                .map(|s| {
                    // `a as b` binds the alias locally.
                    s.split_whitespace().next_back().unwrap_or("").to_string()
                })
                .filter(|s| !s.is_empty() && s != "\\")
                .collect();
            parsed.imports.push(Import {
                source,
                specifiers,
                line: line_no,
            });
        } else if let Some(caps) = IMPORT.captures(line) {
            let source = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let specifiers = caps
                .get(2)
                .map(|m| vec![m.as_str().to_string()])
                .unwrap_or_default();
            parsed.imports.push(Import {
                source,
                specifiers,
                line: line_no,
            });
        }

        if let Some(caps) = DEF.captures(line) {
            let indent = caps.get(1).map_or("", |m| m.as_str());
            // Only top-level defs count as functions.
            if indent.is_empty() {
                let name = caps.get(3).map_or("", |m| m.as_str()).to_string();
                parsed.exports.push(name.clone());
                parsed.functions.push(FunctionDecl {
                    name,
                    start_line: line_no,
                    end_line: indent_block_end(&lines, i) + 1,
                    is_async: caps.get(2).is_some(),
                });
            }
        }

        if let Some(caps) = CLASS.captures(line) {
            let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let end = indent_block_end(&lines, i);
            let methods = lines[i..=end.min(lines.len().saturating_sub(1))]
                .iter()
                .skip(1)
                .filter_map(|l| DEF.captures(l))
                .filter(|c| !c.get(1).map_or("", |m| m.as_str()).is_empty())
                .filter_map(|c| c.get(3).map(|m| m.as_str().to_string()))
                .collect();
            parsed.exports.push(name.clone());
            parsed.classes.push(ClassDecl {
                name,
                start_line: line_no,
                end_line: end + 1,
                methods,
            });
        }
    }

    parsed
}

/// Finds the last line of an indentation block starting at `start`
/// (0-indexed). The block runs until the next non-blank line indented
/// at or below the opener's level.
fn indent_block_end(lines: &[&str], start: usize) -> usize {
    let opener_indent = leading_spaces(lines[start]);
    let mut end = start;
    for (i, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if leading_spaces(line) <= opener_indent {
            break;
        }
        end = i;
    }
    end
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imports() {
        let src = "import os\nimport numpy as np\nfrom pathlib import Path, PurePath\n";
        let parsed = parse(src);
        assert_eq!(parsed.imports.len(), 3);
        assert_eq!(parsed.imports[0].source, "os");
        assert!(parsed.imports[0].specifiers.is_empty());
        assert_eq!(parsed.imports[1].source, "numpy");
        assert_eq!(parsed.imports[1].specifiers, vec!["np"]);
        assert_eq!(parsed.imports[2].source, "pathlib");
        assert_eq!(parsed.imports[2].specifiers, vec!["Path", "PurePath"]);
    }

    #[test]
    fn test_top_level_defs_are_exported() {
        let src = "def first():\n    pass\n\nasync def second():\n    pass\n";
        let parsed = parse(src);
        assert_eq!(parsed.exports, vec!["first", "second"]);
        assert_eq!(parsed.functions.len(), 2);
        assert!(!parsed.functions[0].is_async);
        assert!(parsed.functions[1].is_async);
        assert_eq!(parsed.functions[0].start_line, 1);
        assert_eq!(parsed.functions[0].end_line, 2);
    }

    #[test]
    fn test_nested_defs_are_not_top_level() {
        let src = "def outer():\n    def inner():\n        pass\n    return inner\n";
        let parsed = parse(src);
        assert_eq!(parsed.functions.len(), 1);
        assert_eq!(parsed.functions[0].name, "outer");
        assert_eq!(parsed.functions[0].end_line, 4);
    }

    #[test]
    fn test_class_with_methods() {
        let src = "class Store:\n    def __init__(self):\n        pass\n\n    def get(self, k):\n        pass\n\ndef after():\n    pass\n";
        let parsed = parse(src);
        assert_eq!(parsed.classes.len(), 1);
        let class = &parsed.classes[0];
        assert_eq!(class.name, "Store");
        assert_eq!(class.methods, vec!["__init__", "get"]);
        assert_eq!(class.end_line, 6);
        assert_eq!(parsed.functions.len(), 1);
        assert_eq!(parsed.functions[0].name, "after");
    }
}
