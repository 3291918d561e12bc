//! JavaScript / TypeScript structural extraction.
//!
//! Pattern-scanning only: imports (ES and CommonJS), explicit exports,
//! top-level functions (declarations and arrow consts), and classes
//! with their method names.

use std::sync::LazyLock;

use regex::Regex;

use super::{ClassDecl, FunctionDecl, Import, ParsedSource, brace_block_end};

#[allow(clippy::unwrap_used)]
static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(.+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap()
});

#[allow(clippy::unwrap_used)]
static IMPORT_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).unwrap()
});

#[allow(clippy::unwrap_used)]
static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:const|let|var)\s+(\{[^}]*\}|\w+)\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#)
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s+(?:default\s+)?(?:abstract\s+)?(?:async\s+)?(?:function|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static EXPORT_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s*\{([^}]*)\}").unwrap()
});

#[allow(clippy::unwrap_used)]
static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static ARROW_CONST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(?:async\s+)?(?:static\s+)?(?:get\s+|set\s+)?([A-Za-z_$][\w$]*)\s*\([^;]*\)\s*\{")
        .unwrap()
});

/// Parses JavaScript or TypeScript source.
#[must_use]
pub fn parse(source: &str) -> ParsedSource {
    let lines: Vec<&str> = source.lines().collect();
    let mut parsed = ParsedSource::default();

    for (i, line) in lines.iter().enumerate() {
        let line_no = i + 1;

        if let Some(caps) = IMPORT_FROM.captures(line) {
            let clause = caps.get(1).map_or("", |m| m.as_str());
            let source = caps.get(2).map_or("", |m| m.as_str()).to_string();
            parsed.imports.push(Import {
                source,
                specifiers: import_specifiers(clause),
                line: line_no,
            });
        } else if let Some(caps) = IMPORT_BARE.captures(line) {
            parsed.imports.push(Import {
                source: caps.get(1).map_or("", |m| m.as_str()).to_string(),
                specifiers: Vec::new(),
                line: line_no,
            });
        } else if let Some(caps) = REQUIRE.captures(line) {
            let clause = caps.get(1).map_or("", |m| m.as_str());
            parsed.imports.push(Import {
                source: caps.get(2).map_or("", |m| m.as_str()).to_string(),
                specifiers: import_specifiers(clause),
                line: line_no,
            });
        }

        if let Some(caps) = EXPORT_DECL.captures(line) {
            push_unique(&mut parsed.exports, caps.get(1).map_or("", |m| m.as_str()));
        } else if let Some(caps) = EXPORT_LIST.captures(line) {
            for name in caps.get(1).map_or("", |m| m.as_str()).split(',') {
                // `a as b` exports the alias.
                let name = name
                    .split_whitespace()
                    .next_back()
                    .unwrap_or("")
                    .trim();
                if !name.is_empty() {
                    push_unique(&mut parsed.exports, name);
                }
            }
        } else if line.trim_start().starts_with("export default") {
            push_unique(&mut parsed.exports, "default");
        }

        if let Some(caps) = FUNCTION_DECL.captures(line) {
            let name = caps.get(2).map_or("", |m| m.as_str()).to_string();
            parsed.functions.push(FunctionDecl {
                name,
                start_line: line_no,
                end_line: brace_block_end(&lines, i) + 1,
                is_async: caps.get(1).is_some(),
            });
        } else if let Some(caps) = ARROW_CONST.captures(line) {
            let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
            parsed.functions.push(FunctionDecl {
                name,
                start_line: line_no,
                end_line: brace_block_end(&lines, i) + 1,
                is_async: caps.get(2).is_some(),
            });
        }

        if let Some(caps) = CLASS_DECL.captures(line) {
            let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let end = brace_block_end(&lines, i);
            let methods = lines[i..=end.min(lines.len().saturating_sub(1))]
                .iter()
                .skip(1)
                .filter_map(|l| METHOD.captures(l))
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .filter(|m| m != "if" && m != "for" && m != "while" && m != "switch")
                .collect();
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

/// Extracts specifier names from an import clause
/// (`{a, b as c}`, `d`, `* as ns`, `d, {a}`).
fn import_specifiers(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let clause = clause.trim();

    if let Some(rest) = clause.strip_prefix("* as ") {
        names.push(rest.trim().to_string());
        return names;
    }

    let (default_part, braced) = match clause.find('{') {
        Some(open) => {
            let close = clause.rfind('}').unwrap_or(clause.len());
            (&clause[..open], Some(&clause[open + 1..close]))
        }
        None => (clause, None),
    };

    let default_part = default_part.trim().trim_end_matches(',').trim();
    if !default_part.is_empty() && !default_part.starts_with('*') {
        names.push(default_part.to_string());
    }

    if let Some(braced) = braced {
        for part in braced.split(',') {
            // `a as b` binds the alias locally.
            let name = part.split_whitespace().next_back().unwrap_or("").trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }

    names
}

fn push_unique(exports: &mut Vec<String>, name: &str) {
    if !exports.iter().any(|e| e == name) {
        exports.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_es_imports() {
        let src = "import React from 'react';\n\
                   import { useState, useEffect as ue } from 'react';\n\
                   import * as path from 'path';\n\
                   import './styles.css';\n";
        let parsed = parse(src);
        assert_eq!(parsed.imports.len(), 4);
        assert_eq!(parsed.imports[0].source, "react");
        assert_eq!(parsed.imports[0].specifiers, vec!["React"]);
        assert_eq!(parsed.imports[1].specifiers, vec!["useState", "ue"]);
        assert_eq!(parsed.imports[2].specifiers, vec!["path"]);
        assert!(parsed.imports[3].specifiers.is_empty());
        assert_eq!(parsed.imports[3].line, 4);
    }

    #[test]
    fn test_commonjs_require() {
        let src = "const fs = require('fs');\nconst { join } = require('path');\n";
        let parsed = parse(src);
        assert_eq!(parsed.imports.len(), 2);
        assert_eq!(parsed.imports[0].source, "fs");
        assert_eq!(parsed.imports[1].source, "path");
        assert_eq!(parsed.imports[1].specifiers, vec!["join"]);
    }

    #[test]
    fn test_exports() {
        let src = "export function foo() {}\n\
                   export const bar = 1;\n\
                   export default class Baz {}\n\
                   export { a, b as c };\n";
        let parsed = parse(src);
        assert!(parsed.exports.contains(&"foo".to_string()));
        assert!(parsed.exports.contains(&"bar".to_string()));
        assert!(parsed.exports.contains(&"Baz".to_string()));
        assert!(parsed.exports.contains(&"a".to_string()));
        assert!(parsed.exports.contains(&"c".to_string()));
    }

    #[test]
    fn test_functions_with_spans() {
        let src = "async function load() {\n  return 1;\n}\n\
                   const handler = async (req) => {\n  return req;\n};\n";
        let parsed = parse(src);
        assert_eq!(parsed.functions.len(), 2);
        assert_eq!(parsed.functions[0].name, "load");
        assert!(parsed.functions[0].is_async);
        assert_eq!(parsed.functions[0].start_line, 1);
        assert_eq!(parsed.functions[0].end_line, 3);
        assert_eq!(parsed.functions[1].name, "handler");
        assert!(parsed.functions[1].is_async);
    }

    #[test]
    fn test_class_with_methods() {
        let src = "class Widget extends Base {\n\
                   \x20 constructor(x) {\n    this.x = x;\n  }\n\
                   \x20 async render() {\n    return this.x;\n  }\n\
                   \x20 static of(x) {\n    return new Widget(x);\n  }\n\
                   }\n";
        let parsed = parse(src);
        assert_eq!(parsed.classes.len(), 1);
        let class = &parsed.classes[0];
        assert_eq!(class.name, "Widget");
        assert_eq!(class.methods, vec!["constructor", "render", "of"]);
        assert_eq!(class.start_line, 1);
        assert_eq!(class.end_line, 11);
    }

    #[test]
    fn test_empty_source() {
        let parsed = parse("");
        assert!(parsed.is_empty());
    }
}
