//! Structural source parsing.
//!
//! Extracts imports, exports, functions, and classes from source text
//! using pattern scanning, with no full language semantics. The contract is
//! uniform across languages and total: unknown languages produce an
//! empty summary and the file is treated as opaque text.
//!
//! The parser is side-effect-free. It is called from the indexer and,
//! read-only, from the query surface's outline extraction.

pub mod javascript;
pub mod python;
pub mod rust;

use serde::{Deserialize, Serialize};

/// Language tag for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// JavaScript (including JSX).
    Javascript,
    /// TypeScript (including TSX).
    Typescript,
    /// Python.
    Python,
    /// Rust.
    Rust,
    /// Anything else: treated as opaque text.
    Unknown,
}

impl Language {
    /// Detects a language from a file path's extension.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit('.').next().unwrap_or("");
        match ext {
            "js" | "jsx" | "mjs" | "cjs" => Self::Javascript,
            "ts" | "tsx" | "mts" | "cts" => Self::Typescript,
            "py" | "pyi" => Self::Python,
            "rs" => Self::Rust,
            _ => Self::Unknown,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Unknown => "unknown",
        }
    }
}

/// One import statement: a source string plus its specifier names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Raw, unresolved module reference (`"./util"`, `"react"`, `"os.path"`).
    pub source: String,
    /// Imported names in declaration order. Empty for bare imports.
    pub specifiers: Vec<String>,
    /// 1-indexed source line.
    pub line: usize,
}

/// A top-level function declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    /// Function name.
    pub name: String,
    /// 1-indexed start line.
    pub start_line: usize,
    /// 1-indexed end line (inclusive).
    pub end_line: usize,
    /// Whether the function is async.
    pub is_async: bool,
}

/// A top-level class declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Class name.
    pub name: String,
    /// 1-indexed start line.
    pub start_line: usize,
    /// 1-indexed end line (inclusive).
    pub end_line: usize,
    /// Method names in declaration order.
    pub methods: Vec<String>,
}

/// Structural summary of one source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSource {
    /// Imports in declaration order.
    pub imports: Vec<Import>,
    /// Exported symbol names. For languages without explicit export
    /// semantics this is every top-level function and class name.
    pub exports: Vec<String>,
    /// Top-level functions.
    pub functions: Vec<FunctionDecl>,
    /// Top-level classes.
    pub classes: Vec<ClassDecl>,
}

impl ParsedSource {
    /// Returns `true` when nothing structural was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.exports.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
    }
}

/// Parses source text under the given language tag.
///
/// Never fails: unknown languages (and any content the per-language
/// scanners cannot make sense of) yield an empty [`ParsedSource`].
#[must_use]
pub fn parse(source: &str, language: Language) -> ParsedSource {
    match language {
        Language::Javascript | Language::Typescript => javascript::parse(source),
        Language::Python => python::parse(source),
        Language::Rust => rust::parse(source),
        Language::Unknown => ParsedSource::default(),
    }
}

/// Finds the closing line of a brace-delimited block opened at
/// `start_line` (0-indexed into `lines`). Returns the 0-indexed line of
/// the balancing `}`, or the last line when the block never closes.
///
/// Heuristic: counts braces without string/comment awareness, which is
/// adequate for span display and chunk typing.
#[must_use]
pub(crate) fn brace_block_end(lines: &[&str], start_line: usize) -> usize {
    let mut depth: i64 = 0;
    let mut seen_open = false;
    for (i, line) in lines.iter().enumerate().skip(start_line) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_open && depth <= 0 {
            return i;
        }
    }
    lines.len().saturating_sub(1)
}
