//! Read-only query surface over an immutable context string.
//!
//! The context may be a single file's body or a concatenation of file
//! sections delimited by `=== FILE: <path> ===` marker lines. Every
//! operation is deterministic and does no I/O; this is the only
//! surface sandboxed code gets to touch.
//!
//! Regex scans are capped at [`SCAN_CAP`] iterations; a pattern that
//! exceeds the cap returns partial results and logs a warning.

mod context;
mod files;
mod structure;

pub use context::{GrepLine, SearchMatch};
pub use files::{FileSection, merge_files_to_context, split_context_to_files};
pub use structure::OutlineItem;

use std::sync::Arc;

/// Iteration cap for every regex scan.
pub const SCAN_CAP: usize = 1000;

/// Immutable context with query operations.
///
/// Cloning is cheap (the text is shared), which lets the sandbox and
/// the agent engine hold the same context without copying.
#[derive(Debug, Clone)]
pub struct ContextQuery {
    text: Arc<str>,
}

impl ContextQuery {
    /// Wraps a context string.
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self { text: text.into() }
    }

    /// The underlying text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl From<&str> for ContextQuery {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextQuery {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
