//! Chunk, rule, and build-output types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind tag for a chunk, derived from its dominant content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    /// A single function body.
    Function,
    /// A class (or impl-like) body.
    Class,
    /// A run of import statements.
    ImportBlock,
    /// Anything else, including merged small chunks.
    Block,
}

impl ChunkKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::ImportBlock => "import-block",
            Self::Block => "block",
        }
    }
}

/// A contiguous slice of one file: the unit of embedding and packing.
///
/// Byte and line spans are start-inclusive, end-exclusive. The id is
/// stable across re-indexing of unchanged content (see
/// [`crate::core::hash::chunk_id`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk identifier.
    pub id: String,
    /// Repo-relative path of the owning file.
    pub path: String,
    /// Byte span start (inclusive).
    pub start_byte: usize,
    /// Byte span end (exclusive).
    pub end_byte: usize,
    /// Line span start (inclusive, 1-indexed).
    pub start_line: usize,
    /// Line span end (exclusive).
    pub end_line: usize,
    /// Kind tag.
    pub kind: ChunkKind,
    /// 8-hex digest of the chunk body.
    pub content_hash: String,
    /// The chunk body itself.
    pub content: String,
}

impl Chunk {
    /// Character length of the chunk body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns `true` for an empty chunk body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Severity of a coding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Violations must be fixed.
    Error,
    /// Violations should be reviewed.
    Warning,
    /// Advisory only.
    Info,
}

impl Severity {
    /// Parses a severity string (case-insensitive); unknown maps to Info.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warning" | "warn" => Self::Warning,
            _ => Self::Info,
        }
    }

    /// Marker rendered in front of the rule text in built context.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Error => "🔴",
            Self::Warning => "🟡",
            Self::Info => "🔵",
        }
    }
}

/// A project constraint, ordered as declared in `context.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Rule text shown to the model.
    pub rule: String,
    /// Severity level.
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// Optional scope glob. A leading `!` marks an exclusion scope:
    /// files matching the rest of the glob are dropped from ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

const fn default_severity() -> Severity {
    Severity::Warning
}

/// Options for one context build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Developer goal. Empty means "infer from VCS state".
    pub goal: String,
    /// Optional target file anchoring structural scoring.
    pub target_file: Option<String>,
    /// Token budget for the packed output.
    pub max_tokens: usize,
    /// Whether to include project rules in the core text.
    pub include_rules: bool,
    /// Model id selecting the token counter.
    pub model: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            goal: String::new(),
            target_file: None,
            max_tokens: 8_000,
            include_rules: true,
            model: "gpt-4".to_string(),
        }
    }
}

/// Per-signal score breakdown for one ranked file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Goal-token overlap score in [0, 1].
    pub lexical: f32,
    /// Graph-distance score in [0, 1].
    pub structural: f32,
    /// Max cosine similarity in [0, 1] (0 when no embedding exists).
    pub vector: f32,
    /// Weighted sum, zeroed for scope-excluded files.
    pub final_score: f32,
}

/// A chunk selected into the built context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludedChunk {
    /// Stable chunk identifier.
    pub id: String,
    /// Kind tag.
    pub kind: ChunkKind,
    /// Line span start (1-indexed, inclusive).
    pub start_line: usize,
    /// Line span end (exclusive).
    pub end_line: usize,
    /// Chunk body.
    pub content: String,
}

/// One file in the built context, in rank order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludedFile {
    /// Repo-relative path.
    pub path: String,
    /// Score breakdown that earned this file its position.
    pub score: ScoreBreakdown,
    /// Chunks included for this file, in file order.
    pub chunks: Vec<IncludedChunk>,
    /// Token count of the included chunks under the build's counter.
    pub tokens: usize,
}

/// Token savings accounting for a built context.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Savings {
    /// Tokens the full candidate set would have cost.
    pub raw_tokens: usize,
    /// Tokens actually packed.
    pub packed_tokens: usize,
    /// `1 - packed/raw`, rounded to integer percent.
    pub percentage: u32,
}

impl Savings {
    /// Computes savings from raw and packed token counts.
    #[must_use]
    pub fn compute(raw_tokens: usize, packed_tokens: usize) -> Self {
        let denom = raw_tokens.max(1) as f64;
        let ratio = 1.0 - (packed_tokens as f64 / denom);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percentage = (ratio * 100.0).round().max(0.0) as u32;
        Self {
            raw_tokens,
            packed_tokens,
            percentage,
        }
    }
}

/// The builder's output: a packed excerpt of the codebase with rules
/// and accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltContext {
    /// The goal this context was built for (possibly inferred).
    pub goal: String,
    /// Files in rank order with their included chunks.
    pub files: Vec<IncludedFile>,
    /// Rules included in the core text, in declaration order.
    pub rules: Vec<Rule>,
    /// Total token count of the rendered context.
    pub total_tokens: usize,
    /// Savings versus packing every candidate file whole.
    pub savings: Savings,
    /// Candidate files considered by the ranker.
    pub candidates_considered: usize,
}

/// Result of one indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    /// Files parsed and (re)indexed this run.
    pub files_indexed: usize,
    /// Chunks produced this run.
    pub chunks_created: usize,
    /// Files skipped because their content hash was unchanged.
    pub files_skipped: usize,
    /// Nodes removed because their files no longer exist.
    pub files_removed: usize,
    /// Per-file warnings (unreadable, oversized, parse trouble).
    pub warnings: Vec<String>,
    /// Wall-clock duration of the run.
    #[serde(skip)]
    pub duration: Duration,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("error"), Severity::Error);
        assert_eq!(Severity::parse("WARNING"), Severity::Warning);
        assert_eq!(Severity::parse("warn"), Severity::Warning);
        assert_eq!(Severity::parse("info"), Severity::Info);
        assert_eq!(Severity::parse("whatever"), Severity::Info);
    }

    #[test]
    fn test_savings_compute() {
        let s = Savings::compute(1000, 250);
        assert_eq!(s.percentage, 75);

        let s = Savings::compute(0, 0);
        assert_eq!(s.percentage, 0);

        // Packed exceeding raw clamps at 0% rather than going negative.
        let s = Savings::compute(10, 20);
        assert_eq!(s.percentage, 0);
    }

    #[test]
    fn test_chunk_kind_as_str() {
        assert_eq!(ChunkKind::ImportBlock.as_str(), "import-block");
        assert_eq!(ChunkKind::Block.as_str(), "block");
    }

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: Rule = serde_yaml::from_str("rule: no println in prod code")
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(rule.severity, Severity::Warning);
        assert!(rule.scope.is_none());
    }
}
