//! Token budgeting and packing.
//!
//! Packs the core text (project summary + rules) and then ranked file
//! chunks into a token budget. Token counts come from a per-model
//! characters-per-token ratio; one counter instance is used for the
//! whole packing pass so the accounting stays consistent.

use crate::core::types::{IncludedChunk, IncludedFile, Savings};
use crate::ranker::RankedFile;

/// Marker appended when the core text alone exceeds the budget.
const TRUNCATION_MARKER: &str = "\n… [truncated]";

/// Per-model token counter.
///
/// A fixed characters-per-token ratio approximates real tokenizers well
/// enough for packing decisions (≈4 for code-heavy models). Exotic
/// models can plug in a different ratio via [`TokenCounter::with_ratio`].
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    chars_per_token: f32,
}

impl TokenCounter {
    /// Creates a counter for the given model id.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        // Code-dense tokenizers run slightly hotter than prose.
        let chars_per_token = if model.contains("code") { 3.5 } else { 4.0 };
        Self { chars_per_token }
    }

    /// Creates a counter with an explicit ratio.
    #[must_use]
    pub fn with_ratio(chars_per_token: f32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(0.5),
        }
    }

    /// Token count for `text` (rounded up).
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let tokens = (text.chars().count() as f32 / self.chars_per_token).ceil() as usize;
        tokens.max(1)
    }
}

/// Result of one packing pass.
#[derive(Debug, Clone)]
pub struct PackedContext {
    /// Core text as included (possibly truncated with a marker).
    pub core_text: String,
    /// Files with their included chunks, in rank order.
    pub files: Vec<IncludedFile>,
    /// Tokens actually packed (core + chunks).
    pub total_tokens: usize,
    /// Savings versus the full candidate set.
    pub savings: Savings,
}

/// Packs `core_text` and then `ranked` chunks into `max_tokens`.
///
/// The core text is always included; if it alone exceeds the budget it
/// is truncated at a line boundary and a marker is appended. The
/// remaining budget is filled with whole chunks in rank order, file
/// order within a file; after the first chunk that would overflow,
/// smaller chunks from the remaining stream are still attempted before
/// stopping.
#[must_use]
pub fn pack(
    ranked: &[RankedFile],
    core_text: &str,
    max_tokens: usize,
    counter: TokenCounter,
) -> PackedContext {
    let (core_text, core_tokens) = fit_core_text(core_text, max_tokens, counter);
    let mut remaining = max_tokens.saturating_sub(core_tokens);

    let mut files: Vec<IncludedFile> = Vec::new();

    for file in ranked {
        let mut included: Vec<IncludedChunk> = Vec::new();
        let mut file_tokens = 0usize;

        for chunk in &file.chunks {
            let tokens = counter.count(&chunk.content);
            if tokens > remaining {
                // Doesn't fit: keep scanning, a smaller chunk further
                // down the stream may still fit.
                continue;
            }
            remaining -= tokens;
            file_tokens += tokens;
            included.push(IncludedChunk {
                id: chunk.id.clone(),
                kind: chunk.kind,
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                content: chunk.content.clone(),
            });
        }

        if !included.is_empty() {
            files.push(IncludedFile {
                path: file.path.clone(),
                score: file.score,
                chunks: included,
                tokens: file_tokens,
            });
        }

        if remaining == 0 {
            break;
        }
    }

    let packed_chunk_tokens: usize = files.iter().map(|f| f.tokens).sum();
    let total_tokens = core_tokens + packed_chunk_tokens;

    let raw_tokens = core_tokens
        + ranked
            .iter()
            .map(|f| counter.count_file_chars(f))
            .sum::<usize>();

    PackedContext {
        core_text,
        files,
        total_tokens,
        savings: Savings::compute(raw_tokens, total_tokens),
    }
}

impl TokenCounter {
    /// Tokens the whole file would cost, measured over the span its
    /// chunks cover (overlap is not double-counted).
    fn count_file_chars(&self, file: &RankedFile) -> usize {
        let chars = file
            .chunks
            .last()
            .map(|c| c.end_byte)
            .unwrap_or(0)
            .saturating_sub(file.chunks.first().map_or(0, |c| c.start_byte));
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let tokens = (chars as f32 / self.chars_per_token).ceil() as usize;
        tokens
    }
}

/// Fits the core text into the budget, truncating at a line boundary
/// with a marker when necessary.
fn fit_core_text(core_text: &str, max_tokens: usize, counter: TokenCounter) -> (String, usize) {
    let tokens = counter.count(core_text);
    if tokens <= max_tokens {
        return (core_text.to_string(), tokens);
    }

    let marker_tokens = counter.count(TRUNCATION_MARKER);
    let budget = max_tokens.saturating_sub(marker_tokens);

    let mut kept = String::new();
    for line in core_text.lines() {
        let candidate_tokens = counter.count(&kept) + counter.count(line) + 1;
        if candidate_tokens > budget {
            break;
        }
        kept.push_str(line);
        kept.push('\n');
    }
    kept.push_str(TRUNCATION_MARKER);
    let used = counter.count(&kept);
    (kept, used)
}
