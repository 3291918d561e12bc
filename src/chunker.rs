//! File chunking.
//!
//! Splits file text into a sequence of chunks using a sliding character
//! window with a configured overlap, preferring to cut at blank lines
//! near the window edge. Chunk spans cover the file in order; adjacent
//! chunks overlap by at most the configured overlap.

use unicode_segmentation::UnicodeSegmentation;

use crate::core::types::{Chunk, ChunkKind};
use crate::core::{chunk_id, short_hash};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1500;
/// Default overlap between adjacent windows, in characters.
pub const DEFAULT_OVERLAP: usize = 200;
/// Chunks whose combined length stays under this merge into one.
pub const DEFAULT_MIN_CHUNK: usize = 256;
/// How far back from the window edge a blank line is still preferred.
const BLANK_LINE_TOLERANCE: usize = 240;

/// Chunker configuration, in characters (not tokens).
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Window size.
    pub chunk_size: usize,
    /// Overlap between adjacent windows.
    pub overlap: usize,
    /// Merge threshold for [`merge_small_chunks`].
    pub min_chunk: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_chunk: DEFAULT_MIN_CHUNK,
        }
    }
}

/// Splits `text` into chunks for `path`.
///
/// Empty input yields the empty sequence. Window edges land on grapheme
/// boundaries; when a blank line occurs within the tolerance window of
/// the edge, the cut moves back to it so chunks tend to end at logical
/// breaks.
#[must_use]
pub fn chunk_file(path: &str, text: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every grapheme boundary, plus the end sentinel.
    let mut offsets: Vec<usize> = text.grapheme_indices(true).map(|(i, _)| i).collect();
    offsets.push(text.len());
    let total = offsets.len() - 1;

    let chunk_size = config.chunk_size.max(1);
    let overlap = config.overlap.min(chunk_size.saturating_sub(1));

    let line_starts = line_start_offsets(text);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let mut end = (start + chunk_size).min(total);

        if end < total {
            if let Some(cut) = blank_line_cut(text, &offsets, start, end) {
                end = cut;
            }
        }

        let start_byte = offsets[start];
        let end_byte = offsets[end];
        let content = &text[start_byte..end_byte];
        let content_hash = short_hash(content.as_bytes());

        chunks.push(Chunk {
            id: chunk_id(path, start_byte, end_byte, &content_hash),
            path: path.to_string(),
            start_byte,
            end_byte,
            start_line: line_of(&line_starts, start_byte) + 1,
            end_line: line_of(&line_starts, end_byte.saturating_sub(1)) + 2,
            kind: classify(content),
            content_hash,
            content: content.to_string(),
        });

        if end >= total {
            break;
        }
        // Step back by the overlap, but always make forward progress.
        start = (end.saturating_sub(overlap)).max(start + 1);
    }

    chunks
}

/// Merges adjacent chunks of the same file whose combined length falls
/// below the configured minimum. Merged chunks are re-sliced from
/// `text` (so the shared overlap is not duplicated) and their kind
/// reduces to [`ChunkKind::Block`].
#[must_use]
pub fn merge_small_chunks(path: &str, text: &str, chunks: Vec<Chunk>, min_chunk: usize) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let absorb = merged.last().is_some_and(|prev| {
            prev.path == chunk.path && prev.len() + chunk.len() < min_chunk
        });
        if absorb {
            if let Some(prev) = merged.last_mut() {
                let start_byte = prev.start_byte;
                let end_byte = chunk.end_byte.max(prev.end_byte);
                let content = &text[start_byte..end_byte];
                let content_hash = short_hash(content.as_bytes());
                prev.id = chunk_id(path, start_byte, end_byte, &content_hash);
                prev.end_byte = end_byte;
                prev.end_line = chunk.end_line.max(prev.end_line);
                prev.kind = ChunkKind::Block;
                prev.content_hash = content_hash;
                prev.content = content.to_string();
            }
        } else {
            merged.push(chunk);
        }
    }

    merged
}

/// Looks backward from the window edge for a blank line to cut at.
///
/// Returns the grapheme index just past the first newline of the latest
/// `\n\n` pair within the tolerance window, so the current chunk ends
/// with a newline and the blank line opens the next one.
fn blank_line_cut(text: &str, offsets: &[usize], start: usize, end: usize) -> Option<usize> {
    let tolerance_start = end.saturating_sub(BLANK_LINE_TOLERANCE).max(start + 1);
    let window = &text[offsets[tolerance_start]..offsets[end]];
    let rel = window.rfind("\n\n")?;
    let cut_byte = offsets[tolerance_start] + rel + 1;
    let cut = offsets.partition_point(|&o| o < cut_byte);
    // Never produce an empty chunk.
    (cut > start).then_some(cut)
}

/// Byte offsets where each line starts.
fn line_start_offsets(text: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// 0-indexed line containing `byte`.
fn line_of(line_starts: &[usize], byte: usize) -> usize {
    line_starts.partition_point(|&s| s <= byte).saturating_sub(1)
}

/// Tags a chunk by its leading content.
fn classify(content: &str) -> ChunkKind {
    let first = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim_start();

    if first.starts_with("import ")
        || first.starts_with("from ")
        || first.starts_with("use ")
        || first.starts_with("const ") && first.contains("require(")
    {
        ChunkKind::ImportBlock
    } else if first.starts_with("class ")
        || first.starts_with("export class ")
        || first.starts_with("struct ")
        || first.starts_with("pub struct ")
        || first.starts_with("enum ")
        || first.starts_with("pub enum ")
    {
        ChunkKind::Class
    } else if first.starts_with("function ")
        || first.starts_with("export function ")
        || first.starts_with("async function ")
        || first.starts_with("def ")
        || first.starts_with("async def ")
        || first.starts_with("fn ")
        || first.starts_with("pub fn ")
        || first.starts_with("pub async fn ")
    {
        ChunkKind::Function
    } else {
        ChunkKind::Block
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg(chunk_size: usize, overlap: usize) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size,
            overlap,
            min_chunk: 0,
        }
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_file("a.ts", "", &ChunkerConfig::default()).is_empty());
    }

    #[test]
    fn test_small_file_is_one_chunk() {
        let text = "export function foo() {}\n";
        let chunks = chunk_file("a.ts", text, &ChunkerConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].start_byte, 0);
        assert_eq!(chunks[0].end_byte, text.len());
        assert_eq!(chunks[0].content_hash.len(), 8);
    }

    #[test]
    fn test_spans_cover_file_in_order() {
        let text = "line one\n".repeat(200);
        let chunks = chunk_file("a.txt", &text, &cfg(300, 50));
        assert!(chunks.len() > 1);

        assert_eq!(chunks[0].start_byte, 0);
        assert_eq!(chunks.last().map(|c| c.end_byte), Some(text.len()));
        for pair in chunks.windows(2) {
            // Ordered, and the next chunk starts inside or at the end of
            // the previous one (never leaving a gap).
            assert!(pair[1].start_byte >= pair[0].start_byte);
            assert!(pair[1].start_byte <= pair[0].end_byte);
            // Overlap bounded by the configured window.
            assert!(pair[0].end_byte - pair[1].start_byte <= 50);
        }
    }

    #[test]
    fn test_blank_line_preferred() {
        let para = "x".repeat(180);
        let text = format!("{para}\n\n{para}\n\n{para}\n");
        let chunks = chunk_file("a.txt", &text, &cfg(300, 20));
        // First cut should land just after a blank-line newline rather
        // than mid-paragraph.
        assert!(chunks[0].content.ends_with('\n'));
        assert!(chunks[0].content.contains(&para));
        assert!(!chunks[0].content.ends_with('x'));
    }

    #[test]
    fn test_merge_small_chunks_reduces_kind() {
        let text = "use std::fmt;\n\nfn a() {}\n";
        let mut chunks = chunk_file("a.rs", text, &cfg(14, 0));
        assert!(chunks.len() > 1);
        chunks = merge_small_chunks("a.rs", text, chunks, 1_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Block);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_classify_kinds() {
        assert_eq!(classify("import x from 'y';\n"), ChunkKind::ImportBlock);
        assert_eq!(classify("use std::fmt;\n"), ChunkKind::ImportBlock);
        assert_eq!(classify("class Foo {\n}"), ChunkKind::Class);
        assert_eq!(classify("pub fn run() {}"), ChunkKind::Function);
        assert_eq!(classify("async def go():"), ChunkKind::Function);
        assert_eq!(classify("let x = 1;"), ChunkKind::Block);
    }

    #[test]
    fn test_multibyte_content_cuts_on_boundaries() {
        let text = "héllo wörld → ".repeat(100);
        let chunks = chunk_file("a.txt", &text, &cfg(64, 8));
        for chunk in &chunks {
            // Slicing at a non-boundary would have panicked inside
            // chunk_file; re-slice to be explicit.
            assert_eq!(&text[chunk.start_byte..chunk.end_byte], chunk.content);
        }
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_file(text in "[ -~\n]{0,2000}", size in 16usize..400, overlap in 0usize..64) {
            let chunks = chunk_file("p.txt", &text, &cfg(size, overlap));
            if text.is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(chunks[0].start_byte, 0);
                prop_assert_eq!(chunks.last().map(|c| c.end_byte), Some(text.len()));
                for pair in chunks.windows(2) {
                    prop_assert!(pair[1].start_byte <= pair[0].end_byte);
                    prop_assert!(pair[1].start_byte >= pair[0].start_byte);
                }
                for chunk in &chunks {
                    prop_assert_eq!(&text[chunk.start_byte..chunk.end_byte], &chunk.content);
                }
            }
        }
    }
}
