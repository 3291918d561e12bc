//! Shared domain types used across the indexing and build pipelines.
//!
//! These types live outside the component modules so that the parser,
//! chunker, graph, ranker, budgeter, and agent engine can exchange data
//! without depending on one another.

pub mod hash;
pub mod types;

pub use hash::{chunk_id, content_hash, short_hash};
pub use types::{
    BuildOptions, BuiltContext, Chunk, ChunkKind, IncludedChunk, IncludedFile, IndexReport, Rule,
    Savings, ScoreBreakdown, Severity,
};
