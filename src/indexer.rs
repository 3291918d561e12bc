//! Index orchestration.
//!
//! Walks the project tree, skips unchanged files by content hash,
//! parses and chunks the rest on the blocking pool (rayon inside
//! `spawn_blocking`), embeds chunk batches, and lands everything in the
//! dependency graph and the vector store. The graph is flushed once,
//! atomically, at the end of the walk.
//!
//! Per-file problems (unreadable, oversized, non-UTF-8) are warnings on
//! the report; only failures on the output locations are fatal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::chunker::{ChunkerConfig, chunk_file, merge_small_chunks};
use crate::core::types::{Chunk, IndexReport};
use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::graph::DependencyGraph;
use crate::parser::{Language, parse};
use crate::store::VectorStore;

/// Default per-file size ceiling (bytes).
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 512 * 1024;

/// Directories excluded from every walk regardless of configuration.
const ALWAYS_IGNORED: &[&str] = &[
    "**/.git/**",
    "**/.contextos/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/__pycache__/**",
];

/// Embedding batch size.
const EMBED_BATCH: usize = 64;

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Project root to walk.
    pub root: PathBuf,
    /// Where the dependency graph JSON lives.
    pub graph_path: PathBuf,
    /// Where the vector store backing file lives.
    pub store_path: PathBuf,
    /// Extra ignore globs from `config.yaml`.
    pub ignore_patterns: Vec<String>,
    /// Per-file size ceiling in bytes.
    pub file_size_limit: u64,
    /// Chunker settings.
    pub chunker: ChunkerConfig,
}

impl IndexerConfig {
    /// Creates a config rooted at `root` with state under `state_dir`.
    #[must_use]
    pub fn new(root: &Path, state_dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            graph_path: state_dir.join("db").join("graph.json"),
            store_path: state_dir.join("db").join("vectors.db"),
            ignore_patterns: Vec::new(),
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// One file parsed and chunked, ready to land in the graph and store.
struct ParsedFile {
    path: String,
    language: Language,
    imports: Vec<String>,
    exports: Vec<String>,
    content: String,
    chunks: Vec<Chunk>,
}

/// Owns the graph and vector store for one project root.
///
/// The builder borrows read access through [`Indexer::graph`] and
/// [`Indexer::store`]; all writes go through [`Indexer::index`].
pub struct Indexer {
    config: IndexerConfig,
    graph: DependencyGraph,
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("root", &self.config.root)
            .field("nodes", &self.graph.node_count())
            .finish_non_exhaustive()
    }
}

impl Indexer {
    /// Opens the indexer, loading existing graph and store state.
    pub fn open(config: IndexerConfig, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        let graph = DependencyGraph::load(&config.graph_path);
        let store = VectorStore::open(&config.store_path).map_err(|e| IndexError::Output {
            path: config.store_path.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            config,
            graph,
            store,
            embedder,
        })
    }

    /// Read access to the dependency graph.
    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Read access to the vector store.
    #[must_use]
    pub const fn store(&self) -> &VectorStore {
        &self.store
    }

    /// The configuration this indexer was opened with.
    #[must_use]
    pub const fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Indexes the tree.
    ///
    /// With `force` false, files whose content hash matches the graph's
    /// record are skipped. Nodes for files that no longer exist are
    /// removed. Does not return until graph and vector-store writes are
    /// durable.
    pub async fn index(&mut self, force: bool) -> Result<IndexReport, IndexError> {
        let start = Instant::now();
        let mut report = IndexReport::default();

        let ignore_set = build_ignore_set(&self.config.ignore_patterns);
        let entries = walk_tree(&self.config, &ignore_set, &mut report)?;

        let mut seen: HashSet<String> = HashSet::with_capacity(entries.len());
        let mut pending: Vec<(String, String)> = Vec::new();

        for (rel, abs) in entries {
            seen.insert(rel.clone());
            match tokio::fs::read_to_string(&abs).await {
                Ok(content) => {
                    if !force && !self.graph.has_changed(&rel, &content) {
                        report.files_skipped += 1;
                        continue;
                    }
                    pending.push((rel, content));
                }
                Err(e) => {
                    report.warnings.push(
                        IndexError::FileUnreadable {
                            path: PathBuf::from(&rel),
                            message: e.to_string(),
                        }
                        .to_string(),
                    );
                }
            }
        }

        // Parse and chunk on the blocking pool; rayon fans the batch out.
        let chunker = self.config.chunker;
        let parsed: Vec<ParsedFile> = tokio::task::spawn_blocking(move || {
            pending
                .into_par_iter()
                .map(|(path, content)| parse_one(&path, content, &chunker))
                .collect()
        })
        .await
        .map_err(|e| IndexError::Walk {
            root: self.config.root.clone(),
            message: format!("parse task failed: {e}"),
        })?;

        // Embed in batches; a failed batch degrades to structural-only.
        let all_chunks: Vec<Chunk> = parsed.iter().flat_map(|p| p.chunks.clone()).collect();
        let vectors = self.embed_chunks(&all_chunks, &mut report).await;

        // Land nodes and vectors. Writes are serialized through self.
        for file in &parsed {
            self.graph.add_node(
                &file.path,
                file.imports.clone(),
                file.exports.clone(),
                file.language,
                &file.content,
            );
            self.store
                .delete_for_path(&file.path)
                .map_err(|e| self.output_err(e))?;
            report.files_indexed += 1;
            report.chunks_created += file.chunks.len();
        }
        if let Some(vectors) = vectors {
            self.store
                .add_chunks(&all_chunks, &vectors)
                .map_err(|e| self.output_err(e))?;
        }

        // Drop nodes for files that disappeared.
        for path in self.graph.paths() {
            if !seen.contains(&path) {
                self.graph.remove_node(&path);
                self.store
                    .delete_for_path(&path)
                    .map_err(|e| self.output_err(e))?;
                report.files_removed += 1;
            }
        }

        // Single atomic flush at the end of the walk.
        self.graph.save(&self.config.graph_path)?;

        report.duration = start.elapsed();
        debug!(
            files = report.files_indexed,
            chunks = report.chunks_created,
            skipped = report.files_skipped,
            removed = report.files_removed,
            "index complete"
        );
        Ok(report)
    }

    /// Embeds chunk bodies in batches on the blocking pool.
    ///
    /// Returns `None` (with a warning) when the embedder fails; the
    /// index still succeeds, vector search just comes back empty.
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        report: &mut IndexReport,
    ) -> Option<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Some(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let bodies: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

        let result = tokio::task::spawn_blocking(move || {
            let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(bodies.len());
            for batch in bodies.chunks(EMBED_BATCH) {
                let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
                vectors.extend(embedder.embed(&refs)?);
            }
            Ok::<_, anyhow::Error>(vectors)
        })
        .await;

        match result {
            Ok(Ok(vectors)) => Some(vectors),
            Ok(Err(e)) => {
                warn!("embedding failed ({e}); indexing without vectors");
                report
                    .warnings
                    .push(format!("embedding unavailable: {e}"));
                None
            }
            Err(e) => {
                warn!("embedding task failed ({e}); indexing without vectors");
                report.warnings.push(format!("embedding task failed: {e}"));
                None
            }
        }
    }

    fn output_err(&self, e: crate::error::StoreError) -> IndexError {
        IndexError::Output {
            path: self.config.store_path.clone(),
            message: e.to_string(),
        }
    }
}

/// Parses and chunks one file. Pure CPU work.
fn parse_one(path: &str, content: String, chunker: &ChunkerConfig) -> ParsedFile {
    let language = Language::from_path(path);
    let summary = parse(&content, language);
    let chunks = merge_small_chunks(
        path,
        &content,
        chunk_file(path, &content, chunker),
        chunker.min_chunk,
    );
    ParsedFile {
        path: path.to_string(),
        language,
        imports: summary.imports.iter().map(|i| i.source.clone()).collect(),
        exports: summary.exports,
        content,
        chunks,
    }
}

/// Walks the tree, honoring standard filters plus the configured ignore
/// globs. Oversized files become warnings. Returns `(rel, abs)` pairs
/// with forward-slash relative paths, sorted for determinism.
fn walk_tree(
    config: &IndexerConfig,
    ignore_set: &GlobSet,
    report: &mut IndexReport,
) -> Result<Vec<(String, PathBuf)>, IndexError> {
    if !config.root.is_dir() {
        return Err(IndexError::Walk {
            root: config.root.clone(),
            message: "not a directory".to_string(),
        });
    }

    let mut entries = Vec::new();
    for item in WalkBuilder::new(&config.root).standard_filters(true).build() {
        let Ok(entry) = item else { continue };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let abs = entry.into_path();
        let Ok(rel) = abs.strip_prefix(&config.root) else {
            continue;
        };
        let rel_str = rel.to_string_lossy().replace('\\', "/");

        if ignore_set.is_match(&rel_str) {
            continue;
        }

        let size = std::fs::metadata(&abs).map(|m| m.len()).unwrap_or(0);
        if size > config.file_size_limit {
            report.warnings.push(
                IndexError::FileTooLarge {
                    path: PathBuf::from(&rel_str),
                    size,
                    limit: config.file_size_limit,
                }
                .to_string(),
            );
            continue;
        }

        entries.push((rel_str, abs));
    }

    entries.sort();
    Ok(entries)
}

/// Builds the exclusion set: built-in junk directories plus configured
/// patterns. Unparseable globs are skipped with a warning.
fn build_ignore_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in ALWAYS_IGNORED {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("invalid ignore pattern {pattern:?}: {e}"),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("mkdir failed: {e}"));
        }
        std::fs::write(path, content).unwrap_or_else(|e| panic!("write failed: {e}"));
    }

    fn setup(root: &Path) -> Indexer {
        let state = root.join(".contextos");
        let config = IndexerConfig::new(root, &state);
        Indexer::open(config, Arc::new(HashEmbedder)).unwrap_or_else(|e| panic!("open failed: {e}"))
    }

    #[tokio::test]
    async fn test_index_small_tree() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        write(dir.path(), "src/index.ts", "import { helper } from './util';\nexport function main() {}\n");
        write(dir.path(), "src/util.ts", "export function helper() {}\n");

        let mut indexer = setup(dir.path());
        let report = indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));

        assert_eq!(report.files_indexed, 2);
        assert!(report.chunks_created >= 2);
        assert!(report.warnings.is_empty());
        assert_eq!(indexer.graph().node_count(), 2);
        assert_eq!(
            indexer.graph().direct_imports("src/index.ts"),
            vec!["./util"]
        );
        // Graph persisted.
        assert!(dir.path().join(".contextos/db/graph.json").is_file());
    }

    #[tokio::test]
    async fn test_reindex_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        write(dir.path(), "a.ts", "export const a = 1;\n");

        let mut indexer = setup(dir.path());
        let first = indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        assert_eq!(first.files_indexed, 1);

        let second = indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("reindex failed: {e}"));
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 1);

        // force re-parses everything.
        let forced = indexer
            .index(true)
            .await
            .unwrap_or_else(|e| panic!("forced reindex failed: {e}"));
        assert_eq!(forced.files_indexed, 1);
    }

    #[tokio::test]
    async fn test_removed_files_drop_from_graph() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        write(dir.path(), "a.ts", "export const a = 1;\n");
        write(dir.path(), "b.ts", "export const b = 2;\n");

        let mut indexer = setup(dir.path());
        indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        assert_eq!(indexer.graph().node_count(), 2);

        std::fs::remove_file(dir.path().join("b.ts"))
            .unwrap_or_else(|e| panic!("remove failed: {e}"));
        let report = indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("reindex failed: {e}"));
        assert_eq!(report.files_removed, 1);
        assert_eq!(indexer.graph().node_count(), 1);
        assert!(indexer.graph().node("b.ts").is_none());
    }

    #[tokio::test]
    async fn test_oversized_file_is_warning() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        write(dir.path(), "big.ts", &"x".repeat(2048));
        write(dir.path(), "ok.ts", "export const ok = 1;\n");

        let state = dir.path().join(".contextos");
        let mut config = IndexerConfig::new(dir.path(), &state);
        config.file_size_limit = 1024;
        let mut indexer = Indexer::open(config, Arc::new(HashEmbedder))
            .unwrap_or_else(|e| panic!("open failed: {e}"));

        let report = indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("big.ts"));
    }

    #[tokio::test]
    async fn test_ignore_patterns_respected() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        write(dir.path(), "src/a.ts", "export const a = 1;\n");
        write(dir.path(), "gen/out.ts", "export const out = 1;\n");

        let state = dir.path().join(".contextos");
        let mut config = IndexerConfig::new(dir.path(), &state);
        config.ignore_patterns = vec!["gen/**".to_string()];
        let mut indexer = Indexer::open(config, Arc::new(HashEmbedder))
            .unwrap_or_else(|e| panic!("open failed: {e}"));

        indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        assert!(indexer.graph().node("src/a.ts").is_some());
        assert!(indexer.graph().node("gen/out.ts").is_none());
    }

    #[tokio::test]
    async fn test_vectors_land_in_store() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        write(dir.path(), "a.ts", "export function searchIndex() { return 42; }\n");

        let mut indexer = setup(dir.path());
        indexer
            .index(false)
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        let stats = indexer
            .store()
            .stats()
            .unwrap_or_else(|e| panic!("stats failed: {e}"));
        assert!(stats.vector_count >= 1);
    }
}
