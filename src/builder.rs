//! Context building orchestration.
//!
//! Drives ranker and budgeter over the indexed project: lazily loads
//! the graph and vector store (one initialization shared by concurrent
//! callers; a failure clears the memo so a retry can succeed), infers
//! a goal from VCS state when the caller gave none, packs the result,
//! renders the Markdown wire format, and caches it under
//! `cache/last-context.md`. The builder never mutates the graph or
//! the store.

use std::sync::{Arc, Mutex};

use globset::{Glob, GlobSetBuilder};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::agent::message::{CompletionRequest, user_message};
use crate::agent::provider::LlmProvider;
use crate::budget::{PackedContext, TokenCounter, pack};
use crate::chunker::{chunk_file, merge_small_chunks};
use crate::config::Project;
use crate::core::types::{BuildOptions, BuiltContext, Chunk, Rule};
use crate::embedding::Embedder;
use crate::error::ContextError;
use crate::graph::DependencyGraph;
use crate::ranker::Ranker;
use crate::store::VectorStore;
use crate::vcs::ChangeSource;

/// Confidence floor for accepting an LLM-inferred goal.
const GOAL_CONFIDENCE_FLOOR: f64 = 0.5;
/// How many changed paths the fallback goal lists.
const FALLBACK_GOAL_PATHS: usize = 5;
/// Goal used when nothing else is known.
const DEFAULT_GOAL: &str = "General code exploration";

const GOAL_INFERENCE_PROMPT: &str = "You are given a diff of in-progress changes. \
     State the developer's goal in one short imperative sentence. Respond with JSON only: \
     {\"goal\": \"...\", \"confidence\": 0.0-1.0}.";

/// Loaded read-only index state.
struct ProjectIndex {
    graph: DependencyGraph,
    store: Mutex<VectorStore>,
}

/// Builds packed contexts for one project.
pub struct ContextBuilder {
    project: Project,
    embedder: Arc<dyn Embedder>,
    change_source: Option<Arc<dyn ChangeSource>>,
    llm: Option<Arc<dyn LlmProvider>>,
    index: OnceCell<Arc<ProjectIndex>>,
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("root", &self.project.root)
            .field("initialized", &self.index.initialized())
            .finish_non_exhaustive()
    }
}

impl ContextBuilder {
    /// Creates a builder for `project`.
    #[must_use]
    pub fn new(project: Project, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            project,
            embedder,
            change_source: None,
            llm: None,
            index: OnceCell::new(),
        }
    }

    /// Attaches a change source for goal inference.
    #[must_use]
    pub fn with_change_source(mut self, source: Arc<dyn ChangeSource>) -> Self {
        self.change_source = Some(source);
        self
    }

    /// Attaches an LLM used to refine inferred goals.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Builds a packed context.
    ///
    /// # Errors
    ///
    /// Initialization failures (unopenable store) and cache-write
    /// failures; ranking and packing themselves cannot fail.
    pub async fn build(&self, options: &BuildOptions) -> Result<BuiltContext, ContextError> {
        let index = self.initialize().await?;

        let goal = if options.goal.trim().is_empty() {
            self.infer_goal().await
        } else {
            options.goal.clone()
        };

        let candidates = self.load_candidates(&index.graph).await;
        let candidates_considered = candidates.len();

        let goal_vector = self
            .embedder
            .embed(&[goal.as_str()])
            .ok()
            .and_then(|mut v| (!v.is_empty()).then(|| v.remove(0)));

        let recent = self.recent_changes().await;
        let rules = &self.project.context.constraints;

        let ranked = {
            let store = index.store.lock().map_err(|_| ContextError::Io {
                path: self.project.store_path(),
                source: std::io::Error::other("vector store mutex poisoned"),
            })?;
            let mut ranker = Ranker::new(&index.graph, Some(&store));
            if let Some(exclusions) = self.context_ignore_set() {
                ranker = ranker.with_exclusions(exclusions);
            }
            if !recent.is_empty() {
                ranker = ranker.with_recent_origins(recent);
            }
            ranker.rank(
                &goal,
                options.target_file.as_deref(),
                candidates,
                rules,
                goal_vector.as_deref(),
            )
        };

        let included_rules: Vec<Rule> = if options.include_rules {
            rules.clone()
        } else {
            Vec::new()
        };
        let core_text = self.core_text(&goal, &included_rules);

        let counter = TokenCounter::for_model(&options.model);
        let packed = pack(&ranked, &core_text, options.max_tokens, counter);

        let built = BuiltContext {
            goal,
            files: packed.files.clone(),
            rules: included_rules,
            total_tokens: packed.total_tokens,
            savings: packed.savings,
            candidates_considered,
        };

        self.write_cache(&packed, &built)?;
        debug!(
            files = built.files.len(),
            tokens = built.total_tokens,
            savings = built.savings.percentage,
            "context built"
        );
        Ok(built)
    }

    /// Shared lazy initialization. Concurrent callers await the same
    /// pending load; on failure the cell stays empty so the next call
    /// retries.
    async fn initialize(&self) -> Result<Arc<ProjectIndex>, ContextError> {
        self.index
            .get_or_try_init(|| async {
                let graph = DependencyGraph::load(&self.project.graph_path());
                let store =
                    VectorStore::open(&self.project.store_path()).map_err(|e| ContextError::Io {
                        path: self.project.store_path(),
                        source: std::io::Error::other(e.to_string()),
                    })?;
                debug!(nodes = graph.node_count(), "builder initialized");
                Ok(Arc::new(ProjectIndex {
                    graph,
                    store: Mutex::new(store),
                }))
            })
            .await
            .cloned()
    }

    /// Reads and chunks every indexed file for ranking and packing.
    async fn load_candidates(&self, graph: &DependencyGraph) -> Vec<(String, Vec<Chunk>)> {
        let chunker = self.project.indexer_config().chunker;
        let mut candidates = Vec::new();
        for path in graph.paths() {
            let abs = self.project.root.join(&path);
            match tokio::fs::read_to_string(&abs).await {
                Ok(content) => {
                    let chunks = merge_small_chunks(
                        &path,
                        &content,
                        chunk_file(&path, &content, &chunker),
                        chunker.min_chunk,
                    );
                    candidates.push((path, chunks));
                }
                Err(e) => {
                    warn!("{path}: unreadable at build time ({e}), skipped");
                }
            }
        }
        candidates
    }

    /// Infers a goal from VCS state, optionally refined by the LLM.
    async fn infer_goal(&self) -> String {
        let Some(source) = &self.change_source else {
            return DEFAULT_GOAL.to_string();
        };

        let staged = source.staged_files().await.unwrap_or_default();
        let (files, diff) = if staged.is_empty() {
            let working = source.working_files().await.unwrap_or_default();
            let diff = source.working_diff().await.unwrap_or_default();
            (working, diff)
        } else {
            let diff = source.staged_diff().await.unwrap_or_default();
            (staged, diff)
        };

        if files.is_empty() {
            return DEFAULT_GOAL.to_string();
        }

        if let Some(goal) = self.refine_goal(&diff).await {
            return goal;
        }

        let shown: Vec<&str> = files
            .iter()
            .take(FALLBACK_GOAL_PATHS)
            .map(String::as_str)
            .collect();
        let more = files.len().saturating_sub(FALLBACK_GOAL_PATHS);
        if more > 0 {
            format!("Modifying: {} (+{more} more)", shown.join(", "))
        } else {
            format!("Modifying: {}", shown.join(", "))
        }
    }

    /// Asks the LLM for a goal; accepted only above the confidence
    /// floor.
    async fn refine_goal(&self, diff: &str) -> Option<String> {
        #[derive(Deserialize)]
        struct Inferred {
            goal: String,
            #[serde(default)]
            confidence: f64,
        }

        let llm = self.llm.as_ref()?;
        if diff.trim().is_empty() {
            return None;
        }

        let summary = self.project.summary();
        let request = CompletionRequest {
            model: "gpt-5-mini-2025-08-07".to_string(),
            system_prompt: GOAL_INFERENCE_PROMPT.to_string(),
            messages: vec![user_message(&format!("{summary}\n\n{diff}"))],
            temperature: Some(0.0),
            max_tokens: Some(128),
            stop_sequences: Vec::new(),
        };

        let response = llm.complete(&request).await.ok()?;
        let inferred: Inferred = serde_json::from_str(response.content.trim()).ok()?;
        (inferred.confidence >= GOAL_CONFIDENCE_FLOOR).then_some(inferred.goal)
    }

    /// The VCS working set, for structural scoring without a target.
    async fn recent_changes(&self) -> Vec<String> {
        let Some(source) = &self.change_source else {
            return Vec::new();
        };
        let staged = source.staged_files().await.unwrap_or_default();
        if staged.is_empty() {
            source.working_files().await.unwrap_or_default()
        } else {
            staged
        }
    }

    fn context_ignore_set(&self) -> Option<globset::GlobSet> {
        if self.project.context_ignore.is_empty() {
            return None;
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.project.context_ignore {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!(".contextignore: invalid glob {pattern:?}: {e}"),
            }
        }
        builder.build().ok()
    }

    /// Renders the always-included head of the context.
    fn core_text(&self, goal: &str, rules: &[Rule]) -> String {
        let mut out = String::from("# Project Context\n\n");
        out.push_str(&format!("**Goal:** {goal}\n"));

        let summary = self.project.summary();
        if !summary.is_empty() {
            out.push('\n');
            out.push_str(&summary);
            out.push('\n');
        }

        if !rules.is_empty() {
            out.push_str("\n## Coding Rules\n");
            for rule in rules {
                out.push_str(&format!("{} {}\n", rule.severity.icon(), rule.rule));
            }
        }
        out
    }

    /// Writes the rendered Markdown to `cache/last-context.md`.
    fn write_cache(&self, packed: &PackedContext, built: &BuiltContext) -> Result<(), ContextError> {
        let markdown = render_markdown(packed, built);
        let path = self.project.last_context_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContextError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&path, markdown).map_err(|e| ContextError::Io { path, source: e })
    }
}

/// Renders the Markdown wire format.
#[must_use]
pub fn render_markdown(packed: &PackedContext, built: &BuiltContext) -> String {
    let mut out = packed.core_text.clone();
    if !out.ends_with('\n') {
        out.push('\n');
    }

    if !packed.files.is_empty() {
        out.push_str("\n## Relevant Files\n");
        for file in &packed.files {
            out.push_str(&format!("### {}\n", file.path));
            for chunk in &file.chunks {
                out.push_str("```\n");
                out.push_str(&chunk.content);
                if !chunk.content.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("```\n");
            }
        }
    }

    out.push_str(&format!(
        "\n---\n*Context: {} tokens | {} files | {}% token savings*\n",
        built.total_tokens,
        built.files.len(),
        built.savings.percentage
    ));
    out
}
