//! Hybrid file ranking.
//!
//! Combines three signals per candidate file (lexical goal-token
//! overlap, structural graph proximity, vector similarity) into a
//! single weighted score. Files excluded by a rule scope are zeroed.
//! The ranker returns every file with a non-zero final score; the
//! budgeter decides what actually fits.

use std::collections::HashMap;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::core::types::{Chunk, Rule, ScoreBreakdown};
use crate::graph::DependencyGraph;
use crate::store::VectorStore;

/// Minimum goal-token length; shorter tokens are noise.
const MIN_TOKEN_LEN: usize = 4;
/// How many recently changed files seed structural scoring when no
/// target file is given.
const RECENT_ORIGINS: usize = 10;

/// Signal weights. The vector signal carries the most weight when an
/// embedding exists; lexical overlap dominates when it does not.
#[derive(Debug, Clone, Copy)]
pub struct RankWeights {
    /// Weight of the lexical overlap signal.
    pub lexical: f32,
    /// Weight of the structural proximity signal.
    pub structural: f32,
    /// Weight of the vector similarity signal.
    pub vector: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            lexical: 0.35,
            structural: 0.25,
            vector: 0.40,
        }
    }
}

/// One ranked candidate with its chunks.
#[derive(Debug, Clone)]
pub struct RankedFile {
    /// Repo-relative path.
    pub path: String,
    /// Per-signal breakdown.
    pub score: ScoreBreakdown,
    /// The file's chunks, in file order.
    pub chunks: Vec<Chunk>,
}

/// Hybrid ranker over a graph and an optional vector store.
pub struct Ranker<'a> {
    graph: &'a DependencyGraph,
    store: Option<&'a VectorStore>,
    weights: RankWeights,
    exclusions: Option<GlobSet>,
    recent_origins: Option<Vec<String>>,
}

impl<'a> Ranker<'a> {
    /// Creates a ranker.
    #[must_use]
    pub fn new(graph: &'a DependencyGraph, store: Option<&'a VectorStore>) -> Self {
        Self {
            graph,
            store,
            weights: RankWeights::default(),
            exclusions: None,
            recent_origins: None,
        }
    }

    /// Sets the recently-changed file set seeding structural scoring
    /// when no target file is given (normally the VCS working set).
    /// Without it, the most recently indexed nodes are used.
    #[must_use]
    pub fn with_recent_origins(mut self, origins: Vec<String>) -> Self {
        self.recent_origins = Some(origins);
        self
    }

    /// Overrides the default weights.
    #[must_use]
    pub const fn with_weights(mut self, weights: RankWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Adds extra exclusion globs (e.g. from `.contextignore`).
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: GlobSet) -> Self {
        self.exclusions = Some(exclusions);
        self
    }

    /// Ranks `candidates` against `goal`.
    ///
    /// `goal_vector` is the goal's embedding, if one is available;
    /// without it (or without a store) the vector signal is 0 for every
    /// file and ranking degrades to lexical/structural. Ties break
    /// lexicographically on path; zero-score files are dropped.
    #[must_use]
    pub fn rank(
        &self,
        goal: &str,
        target_file: Option<&str>,
        candidates: Vec<(String, Vec<Chunk>)>,
        rules: &[Rule],
        goal_vector: Option<&[f32]>,
    ) -> Vec<RankedFile> {
        let goal_tokens = goal_tokens(goal);
        let structural_scores = self.structural_scores(target_file);
        let vector_scores = self.vector_scores(goal_vector);
        let rule_exclusions = rule_exclusions(rules);

        let mut ranked: Vec<RankedFile> = candidates
            .into_iter()
            .map(|(path, chunks)| {
                let lexical = self.lexical_score(&goal_tokens, &path, &chunks);
                let structural = structural_scores.get(&path).copied().unwrap_or(0.0);
                let vector = vector_scores.get(&path).copied().unwrap_or(0.0).max(0.0);

                let excluded = rule_exclusions
                    .as_ref()
                    .is_some_and(|set| set.is_match(&path))
                    || self
                        .exclusions
                        .as_ref()
                        .is_some_and(|set| set.is_match(&path));

                let final_score = if excluded {
                    0.0
                } else {
                    self.weights
                        .lexical
                        .mul_add(lexical, self.weights.structural.mul_add(structural, self.weights.vector * vector))
                };

                RankedFile {
                    path,
                    score: ScoreBreakdown {
                        lexical,
                        structural,
                        vector,
                        final_score,
                    },
                    chunks,
                }
            })
            .filter(|f| f.score.final_score > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .final_score
                .partial_cmp(&a.score.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });

        debug!(candidates = ranked.len(), "ranking complete");
        ranked
    }

    /// Fraction of goal tokens found in the path, exported symbols, or
    /// chunk contents.
    fn lexical_score(&self, goal_tokens: &[String], path: &str, chunks: &[Chunk]) -> f32 {
        if goal_tokens.is_empty() {
            return 0.0;
        }

        let path_lower = path.to_lowercase();
        let symbols: Vec<String> = self
            .graph
            .node(path)
            .map(|n| n.exports.iter().map(|e| e.to_lowercase()).collect())
            .unwrap_or_default();

        let hits = goal_tokens
            .iter()
            .filter(|token| {
                path_lower.contains(token.as_str())
                    || symbols.iter().any(|s| s.contains(token.as_str()))
                    || chunks
                        .iter()
                        .any(|c| c.content.to_lowercase().contains(token.as_str()))
            })
            .count();

        #[allow(clippy::cast_precision_loss)]
        let score = hits as f32 / goal_tokens.len() as f32;
        score
    }

    /// Structural proximity per path.
    ///
    /// With a target file: that file's distance scores. Without one:
    /// the best score over the recently changed set, or all zeros when
    /// the graph has no history.
    fn structural_scores(&self, target_file: Option<&str>) -> HashMap<String, f32> {
        if let Some(target) = target_file {
            return self.graph.distance_scores(target);
        }

        let origins = self.recent_origins.clone().unwrap_or_else(|| {
            self.graph.recently_changed(RECENT_ORIGINS)
        });

        let mut best: HashMap<String, f32> = HashMap::new();
        for origin in origins {
            for (path, score) in self.graph.distance_scores(&origin) {
                let entry = best.entry(path).or_insert(0.0);
                if score > *entry {
                    *entry = score;
                }
            }
        }
        best
    }

    /// Max cosine similarity per path, or empty without a store/vector.
    fn vector_scores(&self, goal_vector: Option<&[f32]>) -> HashMap<String, f32> {
        match (self.store, goal_vector) {
            (Some(store), Some(v)) => store.max_similarity_by_path(v).unwrap_or_default(),
            _ => HashMap::new(),
        }
    }
}

/// Tokenizes a goal: split on whitespace/punctuation, lowercase, drop
/// tokens shorter than [`MIN_TOKEN_LEN`], dedupe preserving order.
#[must_use]
pub fn goal_tokens(goal: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in goal.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if token.len() < MIN_TOKEN_LEN {
            continue;
        }
        let lower = token.to_lowercase();
        if !tokens.contains(&lower) {
            tokens.push(lower);
        }
    }
    tokens
}

/// Compiles the exclusion globs out of rule scopes.
///
/// A scope of the form `!<glob>` excludes matching files from ranking;
/// other scopes only scope where the rule text applies.
fn rule_exclusions(rules: &[Rule]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut any = false;
    for rule in rules {
        if let Some(scope) = rule.scope.as_deref()
            && let Some(pattern) = scope.strip_prefix('!')
            && let Ok(glob) = Glob::new(pattern)
        {
            builder.add(glob);
            any = true;
        }
    }
    if any { builder.build().ok() } else { None }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::core::types::{ChunkKind, Severity};
    use crate::parser::Language;

    fn chunk_for(path: &str, content: &str) -> Chunk {
        Chunk {
            id: format!("{path}-0"),
            path: path.to_string(),
            start_byte: 0,
            end_byte: content.len(),
            start_line: 1,
            end_line: 2,
            kind: ChunkKind::Block,
            content_hash: "00000000".to_string(),
            content: content.to_string(),
        }
    }

    fn simple_graph() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_node(
            "src/auth.ts",
            vec!["./session".to_string()],
            vec!["login".to_string(), "logout".to_string()],
            Language::Typescript,
            "auth body",
        );
        g.add_node(
            "src/session.ts",
            Vec::new(),
            vec!["Session".to_string()],
            Language::Typescript,
            "session body",
        );
        g.add_node(
            "src/billing.ts",
            Vec::new(),
            vec!["invoice".to_string()],
            Language::Typescript,
            "billing body",
        );
        g
    }

    fn candidates() -> Vec<(String, Vec<Chunk>)> {
        vec![
            (
                "src/auth.ts".to_string(),
                vec![chunk_for("src/auth.ts", "export function login() {}")],
            ),
            (
                "src/session.ts".to_string(),
                vec![chunk_for("src/session.ts", "export class Session {}")],
            ),
            (
                "src/billing.ts".to_string(),
                vec![chunk_for("src/billing.ts", "export function invoice() {}")],
            ),
        ]
    }

    #[test]
    fn test_goal_tokens_drop_short_and_dedupe() {
        let tokens = goal_tokens("fix the login flow, login again");
        assert_eq!(tokens, vec!["login", "flow", "again"]);
    }

    #[test]
    fn test_lexical_ranking_prefers_matching_file() {
        let graph = simple_graph();
        let ranker = Ranker::new(&graph, None);
        let ranked = ranker.rank("modify login handling", None, candidates(), &[], None);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].path, "src/auth.ts");
        assert!(ranked[0].score.lexical > 0.0);
        assert!(ranked[0].score.vector.abs() < f32::EPSILON);
    }

    #[test]
    fn test_target_file_boosts_structural_neighbors() {
        let graph = simple_graph();
        let ranker = Ranker::new(&graph, None);
        let ranked = ranker.rank(
            "update session expiry logic",
            Some("src/auth.ts"),
            candidates(),
            &[],
            None,
        );
        let session = ranked
            .iter()
            .find(|f| f.path == "src/session.ts")
            .unwrap_or_else(|| panic!("session not ranked"));
        let billing = ranked.iter().find(|f| f.path == "src/billing.ts");
        assert!(session.score.structural > 0.0);
        // billing is disconnected from auth: zero structural score.
        if let Some(billing) = billing {
            assert!(billing.score.structural.abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_rule_exclusion_zeroes_file() {
        let graph = simple_graph();
        let ranker = Ranker::new(&graph, None);
        let rules = vec![Rule {
            rule: "billing code is frozen for the audit".to_string(),
            severity: Severity::Error,
            scope: Some("!src/billing.*".to_string()),
        }];
        let ranked = ranker.rank("billing invoice totals", None, candidates(), &rules, None);
        assert!(ranked.iter().all(|f| f.path != "src/billing.ts"));
    }

    #[test]
    fn test_deterministic_tie_break() {
        let graph = DependencyGraph::new();
        let ranker = Ranker::new(&graph, None);
        let candidates = vec![
            ("b.ts".to_string(), vec![chunk_for("b.ts", "login here")]),
            ("a.ts".to_string(), vec![chunk_for("a.ts", "login here")]),
        ];
        let ranked = ranker.rank("login", None, candidates, &[], None);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].path, "a.ts");
        assert_eq!(ranked[1].path, "b.ts");
    }

    #[test]
    fn test_zero_score_files_dropped() {
        let graph = DependencyGraph::new();
        let ranker = Ranker::new(&graph, None);
        let ranked = ranker.rank(
            "completely unrelated query terms",
            None,
            vec![("x.ts".to_string(), vec![chunk_for("x.ts", "nothing here")])],
            &[],
            None,
        );
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_vector_signal_contributes() {
        let graph = simple_graph();
        let mut store = VectorStore::in_memory().unwrap_or_else(|e| panic!("open failed: {e}"));
        let chunks = vec![chunk_for("src/session.ts", "session")];
        store
            .add_chunks(&chunks, &[vec![1.0, 0.0]])
            .unwrap_or_else(|e| panic!("add failed: {e}"));

        let ranker = Ranker::new(&graph, Some(&store));
        let ranked = ranker.rank(
            // No lexical overlap with session.ts on purpose.
            "expiry refresh window",
            None,
            candidates(),
            &[],
            Some(&[1.0, 0.0]),
        );
        let session = ranked.iter().find(|f| f.path == "src/session.ts");
        assert!(session.is_some_and(|f| f.score.vector > 0.9));
    }
}
