//! Dependency graph over source files.
//!
//! Nodes are files keyed by repo-relative path; edges are derived from
//! each node's raw import strings and rebuilt whenever the node is
//! re-parsed. Import resolution to target paths is a key-matching
//! heuristic over existing node keys only, no module semantics.
//!
//! Persistence is a single JSON file written atomically
//! (write-then-rename). A corrupt file starts the graph empty with a
//! warning, never an error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::content_hash;
use crate::error::IndexError;
use crate::parser::Language;

/// Extensions probed when matching a relative import to a node key.
const RESOLVE_SUFFIXES: &[&str] = &[
    "", ".ts", ".tsx", ".js", ".jsx", ".mjs", ".py", ".rs",
    "/index.ts", "/index.js", "/mod.rs", "/__init__.py",
];

/// One file node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    /// Repo-relative path (unique key).
    pub path: String,
    /// Language tag.
    pub language: Language,
    /// Raw, unresolved import source strings in declaration order.
    pub imports: Vec<String>,
    /// Exported symbol names.
    pub exports: Vec<String>,
    /// 16-hex digest of the file content at last index time.
    pub content_hash: String,
    /// Epoch milliseconds of the last (re)index of this node.
    pub last_indexed: u64,
}

/// An import edge, keyed by `(source path, raw import string)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Importing file.
    pub source: String,
    /// Raw import string as written.
    pub import: String,
}

/// Serialized graph document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphDoc {
    version: u32,
    nodes: Vec<FileNode>,
}

/// In-memory dependency graph.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, FileNode>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of file nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of import edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.imports.len()).sum()
    }

    /// Returns the node for `path`, if any.
    #[must_use]
    pub fn node(&self, path: &str) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    /// All node paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.nodes.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Adds or replaces a node.
    ///
    /// If a node already exists for `path` with the same content hash
    /// this is a no-op: imports, exports, and timestamp are untouched.
    /// Otherwise the node is replaced and its outgoing edges rebuilt
    /// from the new import list.
    pub fn add_node(
        &mut self,
        path: &str,
        imports: Vec<String>,
        exports: Vec<String>,
        language: Language,
        content: &str,
    ) {
        let hash = content_hash(content.as_bytes());
        if self
            .nodes
            .get(path)
            .is_some_and(|n| n.content_hash == hash)
        {
            return;
        }
        self.nodes.insert(
            path.to_string(),
            FileNode {
                path: path.to_string(),
                language,
                imports,
                exports,
                content_hash: hash,
                last_indexed: now_millis(),
            },
        );
    }

    /// Drops a node and every edge touching it.
    pub fn remove_node(&mut self, path: &str) {
        self.nodes.remove(path);
    }

    /// Returns `true` when `content` differs from the node's recorded
    /// hash (or when no node exists).
    #[must_use]
    pub fn has_changed(&self, path: &str, content: &str) -> bool {
        let hash = content_hash(content.as_bytes());
        self.nodes.get(path).is_none_or(|n| n.content_hash != hash)
    }

    /// Raw import strings of `path`, in declaration order.
    #[must_use]
    pub fn direct_imports(&self, path: &str) -> Vec<String> {
        self.nodes
            .get(path)
            .map(|n| n.imports.clone())
            .unwrap_or_default()
    }

    /// Files whose raw import list contains exactly `path`.
    ///
    /// Inverse lookup by raw string equality; no resolution.
    #[must_use]
    pub fn direct_dependents(&self, path: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.imports.iter().any(|i| i == path))
            .map(|n| n.path.clone())
            .collect();
        dependents.sort();
        dependents
    }

    /// All edges, sorted by `(source, import)`.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .nodes
            .values()
            .flat_map(|n| {
                n.imports.iter().map(|i| Edge {
                    source: n.path.clone(),
                    import: i.clone(),
                })
            })
            .collect();
        edges.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.import.cmp(&b.import)));
        edges
    }

    /// Transitive dependency set of `path`, following outgoing edges up
    /// to `max_depth` hops. The origin itself is not included. Cycles
    /// terminate via the visited set.
    #[must_use]
    pub fn dependencies(&self, path: &str, max_depth: usize) -> HashSet<String> {
        let adjacency = self.out_adjacency();
        let mut visited: HashSet<String> = HashSet::new();
        let mut result: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        visited.insert(path.to_string());
        queue.push_back((path.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for next in adjacency.get(&current).into_iter().flatten() {
                if visited.insert(next.clone()) {
                    result.insert(next.clone());
                    queue.push_back((next.clone(), depth + 1));
                }
            }
        }

        result
    }

    /// Shortest undirected hop count between two nodes.
    ///
    /// Returns 0 when `a == b` (and `a` exists), −1 when either node is
    /// missing or no path exists.
    #[must_use]
    pub fn distance(&self, a: &str, b: &str) -> i32 {
        if !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return -1;
        }
        if a == b {
            return 0;
        }

        let adjacency = self.undirected_adjacency();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, i32)> = VecDeque::new();
        visited.insert(a);
        queue.push_back((a, 0));

        while let Some((current, hops)) = queue.pop_front() {
            for next in adjacency.get(current).into_iter().flatten() {
                if next == b {
                    return hops + 1;
                }
                if visited.insert(next) {
                    queue.push_back((next, hops + 1));
                }
            }
        }

        -1
    }

    /// Proximity scores from `origin`: 1.0 for the origin, `1/(1+hops)`
    /// for reachable nodes, 0.0 for unreachable ones.
    #[must_use]
    pub fn distance_scores(&self, origin: &str) -> HashMap<String, f32> {
        let mut scores: HashMap<String, f32> = self
            .nodes
            .keys()
            .map(|p| (p.clone(), 0.0))
            .collect();

        if !self.nodes.contains_key(origin) {
            return scores;
        }
        scores.insert(origin.to_string(), 1.0);

        let adjacency = self.undirected_adjacency();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
        visited.insert(origin);
        queue.push_back((origin, 0));

        while let Some((current, hops)) = queue.pop_front() {
            for next in adjacency.get(current).into_iter().flatten() {
                if visited.insert(next) {
                    #[allow(clippy::cast_precision_loss)]
                    scores.insert(next.to_string(), 1.0 / (1.0 + (hops + 1) as f32));
                    queue.push_back((next, hops + 1));
                }
            }
        }

        scores
    }

    /// Paths of the `n` most recently indexed nodes, newest first.
    #[must_use]
    pub fn recently_changed(&self, n: usize) -> Vec<String> {
        let mut nodes: Vec<&FileNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| {
            b.last_indexed
                .cmp(&a.last_indexed)
                .then_with(|| a.path.cmp(&b.path))
        });
        nodes.into_iter().take(n).map(|n| n.path.clone()).collect()
    }

    /// Stable JSON serialization (nodes sorted by path).
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut nodes: Vec<FileNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        let doc = GraphDoc { version: 1, nodes };
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string())
    }

    /// Rebuilds a graph from its JSON serialization.
    ///
    /// Any parse failure yields an empty graph and a warning; a corrupt
    /// store must never block indexing.
    #[must_use]
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<GraphDoc>(json) {
            Ok(doc) => Self {
                nodes: doc.nodes.into_iter().map(|n| (n.path.clone(), n)).collect(),
            },
            Err(e) => {
                warn!("dependency graph JSON corrupt ({e}), starting empty");
                Self::default()
            }
        }
    }

    /// Loads a graph from disk. Absent or corrupt files yield an empty
    /// graph with a warning.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(_) => Self::default(),
        }
    }

    /// Persists the graph atomically: write to a temp sibling, then
    /// rename over the target.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let tmp = path.with_extension("json.tmp");
        let write = |p: &Path, body: &str| {
            std::fs::write(p, body).map_err(|e| IndexError::Output {
                path: p.to_path_buf(),
                message: e.to_string(),
            })
        };
        write(&tmp, &self.to_json())?;
        std::fs::rename(&tmp, path).map_err(|e| IndexError::Output {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Resolves a raw import string to a node key, if one matches.
    ///
    /// Exact key match first; then relative references are joined with
    /// the importer's directory, normalized, and probed against the
    /// usual extension/index suffixes.
    #[must_use]
    pub fn resolve_import(&self, source_path: &str, import: &str) -> Option<String> {
        if self.nodes.contains_key(import) {
            return Some(import.to_string());
        }

        if import.starts_with("./") || import.starts_with("../") {
            let parent = source_path.rsplit_once('/').map_or("", |(dir, _)| dir);
            let joined = normalize_path(parent, import);
            for suffix in RESOLVE_SUFFIXES {
                let candidate = format!("{joined}{suffix}");
                if self.nodes.contains_key(&candidate) {
                    return Some(candidate);
                }
            }
        }

        None
    }

    /// Outgoing adjacency: source → resolved targets.
    fn out_adjacency(&self) -> HashMap<String, Vec<String>> {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for node in self.nodes.values() {
            for import in &node.imports {
                if let Some(target) = self.resolve_import(&node.path, import) {
                    if target != node.path {
                        adjacency
                            .entry(node.path.clone())
                            .or_default()
                            .push(target);
                    }
                }
            }
        }
        adjacency
    }

    /// Undirected adjacency over resolved edges.
    fn undirected_adjacency(&self) -> HashMap<String, Vec<String>> {
        let mut adjacency = self.out_adjacency();
        let forward: Vec<(String, Vec<String>)> = adjacency
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (source, targets) in forward {
            for target in targets {
                adjacency.entry(target).or_default().push(source.clone());
            }
        }
        adjacency
    }
}

/// Joins `dir` with a `./`/`../` reference and collapses the result.
fn normalize_path(dir: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };
    for part in relative.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn graph_abc() -> DependencyGraph {
        // a → b → c, with d isolated
        let mut g = DependencyGraph::new();
        g.add_node(
            "src/a.ts",
            vec!["./b".to_string()],
            vec!["a".to_string()],
            Language::Typescript,
            "import b from './b';",
        );
        g.add_node(
            "src/b.ts",
            vec!["./c".to_string()],
            vec!["b".to_string()],
            Language::Typescript,
            "import c from './c';",
        );
        g.add_node(
            "src/c.ts",
            Vec::new(),
            vec!["c".to_string()],
            Language::Typescript,
            "export const c = 1;",
        );
        g.add_node(
            "src/d.ts",
            Vec::new(),
            vec!["d".to_string()],
            Language::Typescript,
            "export const d = 1;",
        );
        g
    }

    #[test]
    fn test_add_node_idempotent_on_same_content() {
        let mut g = DependencyGraph::new();
        g.add_node("a.ts", vec!["x".to_string()], vec!["a".to_string()], Language::Typescript, "body");
        let before = g.node("a.ts").cloned().unwrap_or_else(|| panic!("node missing"));

        // Same content, different metadata: must be a no-op.
        g.add_node("a.ts", vec!["y".to_string()], vec!["b".to_string()], Language::Typescript, "body");
        let after = g.node("a.ts").cloned().unwrap_or_else(|| panic!("node missing"));
        assert_eq!(after.imports, before.imports);
        assert_eq!(after.exports, before.exports);

        // Changed content replaces.
        g.add_node("a.ts", vec!["y".to_string()], vec!["b".to_string()], Language::Typescript, "body2");
        let replaced = g.node("a.ts").cloned().unwrap_or_else(|| panic!("node missing"));
        assert_eq!(replaced.imports, vec!["y"]);
    }

    #[test]
    fn test_has_changed() {
        let mut g = DependencyGraph::new();
        assert!(g.has_changed("a.ts", "body"));
        g.add_node("a.ts", Vec::new(), Vec::new(), Language::Typescript, "body");
        assert!(!g.has_changed("a.ts", "body"));
        assert!(g.has_changed("a.ts", "body!"));
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let mut g = graph_abc();
        assert_eq!(g.edge_count(), 2);
        g.remove_node("src/a.ts");
        assert_eq!(g.node_count(), 3);
        assert!(g.edges().iter().all(|e| e.source != "src/a.ts"));
    }

    #[test]
    fn test_direct_dependents_is_raw_equality() {
        let mut g = DependencyGraph::new();
        g.add_node("lib/util.ts", Vec::new(), Vec::new(), Language::Typescript, "u");
        g.add_node(
            "app.ts",
            vec!["lib/util.ts".to_string()],
            Vec::new(),
            Language::Typescript,
            "a",
        );
        g.add_node(
            "other.ts",
            vec!["./lib/util".to_string()],
            Vec::new(),
            Language::Typescript,
            "o",
        );
        // Only the exact raw string matches; the relative form does not.
        assert_eq!(g.direct_dependents("lib/util.ts"), vec!["app.ts"]);
    }

    #[test]
    fn test_dependencies_bfs_with_depth() {
        let g = graph_abc();
        let one = g.dependencies("src/a.ts", 1);
        assert!(one.contains("src/b.ts"));
        assert!(!one.contains("src/c.ts"));

        let two = g.dependencies("src/a.ts", 2);
        assert!(two.contains("src/b.ts"));
        assert!(two.contains("src/c.ts"));
        assert!(!two.contains("src/a.ts"));
    }

    #[test]
    fn test_dependencies_terminates_on_cycles() {
        let mut g = DependencyGraph::new();
        g.add_node("x.ts", vec!["./y".to_string()], Vec::new(), Language::Typescript, "x");
        g.add_node("y.ts", vec!["./x".to_string()], Vec::new(), Language::Typescript, "y");
        let deps = g.dependencies("x.ts", 10);
        assert_eq!(deps.len(), 1);
        assert!(deps.contains("y.ts"));
    }

    #[test]
    fn test_distance() {
        let g = graph_abc();
        assert_eq!(g.distance("src/a.ts", "src/a.ts"), 0);
        assert_eq!(g.distance("src/a.ts", "src/b.ts"), 1);
        assert_eq!(g.distance("src/a.ts", "src/c.ts"), 2);
        // Undirected: reachable backwards too.
        assert_eq!(g.distance("src/c.ts", "src/a.ts"), 2);
        assert_eq!(g.distance("src/a.ts", "src/d.ts"), -1);
        assert_eq!(g.distance("src/a.ts", "missing.ts"), -1);
    }

    #[test]
    fn test_distance_scores() {
        let g = graph_abc();
        let scores = g.distance_scores("src/a.ts");
        assert!((scores["src/a.ts"] - 1.0).abs() < f32::EPSILON);
        assert!((scores["src/b.ts"] - 0.5).abs() < f32::EPSILON);
        assert!((scores["src/c.ts"] - (1.0 / 3.0)).abs() < 1e-6);
        assert!(scores["src/d.ts"].abs() < f32::EPSILON);
    }

    #[test]
    fn test_json_round_trip() {
        let g = graph_abc();
        let json = g.to_json();
        let restored = DependencyGraph::from_json(&json);
        assert_eq!(restored.node_count(), 4);
        assert_eq!(restored.edge_count(), 2);
        assert_eq!(restored.direct_imports("src/a.ts"), vec!["./b"]);
        // Stable: serializing again produces identical output.
        assert_eq!(restored.to_json(), json);
    }

    #[test]
    fn test_corrupt_json_starts_empty() {
        let g = DependencyGraph::from_json("{not json");
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("graph.json");
        let g = graph_abc();
        g.save(&path).unwrap_or_else(|e| panic!("save failed: {e}"));
        let loaded = DependencyGraph::load(&path);
        assert_eq!(loaded.node_count(), 4);
        // Missing file is fine too.
        let empty = DependencyGraph::load(&dir.path().join("absent.json"));
        assert_eq!(empty.node_count(), 0);
    }

    #[test]
    fn test_resolve_import_probes_extensions() {
        let g = graph_abc();
        assert_eq!(
            g.resolve_import("src/a.ts", "./b"),
            Some("src/b.ts".to_string())
        );
        assert_eq!(g.resolve_import("src/a.ts", "./missing"), None);
        assert_eq!(
            g.resolve_import("src/a.ts", "src/b.ts"),
            Some("src/b.ts".to_string())
        );
    }
}
