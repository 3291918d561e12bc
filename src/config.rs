//! Per-project state and configuration.
//!
//! All durable state lives under `.contextos/` at the project root:
//! `context.yaml` (project metadata and constraints), `config.yaml`
//! (indexing/graph/embedding/budget options), `db/` (graph and vector
//! store), `cache/` (last built context), and `.contextignore`
//! (negative-context globs). Unknown YAML keys are warnings, never
//! errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chunker::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::core::types::Rule;
use crate::error::ContextError;
use crate::indexer::DEFAULT_FILE_SIZE_LIMIT;

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".contextos";

/// Current `context.yaml` schema version.
pub const CONTEXT_VERSION: u32 = 1;

/// Project metadata from `context.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// Project name.
    #[serde(default)]
    pub name: String,
    /// Primary language.
    #[serde(default)]
    pub language: String,
    /// Optional framework tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// Optional one-line description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `context.yaml`: metadata, stack, constraints, boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFile {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectMeta,
    /// Technology stack labels.
    #[serde(default)]
    pub stack: Vec<String>,
    /// Ordered constraint rules.
    #[serde(default)]
    pub constraints: Vec<Rule>,
    /// Module boundary descriptions.
    #[serde(default)]
    pub boundaries: Vec<String>,
    /// Unknown keys, collected for warnings.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

const fn default_version() -> u32 {
    CONTEXT_VERSION
}

impl Default for ContextFile {
    fn default() -> Self {
        Self {
            version: CONTEXT_VERSION,
            project: ProjectMeta::default(),
            stack: Vec::new(),
            constraints: Vec::new(),
            boundaries: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Indexing options from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingOptions {
    /// Whether a file watcher should keep the index fresh.
    #[serde(default)]
    pub watch_mode: bool,
    /// Extra ignore globs.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Per-file size ceiling in bytes.
    #[serde(default = "default_file_size_limit")]
    pub file_size_limit: u64,
}

const fn default_file_size_limit() -> u64 {
    DEFAULT_FILE_SIZE_LIMIT
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            watch_mode: false,
            ignore_patterns: Vec::new(),
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
        }
    }
}

/// Graph options from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOptions {
    /// BFS depth cap for dependency expansion.
    #[serde(default = "default_graph_depth")]
    pub max_depth: usize,
    /// Whether type-only imports count as edges.
    #[serde(default = "default_true")]
    pub follow_types: bool,
}

const fn default_graph_depth() -> usize {
    3
}

const fn default_true() -> bool {
    true
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_depth: default_graph_depth(),
            follow_types: true,
        }
    }
}

/// Embedding options from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingOptions {
    /// Chunking strategy label.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Embedding provider name.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Embedding model id.
    #[serde(default)]
    pub model: String,
    /// Chunk window in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunk overlap in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_strategy() -> String {
    "sliding-window".to_string()
}

fn default_provider() -> String {
    "hash".to_string()
}

const fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

const fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            provider: default_provider(),
            model: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Budgeting options from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetOptions {
    /// Packing strategy label.
    #[serde(default = "default_budget_strategy")]
    pub strategy: String,
    /// Model whose token counter the budgeter uses.
    #[serde(default = "default_target_model")]
    pub target_model: String,
    /// Default token budget for builds.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_budget_strategy() -> String {
    "rank-greedy".to_string()
}

fn default_target_model() -> String {
    "gpt-4".to_string()
}

const fn default_max_tokens() -> usize {
    8_000
}

impl Default for BudgetOptions {
    fn default() -> Self {
        Self {
            strategy: default_budget_strategy(),
            target_model: default_target_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// `config.yaml`: option groups plus unknown-key capture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Indexing options.
    #[serde(default)]
    pub indexing: IndexingOptions,
    /// Graph options.
    #[serde(default)]
    pub graph: GraphOptions,
    /// Embedding options.
    #[serde(default)]
    pub embedding: EmbeddingOptions,
    /// Budgeting options.
    #[serde(default)]
    pub budget: BudgetOptions,
    /// Unknown keys, collected for warnings.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// An opened project: root, state dir, and parsed configuration.
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root (parent of `.contextos/`).
    pub root: PathBuf,
    /// The `.contextos/` directory.
    pub state_dir: PathBuf,
    /// Parsed `context.yaml`.
    pub context: ContextFile,
    /// Parsed `config.yaml`.
    pub config: ConfigFile,
    /// Globs from `.contextignore`.
    pub context_ignore: Vec<String>,
}

impl Project {
    /// Opens the project rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`ContextError::NotInitialized`] when `root` has no
    /// `.contextos/`; parse errors for unreadable YAML.
    pub fn open(root: &Path) -> Result<Self, ContextError> {
        let state_dir = root.join(STATE_DIR);
        if !state_dir.is_dir() {
            return Err(ContextError::NotInitialized {
                root: root.to_path_buf(),
            });
        }

        let context: ContextFile = load_yaml(&state_dir.join("context.yaml"))?;
        let config: ConfigFile = load_yaml(&state_dir.join("config.yaml"))?;

        if context.version > CONTEXT_VERSION {
            warn!(
                "context.yaml version {} is newer than supported {CONTEXT_VERSION}",
                context.version
            );
        }
        warn_unknown_keys("context.yaml", context.extra.keys());
        warn_unknown_keys("config.yaml", config.extra.keys());
        validate_config(&state_dir.join("config.yaml"), &config)?;

        let context_ignore = read_ignore_file(&state_dir.join(".contextignore"));

        Ok(Self {
            root: root.to_path_buf(),
            state_dir,
            context,
            config,
            context_ignore,
        })
    }

    /// Walks up from `start` until a `.contextos/` directory is found.
    ///
    /// # Errors
    ///
    /// [`ContextError::NotInitialized`] when no ancestor has one.
    pub fn discover(start: &Path) -> Result<Self, ContextError> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(STATE_DIR).is_dir() {
                return Self::open(dir);
            }
            current = dir.parent();
        }
        Err(ContextError::NotInitialized {
            root: start.to_path_buf(),
        })
    }

    /// Scaffolds `.contextos/` under `root` with starter files.
    ///
    /// Existing files are left alone, so `init` is idempotent.
    pub fn init(root: &Path, name: &str) -> Result<Self, ContextError> {
        let state_dir = root.join(STATE_DIR);
        for dir in [
            state_dir.clone(),
            state_dir.join("db"),
            state_dir.join("cache"),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| ContextError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        let context_path = state_dir.join("context.yaml");
        if !context_path.exists() {
            let starter = ContextFile {
                project: ProjectMeta {
                    name: name.to_string(),
                    ..ProjectMeta::default()
                },
                ..ContextFile::default()
            };
            write_yaml(&context_path, &starter)?;
        }

        let config_path = state_dir.join("config.yaml");
        if !config_path.exists() {
            write_yaml(&config_path, &ConfigFile::default())?;
        }

        let ignore_path = state_dir.join(".contextignore");
        if !ignore_path.exists() {
            std::fs::write(
                &ignore_path,
                "# Globs excluded from context ranking, one per line\n",
            )
            .map_err(|e| ContextError::Io {
                path: ignore_path.clone(),
                source: e,
            })?;
        }

        Self::open(root)
    }

    /// Path of the dependency-graph JSON.
    #[must_use]
    pub fn graph_path(&self) -> PathBuf {
        self.state_dir.join("db").join("graph.json")
    }

    /// Path of the vector-store backing file.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join("db").join("vectors.db")
    }

    /// Path of the last-built-context cache.
    #[must_use]
    pub fn last_context_path(&self) -> PathBuf {
        self.state_dir.join("cache").join("last-context.md")
    }

    /// Indexer configuration derived from the project options.
    #[must_use]
    pub fn indexer_config(&self) -> crate::indexer::IndexerConfig {
        crate::indexer::IndexerConfig {
            root: self.root.clone(),
            graph_path: self.graph_path(),
            store_path: self.store_path(),
            ignore_patterns: self.config.indexing.ignore_patterns.clone(),
            file_size_limit: self.config.indexing.file_size_limit,
            chunker: crate::chunker::ChunkerConfig {
                chunk_size: self.config.embedding.chunk_size,
                overlap: self.config.embedding.overlap,
                min_chunk: crate::chunker::DEFAULT_MIN_CHUNK,
            },
        }
    }

    /// One-paragraph project summary for the core text.
    #[must_use]
    pub fn summary(&self) -> String {
        let meta = &self.context.project;
        let mut parts = Vec::new();
        if !meta.name.is_empty() {
            parts.push(format!("Project: {}", meta.name));
        }
        if !meta.language.is_empty() {
            parts.push(format!("Language: {}", meta.language));
        }
        if let Some(framework) = &meta.framework {
            parts.push(format!("Framework: {framework}"));
        }
        if let Some(description) = &meta.description {
            parts.push(description.clone());
        }
        if !self.context.stack.is_empty() {
            parts.push(format!("Stack: {}", self.context.stack.join(", ")));
        }
        parts.join("\n")
    }

    /// Writes a secret to `secrets.yaml` next to `config.yaml`, with
    /// owner-only permissions. Secrets never land in `config.yaml`.
    pub fn write_secret(&self, key: &str, value: &str) -> Result<(), ContextError> {
        let path = self.state_dir.join("secrets.yaml");
        let mut secrets: BTreeMap<String, String> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_yaml::from_str(&text).ok())
            .unwrap_or_default();
        secrets.insert(key.to_string(), value.to_string());

        let body = serde_yaml::to_string(&secrets).unwrap_or_default();
        std::fs::write(&path, body).map_err(|e| ContextError::Io {
            path: path.clone(),
            source: e,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms).map_err(|e| ContextError::Io {
                path: path.clone(),
                source: e,
            })?;
        }

        Ok(())
    }
}

fn load_yaml<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T, ContextError> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_yaml::from_str(&text).map_err(|e| ContextError::Yaml {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        // Absent files get defaults; only parse failures error.
        Err(_) => Ok(T::default()),
    }
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), ContextError> {
    let body = serde_yaml::to_string(value).map_err(|e| ContextError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    std::fs::write(path, body).map_err(|e| ContextError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn warn_unknown_keys<'a>(file: &str, keys: impl Iterator<Item = &'a String>) {
    for key in keys {
        warn!("{file}: unknown key {key:?} ignored");
    }
}

/// Schema checks that are errors, not warnings.
fn validate_config(path: &Path, config: &ConfigFile) -> Result<(), ContextError> {
    let mut violations = Vec::new();
    if config.embedding.chunk_size == 0 {
        violations.push("embedding.chunk_size must be positive".to_string());
    }
    if config.embedding.overlap >= config.embedding.chunk_size.max(1) {
        violations.push("embedding.overlap must be smaller than chunk_size".to_string());
    }
    if config.budget.max_tokens == 0 {
        violations.push("budget.max_tokens must be positive".to_string());
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ContextError::ConfigInvalid {
            path: path.to_path_buf(),
            violations,
        })
    }
}

fn read_ignore_file(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::core::types::Severity;

    #[test]
    fn test_open_without_state_dir_errors() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let result = Project::open(dir.path());
        assert!(matches!(result, Err(ContextError::NotInitialized { .. })));
    }

    #[test]
    fn test_init_scaffolds_and_reopens() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let project =
            Project::init(dir.path(), "demo").unwrap_or_else(|e| panic!("init failed: {e}"));
        assert_eq!(project.context.project.name, "demo");
        assert!(project.state_dir.join("context.yaml").is_file());
        assert!(project.state_dir.join("config.yaml").is_file());
        assert!(project.state_dir.join(".contextignore").is_file());
        assert!(project.state_dir.join("db").is_dir());

        // Idempotent: a second init keeps existing files.
        let again =
            Project::init(dir.path(), "other").unwrap_or_else(|e| panic!("re-init failed: {e}"));
        assert_eq!(again.context.project.name, "demo");
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        Project::init(dir.path(), "demo").unwrap_or_else(|e| panic!("init failed: {e}"));
        let nested = dir.path().join("src/deep/module");
        std::fs::create_dir_all(&nested).unwrap_or_else(|e| panic!("mkdir failed: {e}"));

        let project =
            Project::discover(&nested).unwrap_or_else(|e| panic!("discover failed: {e}"));
        assert_eq!(project.root, dir.path());
    }

    #[test]
    fn test_constraints_parse() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let state = dir.path().join(STATE_DIR);
        std::fs::create_dir_all(&state).unwrap_or_else(|e| panic!("mkdir failed: {e}"));
        std::fs::write(
            state.join("context.yaml"),
            "version: 1\nproject:\n  name: demo\nconstraints:\n  - rule: no panics in library code\n    severity: error\n  - rule: vendored code is frozen\n    severity: warning\n    scope: \"!vendor/**\"\n",
        )
        .unwrap_or_else(|e| panic!("write failed: {e}"));

        let project = Project::open(dir.path()).unwrap_or_else(|e| panic!("open failed: {e}"));
        assert_eq!(project.context.constraints.len(), 2);
        assert_eq!(project.context.constraints[0].severity, Severity::Error);
        assert_eq!(
            project.context.constraints[1].scope.as_deref(),
            Some("!vendor/**")
        );
    }

    #[test]
    fn test_unknown_keys_are_tolerated() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let state = dir.path().join(STATE_DIR);
        std::fs::create_dir_all(&state).unwrap_or_else(|e| panic!("mkdir failed: {e}"));
        std::fs::write(
            state.join("config.yaml"),
            "indexing:\n  watch_mode: true\nfuture_section:\n  anything: goes\n",
        )
        .unwrap_or_else(|e| panic!("write failed: {e}"));

        let project = Project::open(dir.path()).unwrap_or_else(|e| panic!("open failed: {e}"));
        assert!(project.config.indexing.watch_mode);
        assert!(project.config.extra.contains_key("future_section"));
    }

    #[test]
    fn test_invalid_config_lists_violations() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let state = dir.path().join(STATE_DIR);
        std::fs::create_dir_all(&state).unwrap_or_else(|e| panic!("mkdir failed: {e}"));
        std::fs::write(
            state.join("config.yaml"),
            "embedding:\n  chunk_size: 100\n  overlap: 200\n",
        )
        .unwrap_or_else(|e| panic!("write failed: {e}"));

        let result = Project::open(dir.path());
        assert!(matches!(
            result,
            Err(ContextError::ConfigInvalid { violations, .. }) if violations.len() == 1
        ));
    }

    #[test]
    fn test_contextignore_parsed() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let project =
            Project::init(dir.path(), "demo").unwrap_or_else(|e| panic!("init failed: {e}"));
        std::fs::write(
            project.state_dir.join(".contextignore"),
            "# comment\nvendor/**\n\n*.generated.ts\n",
        )
        .unwrap_or_else(|e| panic!("write failed: {e}"));

        let project = Project::open(dir.path()).unwrap_or_else(|e| panic!("reopen failed: {e}"));
        assert_eq!(project.context_ignore, vec!["vendor/**", "*.generated.ts"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let project =
            Project::init(dir.path(), "demo").unwrap_or_else(|e| panic!("init failed: {e}"));
        project
            .write_secret("api_key", "sk-test")
            .unwrap_or_else(|e| panic!("write_secret failed: {e}"));

        let meta = std::fs::metadata(project.state_dir.join("secrets.yaml"))
            .unwrap_or_else(|e| panic!("metadata failed: {e}"));
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
