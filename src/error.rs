//! Error types for all ctxopt subsystems.
//!
//! Each subsystem gets its own `thiserror` enum so callers can match on
//! the failures they actually handle. Per-file faults stay local (they
//! are reported as warnings by the indexer); only failures on durable
//! project state propagate as errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by project discovery, configuration, and the builder.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No `.contextos/` directory was found at or above the given root.
    #[error(
        "no .contextos/ project state found under {}. \
         Run `ctxopt init` in the project root to create it.", root.display()
    )]
    NotInitialized {
        /// Root that was searched.
        root: PathBuf,
    },

    /// A YAML config file violated its schema.
    #[error("invalid configuration in {}: {}", path.display(), violations.join("; "))]
    ConfigInvalid {
        /// File that failed validation.
        path: PathBuf,
        /// One entry per violated field, e.g. `"constraints[2].severity"`.
        violations: Vec<String>,
    },

    /// An I/O failure on durable project state (config, cache, db paths).
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// YAML parse failure on a project config file.
    #[error("failed to parse {}: {message}", path.display())]
    Yaml {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

/// Errors raised while indexing a source tree.
///
/// Per-file variants (`FileUnreadable`, `FileTooLarge`) are collected as
/// warnings on the index report; only `Output` is fatal to a whole run.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A source file could not be read.
    #[error("unreadable file {}: {message}", path.display())]
    FileUnreadable {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying diagnostic.
        message: String,
    },

    /// A source file exceeded the configured size limit.
    #[error("file {} is {size} bytes, over the {limit} byte limit", path.display())]
    FileTooLarge {
        /// Offending file.
        path: PathBuf,
        /// Actual size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// The tree walk itself failed (bad root, permission on the root).
    #[error("failed to walk {}: {message}", root.display())]
    Walk {
        /// Walk root.
        root: PathBuf,
        /// Underlying diagnostic.
        message: String,
    },

    /// A write to the graph or vector-store output location failed.
    /// This is the only fatal index error.
    #[error("failed to write index output {}: {message}", path.display())]
    Output {
        /// Output location.
        path: PathBuf,
        /// Underlying diagnostic.
        message: String,
    },
}

/// Errors raised by the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database could not be opened or created.
    #[error("failed to open vector store at {}: {message}", path.display())]
    Open {
        /// Backing file path.
        path: PathBuf,
        /// Underlying diagnostic.
        message: String,
    },

    /// A query or write against the backing database failed.
    #[error("vector store query failed: {message}")]
    Query {
        /// Underlying diagnostic.
        message: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Query {
            message: e.to_string(),
        }
    }
}

/// Errors raised by the sandbox.
///
/// All of these are observable, non-fatal results from the agent
/// engine's point of view: they become transcript observations, never
/// panics or propagated failures.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Pre-execution validation rejected the code.
    #[error("code rejected: {}", violations.join(", "))]
    Rejected {
        /// One entry per matched deny-list pattern.
        violations: Vec<String>,
    },

    /// The code did not parse as a sandbox program.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-indexed source line.
        line: usize,
        /// Parser diagnostic.
        message: String,
    },

    /// Evaluation failed (unknown identifier, bad operand, missing method).
    #[error("evaluation error: {message}")]
    Eval {
        /// Evaluator diagnostic.
        message: String,
    },

    /// The wall-clock deadline expired mid-execution.
    #[error("execution timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        /// Milliseconds actually spent.
        elapsed_ms: u64,
        /// Configured limit.
        limit_ms: u64,
    },

    /// The evaluation-step cap was hit.
    #[error("execution exceeded {limit} evaluation steps")]
    StepLimit {
        /// Configured cap.
        limit: usize,
    },
}

/// Errors raised by the agent engine and its LLM providers.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the provider.
    #[error(
        "no API key configured. Set OPENAI_API_KEY or CTXOPT_API_KEY, \
         or pass one explicitly."
    )]
    ApiKeyMissing,

    /// The provider call failed (network, auth, rate limit, bad model).
    #[error("provider request failed: {message}")]
    Provider {
        /// Underlying diagnostic.
        message: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
    },

    /// The caller supplied an empty goal and inference found nothing.
    #[error("goal is empty and no changed files were found to infer one from")]
    EmptyGoal,
}

/// Errors raised by the version-control collaborator.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` invocation itself failed to spawn or exited non-zero.
    #[error("git {subcommand} failed: {message}")]
    Command {
        /// Subcommand that failed (e.g. `"diff"`).
        subcommand: String,
        /// Underlying diagnostic.
        message: String,
    },

    /// A path supplied to git contained a newline or NUL byte.
    #[error("rejected unsafe path: {path:?}")]
    UnsafePath {
        /// The rejected path, debug-escaped.
        path: String,
    },
}
