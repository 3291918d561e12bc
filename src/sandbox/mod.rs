//! Isolated executor for LLM-emitted code snippets.
//!
//! Capabilities exposed to executed code are exactly: the immutable
//! context query object (`ctx` / `context`), a small set of pure
//! builtins (JSON, Math, String/Number/Boolean coercion, `print`),
//! and, only when the agent engine injects one, a `rae.completion`
//! recursion capability. There is no filesystem, network, subprocess,
//! module loading, reflection, or timer surface to reach: the
//! interpreter simply has no such bindings, and the deny-list rejects
//! the attempt before execution for a clear observation message.

mod interp;
mod lexer;
pub mod validate;
mod value;

pub use validate::validate_code;
pub use value::{Host, Value};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::SandboxError;
use crate::query::ContextQuery;

use interp::{Interp, Limits};

/// Default per-call wall-clock timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3_000);
/// Default evaluation-step cap.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Host capability for sub-agent recursion, injected by the engine.
pub trait RecursionHook: Send + Sync {
    /// Runs a sub-agent for `sub_goal` over `sub_context` and returns
    /// its result as a sandbox value.
    fn completion(&self, sub_goal: &str, sub_context: &str) -> Result<Value, SandboxError>;
}

/// Sandbox configuration.
#[derive(Debug, Clone, Copy)]
pub struct SandboxConfig {
    /// Wall-clock limit per execution.
    pub timeout: Duration,
    /// Evaluation-step cap per execution.
    pub step_limit: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    /// Whether execution completed without an error.
    pub success: bool,
    /// Captured `print` output.
    pub stdout: String,
    /// Rendered return value, if the code returned one.
    pub returned: Option<String>,
    /// Variables defined or modified by the code, rendered as strings.
    pub variables: BTreeMap<String, String>,
    /// Error description on failure (validation, parse, eval, timeout).
    pub error: Option<String>,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
}

impl ExecOutcome {
    /// Formats the outcome the way the agent engine observes it.
    #[must_use]
    pub fn observation(&self) -> String {
        let mut parts = Vec::new();
        if !self.stdout.is_empty() {
            parts.push(format!("stdout:\n{}", self.stdout.trim_end()));
        }
        if let Some(returned) = &self.returned {
            parts.push(format!("returned: {returned}"));
        }
        if let Some(error) = &self.error {
            parts.push(format!("error: {error}"));
        }
        if parts.is_empty() {
            parts.push("(no output)".to_string());
        }
        parts.join("\n")
    }
}

/// A single-threaded, cooperative executor over one context.
///
/// Variables persist across calls until [`Sandbox::reset`], which
/// wipes all state and recreates a fresh restricted scope.
pub struct Sandbox {
    query: ContextQuery,
    config: SandboxConfig,
    hook: Option<std::sync::Arc<dyn RecursionHook>>,
    retained: BTreeMap<String, Value>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("context_len", &self.query.length())
            .field("retained", &self.retained.len())
            .field("has_hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Creates a sandbox over `query`.
    #[must_use]
    pub fn new(query: ContextQuery, config: SandboxConfig) -> Self {
        Self {
            query,
            config,
            hook: None,
            retained: BTreeMap::new(),
        }
    }

    /// Injects the recursion capability. Only the agent engine does
    /// this; plain callers get a sandbox where `rae` is unavailable.
    #[must_use]
    pub fn with_hook(mut self, hook: std::sync::Arc<dyn RecursionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The context this sandbox queries.
    #[must_use]
    pub const fn query(&self) -> &ContextQuery {
        &self.query
    }

    /// Validates and executes `code`.
    ///
    /// Never panics and never returns `Err`: every failure mode
    /// (deny-list rejection, parse error, evaluation error, timeout,
    /// step cap) comes back as an [`ExecOutcome`] with `success =
    /// false`; the agent engine observes it like any other result.
    pub fn execute(&mut self, code: &str) -> ExecOutcome {
        let start = Instant::now();

        let violations = validate_code(code);
        if !violations.is_empty() {
            return ExecOutcome {
                success: false,
                error: Some(
                    SandboxError::Rejected { violations }.to_string(),
                ),
                duration: start.elapsed(),
                ..ExecOutcome::default()
            };
        }

        let interp = Interp::new(
            &self.query,
            self.hook.as_deref(),
            self.retained.clone(),
            Limits {
                timeout: self.config.timeout,
                step_limit: self.config.step_limit,
            },
        );

        match interp.run(code) {
            Ok(evaluated) => {
                self.retained = evaluated.variables.clone();
                ExecOutcome {
                    success: true,
                    stdout: evaluated.stdout,
                    returned: evaluated.returned.map(|v| v.to_string()),
                    variables: evaluated
                        .variables
                        .into_iter()
                        .map(|(k, v)| (k, v.to_string()))
                        .collect(),
                    error: None,
                    duration: start.elapsed(),
                }
            }
            Err(e) => ExecOutcome {
                success: false,
                error: Some(e.to_string()),
                duration: start.elapsed(),
                ..ExecOutcome::default()
            },
        }
    }

    /// Wipes all retained state and recreates a fresh restricted scope.
    pub fn reset(&mut self) {
        self.retained.clear();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn sandbox(context: &str) -> Sandbox {
        Sandbox::new(ContextQuery::new(context), SandboxConfig::default())
    }

    #[test]
    fn test_execute_return_value() {
        let mut sb = sandbox("Hello World");
        let outcome = sb.execute("return ctx.length()");
        assert!(outcome.success);
        assert_eq!(outcome.returned.as_deref(), Some("11"));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_denied_code_is_nonfatal() {
        let mut sb = sandbox("x");
        let outcome = sb.execute("require('fs')");
        assert!(!outcome.success);
        let error = outcome.error.unwrap_or_default();
        assert!(error.contains("require"));
        // The sandbox is still usable afterwards.
        let next = sb.execute("return 1 + 1");
        assert!(next.success);
    }

    #[test]
    fn test_variables_persist_until_reset() {
        let mut sb = sandbox("x");
        sb.execute("let counter = 41");
        let outcome = sb.execute("return counter + 1");
        assert_eq!(outcome.returned.as_deref(), Some("42"));

        sb.reset();
        let after_reset = sb.execute("return counter + 1");
        assert!(!after_reset.success);
    }

    #[test]
    fn test_timeout_reported_as_error() {
        let mut sb = Sandbox::new(
            ContextQuery::new("x"),
            SandboxConfig {
                timeout: Duration::ZERO,
                step_limit: DEFAULT_STEP_LIMIT,
            },
        );
        let outcome = sb.execute("return 1");
        assert!(!outcome.success);
        assert!(outcome.error.is_some_and(|e| e.contains("timed out")));
    }

    #[test]
    fn test_observation_format() {
        let mut sb = sandbox("alpha beta");
        let outcome = sb.execute("print('seen')\nreturn ctx.find('beta')");
        let obs = outcome.observation();
        assert!(obs.contains("stdout:\nseen"));
        assert!(obs.contains("returned: 6"));

        let silent = sb.execute("let x = 1");
        assert_eq!(silent.observation(), "(no output)");
    }

    #[test]
    fn test_containment_no_host_bindings() {
        let mut sb = sandbox("x");
        // Not on the deny-list, but simply unbound in the interpreter.
        let outcome = sb.execute("return fetch('http://example.com')");
        assert!(!outcome.success);
        assert!(outcome.error.is_some_and(|e| e.contains("fetch")));
    }
}
