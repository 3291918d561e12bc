//! Engine configuration with builder pattern and environment variable
//! support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults.

use std::time::Duration;

use crate::error::AgentError;

/// Default recursion depth cap.
const DEFAULT_MAX_DEPTH: usize = 3;
/// Default total token budget across one engine run (sub-agents
/// included).
const DEFAULT_MAX_TOKEN_BUDGET: u32 = 50_000;
/// Default wall-clock limit for one engine run.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default iteration cap per depth.
const DEFAULT_MAX_ITERATIONS: usize = 10;
/// Default completion size per LLM call.
const DEFAULT_COMPLETION_MAX_TOKENS: u32 = 2048;

/// Configuration for the recursive agent engine.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model driving the loop.
    pub model: String,
    /// Backend name selecting the system-prompt flavor.
    pub backend: String,
    /// Maximum recursion depth for sub-agents.
    pub max_depth: usize,
    /// Total token budget for one run, sub-agents included.
    pub max_token_budget: u32,
    /// Wall-clock limit for one run. The sandbox gets a tenth of this
    /// per execution.
    pub timeout: Duration,
    /// Whether `recurse` actions spawn sub-agents at all.
    pub enable_sub_agents: bool,
    /// Iteration cap per depth.
    pub max_iterations: usize,
    /// Maximum tokens per LLM completion.
    pub completion_max_tokens: u32,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Per-execution sandbox timeout: a tenth of the engine timeout,
    /// floored at 250ms so very tight budgets still run anything.
    #[must_use]
    pub fn sandbox_timeout(&self) -> Duration {
        (self.timeout / 10).max(Duration::from_millis(250))
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    backend: Option<String>,
    max_depth: Option<usize>,
    max_token_budget: Option<u32>,
    timeout: Option<Duration>,
    enable_sub_agents: Option<bool>,
    max_iterations: Option<usize>,
    completion_max_tokens: Option<u32>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("CTXOPT_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("CTXOPT_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("CTXOPT_BASE_URL"))
                .ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("CTXOPT_MODEL").ok();
        }
        if self.max_depth.is_none() {
            self.max_depth = std::env::var("CTXOPT_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_token_budget.is_none() {
            self.max_token_budget = std::env::var("CTXOPT_MAX_TOKEN_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_iterations.is_none() {
            self.max_iterations = std::env::var("CTXOPT_MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the backend name for prompt selection.
    #[must_use]
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Sets the recursion depth cap.
    #[must_use]
    pub const fn max_depth(mut self, n: usize) -> Self {
        self.max_depth = Some(n);
        self
    }

    /// Sets the total token budget.
    #[must_use]
    pub const fn max_token_budget(mut self, n: u32) -> Self {
        self.max_token_budget = Some(n);
        self
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Enables or disables sub-agent recursion.
    #[must_use]
    pub const fn enable_sub_agents(mut self, enabled: bool) -> Self {
        self.enable_sub_agents = Some(enabled);
        self
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the per-completion token cap.
    #[must_use]
    pub const fn completion_max_tokens(mut self, n: u32) -> Self {
        self.completion_max_tokens = Some(n);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| "gpt-5.2-2025-12-11".to_string()),
            backend: self.backend.unwrap_or_else(|| "openai".to_string()),
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            max_token_budget: self.max_token_budget.unwrap_or(DEFAULT_MAX_TOKEN_BUDGET),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            enable_sub_agents: self.enable_sub_agents.unwrap_or(true),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            completion_max_tokens: self
                .completion_max_tokens
                .unwrap_or(DEFAULT_COMPLETION_MAX_TOKENS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert!(config.enable_sub_agents);
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = AgentConfig::builder().build();
        assert!(matches!(result, Err(AgentError::ApiKeyMissing)));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .model("gpt-5-mini-2025-08-07")
            .max_depth(5)
            .max_iterations(3)
            .enable_sub_agents(false)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.model, "gpt-5-mini-2025-08-07");
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_iterations, 3);
        assert!(!config.enable_sub_agents);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_sandbox_timeout_is_tenth_with_floor() {
        let config = AgentConfig::builder()
            .api_key("key")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.sandbox_timeout(), Duration::from_secs(3));

        let tight = AgentConfig::builder()
            .api_key("key")
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(tight.sandbox_timeout(), Duration::from_millis(250));
    }
}
