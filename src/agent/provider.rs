//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic
//! [`CompletionRequest`]/[`CompletionResponse`] into provider-specific
//! SDK calls. The engine only ever sees this trait, which is what makes
//! the loop testable with mock providers.

use async_trait::async_trait;

use super::message::{CompletionRequest, CompletionResponse};
use crate::error::AgentError;

/// Trait for LLM provider backends.
///
/// The contract is synchronous completion: one request, one full
/// response. Retries are the implementation's own policy; the engine
/// surfaces failure after one propagated error.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`, `"mock"`).
    fn name(&self) -> &'static str;

    /// Executes a completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or parse
    /// errors.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AgentError>;

    /// Estimates the token count of `text` with this provider's
    /// accounting (a chars-per-token approximation by default).
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}
