//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local
//! proxies) via the base URL override in [`AgentConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest, Stop,
};
use async_trait::async_trait;

use crate::agent::config::AgentConfig;
use crate::agent::message::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, Role, TokenUsage,
};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// `OpenAI`-compatible LLM provider.
///
/// Wraps the `async-openai` client for chat completions. Compatible
/// with any API that follows the `OpenAI` chat completion spec.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a new provider from agent configuration.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
        }
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    msg.content.clone(),
                ),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(
                        async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        ),
                    ),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic
    /// request, prepending the system prompt.
    fn build_request(request: &CompletionRequest) -> CreateChatCompletionRequest {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage {
                content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                    request.system_prompt.clone(),
                ),
                name: None,
            },
        ));
        messages.extend(request.messages.iter().map(Self::convert_message));

        let stop = if request.stop_sequences.is_empty() {
            None
        } else {
            Some(Stop::StringArray(request.stop_sequences.clone()))
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            stop,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AgentError> {
        let openai_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| AgentError::Provider {
                message: e.to_string(),
                status: None,
            })?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| c.finish_reason.as_ref()).map_or(
            FinishReason::Stop,
            |fr| match format!("{fr:?}").to_lowercase().as_str() {
                "length" => FinishReason::Length,
                "contentfilter" => FinishReason::Error,
                _ => FinishReason::Stop,
            },
        );

        let tokens_used = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(CompletionResponse {
            content,
            tokens_used,
            finish_reason,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::user_message;

    fn request(stop: Vec<String>) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-5.2-2025-12-11".to_string(),
            system_prompt: "You are a test agent.".to_string(),
            messages: vec![user_message("hello")],
            temperature: Some(0.0),
            max_tokens: Some(256),
            stop_sequences: stop,
        }
    }

    #[test]
    fn test_build_request_prepends_system_prompt() {
        let built = OpenAiProvider::build_request(&request(Vec::new()));
        assert_eq!(built.messages.len(), 2);
        assert!(matches!(
            built.messages[0],
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            built.messages[1],
            ChatCompletionRequestMessage::User(_)
        ));
        assert!(built.stop.is_none());
    }

    #[test]
    fn test_build_request_stop_sequences() {
        let built = OpenAiProvider::build_request(&request(vec!["```".to_string()]));
        assert!(matches!(built.stop, Some(Stop::StringArray(_))));
    }

    #[test]
    fn test_convert_assistant_message() {
        let msg = crate::agent::message::assistant_message("plan text");
        let converted = OpenAiProvider::convert_message(&msg);
        assert!(matches!(
            converted,
            ChatCompletionRequestMessage::Assistant(_)
        ));
    }
}
