//! Engine scenarios driven by a scripted provider: the code path, the
//! sandbox-violation path, and loop detection.

#![allow(clippy::panic)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ctxopt::agent::{
    AgentConfig, CompletionRequest, CompletionResponse, EntryAction, FinishReason, LlmProvider,
    RecursiveAgent, TokenUsage,
};
use ctxopt::error::AgentError;

/// Returns canned responses in order; errors when exhausted.
struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(ToString::to_string).collect()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, AgentError> {
        let mut responses = self.responses.lock().map_err(|_| AgentError::Provider {
            message: "mutex poisoned".to_string(),
            status: None,
        })?;
        if responses.is_empty() {
            return Err(AgentError::Provider {
                message: "script exhausted".to_string(),
                status: None,
            });
        }
        Ok(CompletionResponse {
            content: responses.remove(0),
            tokens_used: TokenUsage {
                prompt_tokens: 50,
                completion_tokens: 50,
                total_tokens: 100,
            },
            finish_reason: FinishReason::Stop,
            error: None,
        })
    }
}

fn engine(responses: &[&str]) -> RecursiveAgent {
    let config = AgentConfig::builder()
        .api_key("test")
        .build()
        .unwrap_or_else(|_| unreachable!());
    RecursiveAgent::new(Arc::new(ScriptedProvider::new(responses)), config)
}

#[tokio::test(flavor = "multi_thread")]
async fn code_then_answer_over_hello_world() {
    let agent = engine(&[
        "```code\nreturn ctx.length()\n```",
        "```answer\n{\"answer\": \"11\", \"confidence\": 0.9}\n```",
    ]);

    let result = agent.run("how many bytes?", "Hello World").await;

    assert_eq!(result.answer, "11");
    assert!(!result.truncated);
    let kinds: Vec<EntryAction> = result.execution_path.iter().map(|e| e.action).collect();
    assert_eq!(kinds, vec![EntryAction::Code, EntryAction::Final]);
    assert!(result.execution_path[0].output.contains("returned: 11"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sandbox_violation_reaches_caller_anyway() {
    let agent = engine(&[
        "```code\nrequire('fs')\n```",
        "```answer\n{\"answer\": \"filesystem is off limits\", \"confidence\": 0.5}\n```",
    ]);

    let result = agent.run("read package.json", "no files here").await;

    assert_eq!(result.answer, "filesystem is off limits");
    let first = &result.execution_path[0];
    assert!(first.error.as_deref().is_some_and(|e| e.contains("require")));
    assert!(!result.truncated);
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_code_draws_a_nudge() {
    let same = "```code\nreturn ctx.lines()\n```";
    let agent = engine(&[
        same,
        same,
        same,
        "```answer\n{\"answer\": \"3 lines\", \"confidence\": 0.8}\n```",
    ]);

    let result = agent.run("count the lines", "one\ntwo\nthree").await;

    assert_eq!(result.answer, "3 lines");
    // 4 LLM round-trips at most: run, nudge, nudge, answer.
    assert!(result.execution_path.len() <= 4);
    let nudges = result
        .execution_path
        .iter()
        .filter(|e| e.output.contains("repeating yourself"))
        .count();
    assert_eq!(nudges, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn variables_survive_between_code_steps() {
    let agent = engine(&[
        "```code\nlet total = ctx.grep('beta').length\n```",
        "```code\nreturn total + 1\n```",
        "```answer\n{\"answer\": \"2\", \"confidence\": 1.0}\n```",
    ]);

    let result = agent.run("count beta lines", "alpha\nbeta\ngamma").await;

    assert_eq!(result.answer, "2");
    assert!(result.execution_path[1].output.contains("returned: 2"));
}
