//! The recursive engine loop.
//!
//! One iteration: pre-check the caps, ask the model, parse its action,
//! apply it (answer terminates; code runs in the sandbox with loop
//! detection; recurse spawns a sequential sub-agent), observe the
//! result back into the transcript, and go again. Sandbox and provider
//! failures are observations, never propagated errors; only an LLM
//! transport failure ends the run as Failed.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::error::SandboxError;
use crate::query::ContextQuery;
use crate::sandbox::{RecursionHook, Sandbox, SandboxConfig, Value, validate_code};
use crate::watchdog::{Breach, Watchdog, WatchdogConfig};

use super::action::{Action, parse_action};
use super::config::AgentConfig;
use super::message::{ChatMessage, CompletionRequest, assistant_message, user_message};
use super::prompt::{REPEAT_NUDGE, opening_message, sub_agent_message, system_prompt_for};
use super::provider::LlmProvider;
use super::state::{EntryAction, ExecutionEntry, ExecutionState, TruncationReason};

/// Confidence reported on truncated results.
const TRUNCATED_CONFIDENCE: f64 = 0.3;

/// Result of one engine run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    /// Final (or truncation/failure) answer text.
    pub answer: String,
    /// Confidence in [0, 1]: model-reported on answers, 0.3 on
    /// truncation, 0 on hard failure.
    pub confidence: f64,
    /// Append-only step log, in step order.
    pub execution_path: Vec<ExecutionEntry>,
    /// Tokens consumed, sub-agents included.
    pub total_tokens: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether a cap stopped the run.
    pub truncated: bool,
    /// Which cap, when truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation_reason: Option<TruncationReason>,
    /// Results of sub-agents spawned from this run, in spawn order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_agent_results: Vec<AgentResult>,
}

/// Everything a (sub-)invocation needs, cheap to clone.
#[derive(Clone)]
struct EngineShared {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
    watchdog: Option<WatchdogConfig>,
}

/// The recursive agent engine.
pub struct RecursiveAgent {
    shared: EngineShared,
}

impl std::fmt::Debug for RecursiveAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveAgent")
            .field("provider", &self.shared.provider.name())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl RecursiveAgent {
    /// Creates an engine over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self {
            shared: EngineShared {
                provider,
                config,
                watchdog: None,
            },
        }
    }

    /// Attaches a watchdog configuration; each run gets a fresh
    /// watchdog with these thresholds.
    #[must_use]
    pub const fn with_watchdog(mut self, config: WatchdogConfig) -> Self {
        self.shared.watchdog = Some(config);
        self
    }

    /// Runs the engine at the root depth.
    pub async fn run(&self, goal: &str, context: &str) -> AgentResult {
        run_depth(
            self.shared.clone(),
            goal.to_string(),
            context.to_string(),
            0,
        )
        .await
    }
}

/// Recursion hook injected into the sandbox: `rae.completion(goal,
/// ctx)` runs a sub-agent synchronously on the blocking thread and
/// hands its result back as a sandbox value.
struct SubAgentHook {
    shared: EngineShared,
    handle: tokio::runtime::Handle,
    depth: usize,
    collected: Mutex<Vec<AgentResult>>,
}

impl RecursionHook for SubAgentHook {
    fn completion(&self, sub_goal: &str, sub_context: &str) -> Result<Value, SandboxError> {
        if !self.shared.config.enable_sub_agents {
            return Err(SandboxError::Eval {
                message: "sub-agents are disabled in this run".to_string(),
            });
        }
        let result = self.handle.block_on(run_depth(
            self.shared.clone(),
            sub_goal.to_string(),
            sub_context.to_string(),
            self.depth + 1,
        ));
        let value = result_to_value(&result);
        if let Ok(mut collected) = self.collected.lock() {
            collected.push(result);
        }
        Ok(value)
    }
}

fn result_to_value(result: &AgentResult) -> Value {
    let json = serde_json::to_value(result).unwrap_or_default();
    Value::from_json(&json)
}

/// One engine invocation at one depth. Boxed for async recursion.
fn run_depth(
    shared: EngineShared,
    goal: String,
    context: String,
    depth: usize,
) -> Pin<Box<dyn Future<Output = AgentResult> + Send>> {
    Box::pin(async move {
        let mut state = ExecutionState::new(depth);
        let mut sub_results: Vec<AgentResult> = Vec::new();
        let mut watchdog = shared.watchdog.map(Watchdog::new);

        let query = ContextQuery::new(context.clone());
        let system_prompt = system_prompt_for(&shared.config.backend).to_string();
        let mut transcript: Vec<ChatMessage> = vec![user_message(&opening_message(
            &goal,
            query.length(),
            query.lines(),
        ))];

        let hook = Arc::new(SubAgentHook {
            shared: shared.clone(),
            handle: tokio::runtime::Handle::current(),
            depth,
            collected: Mutex::new(Vec::new()),
        });
        let sandbox = Arc::new(Mutex::new(
            Sandbox::new(
                query.clone(),
                SandboxConfig {
                    timeout: shared.config.sandbox_timeout(),
                    step_limit: crate::sandbox::DEFAULT_STEP_LIMIT,
                },
            )
            .with_hook(Arc::clone(&hook) as Arc<dyn RecursionHook>),
        ));

        loop {
            // 1. Cap pre-checks.
            let reason = if depth >= shared.config.max_depth {
                Some(TruncationReason::Depth)
            } else if state.consumed_tokens >= shared.config.max_token_budget {
                Some(TruncationReason::Budget)
            } else if state.started.elapsed() >= shared.config.timeout {
                Some(TruncationReason::Timeout)
            } else if state.iterations >= shared.config.max_iterations {
                Some(TruncationReason::Iterations)
            } else {
                watchdog.as_ref().and_then(Watchdog::verdict).map(|breach| {
                    match breach {
                        Breach::Elapsed { .. } => TruncationReason::Timeout,
                        Breach::Stalled { .. } | Breach::FileReads { .. } => {
                            TruncationReason::Iterations
                        }
                    }
                })
            };
            if let Some(reason) = reason {
                return truncated_result(reason, &goal, state, sub_results);
            }

            // 2. Ask the model.
            let request = CompletionRequest {
                model: shared.config.model.clone(),
                system_prompt: system_prompt.clone(),
                messages: transcript.clone(),
                temperature: Some(0.0),
                max_tokens: Some(shared.config.completion_max_tokens),
                stop_sequences: Vec::new(),
            };
            let llm_started = Instant::now();
            let response = match shared.provider.complete(&request).await {
                Ok(response) => response,
                Err(e) => {
                    // Hard failure: answer is the error, path preserved.
                    let message = e.to_string();
                    state.push_entry(EntryAction::Final, "", message.clone(), 0, 0, Some(message.clone()));
                    return AgentResult {
                        answer: message,
                        confidence: 0.0,
                        total_tokens: state.consumed_tokens,
                        duration_ms: elapsed_ms(state.started),
                        truncated: false,
                        truncation_reason: None,
                        execution_path: state.log,
                        sub_agent_results: sub_results,
                    };
                }
            };
            let llm_ms = elapsed_ms(llm_started);
            state.consumed_tokens = state
                .consumed_tokens
                .saturating_add(response.tokens_used.total_tokens);
            state.iterations += 1;

            // 3. Parse the action.
            let action = parse_action(&response.content);
            transcript.push(assistant_message(&response.content));
            debug!(depth, iteration = state.iterations, ?action, "parsed action");

            // 4. Apply it.
            match action {
                Action::Answer { answer, confidence } => {
                    state.push_entry(
                        EntryAction::Final,
                        response.content.clone(),
                        answer.clone(),
                        response.tokens_used.total_tokens,
                        llm_ms,
                        None,
                    );
                    return AgentResult {
                        answer,
                        confidence,
                        total_tokens: state.consumed_tokens,
                        duration_ms: elapsed_ms(state.started),
                        truncated: false,
                        truncation_reason: None,
                        execution_path: state.log,
                        sub_agent_results: sub_results,
                    };
                }

                Action::Code { code } => {
                    // Validation rejections observe without executing.
                    let violations = validate_code(&code);
                    if !violations.is_empty() {
                        let observation = format!(
                            "Code rejected by the sandbox: {}",
                            violations.join(", ")
                        );
                        state.push_entry(
                            EntryAction::Code,
                            code.clone(),
                            observation.clone(),
                            response.tokens_used.total_tokens,
                            llm_ms,
                            Some(observation.clone()),
                        );
                        observe(&mut transcript, &mut watchdog, &observation);
                        continue;
                    }

                    // Loop detection on the code body.
                    if state.visited.record(&code) {
                        state.push_entry(
                            EntryAction::Observe,
                            code.clone(),
                            REPEAT_NUDGE.to_string(),
                            response.tokens_used.total_tokens,
                            llm_ms,
                            None,
                        );
                        observe(&mut transcript, &mut watchdog, REPEAT_NUDGE);
                        continue;
                    }

                    record_file_reads(watchdog.as_mut(), &code);

                    let outcome = execute_in_sandbox(&sandbox, &code).await;
                    let observation = outcome.observation();
                    state.push_entry(
                        EntryAction::Code,
                        code,
                        observation.clone(),
                        response.tokens_used.total_tokens,
                        llm_ms,
                        outcome.error.clone(),
                    );

                    // Sub-agents spawned through rae.completion inside
                    // this execution, in spawn order.
                    drain_hook(&hook, &mut state, &mut sub_results);

                    observe(&mut transcript, &mut watchdog, &observation);
                }

                Action::Recurse {
                    sub_goal,
                    sub_context,
                } => {
                    if !shared.config.enable_sub_agents {
                        let observation =
                            "Sub-agents are disabled in this run; continue with the query API."
                                .to_string();
                        state.push_entry(
                            EntryAction::Observe,
                            sub_goal,
                            observation.clone(),
                            response.tokens_used.total_tokens,
                            llm_ms,
                            None,
                        );
                        observe(&mut transcript, &mut watchdog, &observation);
                        continue;
                    }

                    // Derive the narrower context in the sandbox; any
                    // failure falls back to the parent context.
                    let narrowed = match sub_context {
                        Some(expr) => evaluate_sub_context(&sandbox, &expr)
                            .await
                            .unwrap_or_else(|| context.clone()),
                        None => context.clone(),
                    };

                    let sub = run_depth(
                        shared.clone(),
                        sub_goal.clone(),
                        narrowed,
                        depth + 1,
                    )
                    .await;
                    state.consumed_tokens =
                        state.consumed_tokens.saturating_add(sub.total_tokens);

                    let observation = sub_agent_message(
                        &sub_goal,
                        &sub.answer,
                        sub.confidence,
                        sub.total_tokens,
                    );
                    state.push_entry(
                        EntryAction::Recurse,
                        sub_goal,
                        observation.clone(),
                        response.tokens_used.total_tokens,
                        llm_ms,
                        None,
                    );
                    sub_results.push(sub);
                    observe(&mut transcript, &mut watchdog, &observation);
                }
            }
        }
    })
}

/// Pushes an observation into the transcript and tells the watchdog.
fn observe(transcript: &mut Vec<ChatMessage>, watchdog: &mut Option<Watchdog>, observation: &str) {
    if let Some(dog) = watchdog.as_mut() {
        dog.record_step(observation);
    }
    transcript.push(user_message(observation));
}

/// Counts `getFile('…')` reads for the watchdog.
fn record_file_reads(watchdog: Option<&mut Watchdog>, code: &str) {
    let Some(dog) = watchdog else { return };
    #[allow(clippy::unwrap_used)]
    static GET_FILE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r#"getFile\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap()
    });
    for caps in GET_FILE.captures_iter(code) {
        if let Some(path) = caps.get(1) {
            dog.record_file_read(path.as_str());
        }
    }
}

/// Runs code on the blocking pool; the interpreter enforces its own
/// deadline and step cap, so this cannot wedge the runtime.
async fn execute_in_sandbox(
    sandbox: &Arc<Mutex<Sandbox>>,
    code: &str,
) -> crate::sandbox::ExecOutcome {
    let sandbox = Arc::clone(sandbox);
    let code = code.to_string();
    tokio::task::spawn_blocking(move || match sandbox.lock() {
        Ok(mut guard) => guard.execute(&code),
        Err(_) => crate::sandbox::ExecOutcome {
            success: false,
            error: Some("sandbox mutex poisoned".to_string()),
            ..crate::sandbox::ExecOutcome::default()
        },
    })
    .await
    .unwrap_or_else(|e| crate::sandbox::ExecOutcome {
        success: false,
        error: Some(format!("sandbox task failed: {e}")),
        ..crate::sandbox::ExecOutcome::default()
    })
}

/// Evaluates a sub-context expression in the sandbox; `None` on any
/// failure or non-string result.
async fn evaluate_sub_context(sandbox: &Arc<Mutex<Sandbox>>, expr: &str) -> Option<String> {
    let code = format!("return ({expr})");
    let outcome = execute_in_sandbox(sandbox, &code).await;
    if !outcome.success {
        return None;
    }
    outcome.returned.filter(|s| !s.is_empty())
}

/// Collects sub-agent results spawned through the recursion hook.
fn drain_hook(
    hook: &Arc<SubAgentHook>,
    state: &mut ExecutionState,
    sub_results: &mut Vec<AgentResult>,
) {
    let Ok(mut collected) = hook.collected.lock() else {
        return;
    };
    for sub in collected.drain(..) {
        state.consumed_tokens = state.consumed_tokens.saturating_add(sub.total_tokens);
        sub_results.push(sub);
    }
}

fn truncated_result(
    reason: TruncationReason,
    goal: &str,
    state: ExecutionState,
    sub_results: Vec<AgentResult>,
) -> AgentResult {
    AgentResult {
        answer: format!(
            "Stopped before completing \"{goal}\": {}.",
            reason.describe()
        ),
        confidence: TRUNCATED_CONFIDENCE,
        total_tokens: state.consumed_tokens,
        duration_ms: elapsed_ms(state.started),
        truncated: true,
        truncation_reason: Some(reason),
        execution_path: state.log,
        sub_agent_results: sub_results,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Per-run token/iteration accounting exposed for status displays.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    /// Total tokens consumed.
    pub total_tokens: u32,
    /// Steps in the execution path.
    pub steps: usize,
    /// Sub-agents spawned.
    pub sub_agents: usize,
}

impl AgentResult {
    /// Summarizes the run for status output.
    #[must_use]
    pub fn stats(&self) -> RunStats {
        RunStats {
            total_tokens: self.total_tokens,
            steps: self.execution_path.len(),
            sub_agents: self.sub_agent_results.len(),
        }
    }

    /// Step kinds in path order, for assertions and display.
    #[must_use]
    pub fn action_kinds(&self) -> Vec<EntryAction> {
        self.execution_path.iter().map(|e| e.action).collect()
    }
}

/// Scripted mock provider used across engine tests.
#[cfg(test)]
pub(crate) struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
    tokens_per_call: u32,
}

#[cfg(test)]
impl ScriptedProvider {
    pub(crate) fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(ToString::to_string).collect()),
            tokens_per_call: 100,
        }
    }

    pub(crate) fn with_tokens(responses: &[&str], tokens_per_call: u32) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(ToString::to_string).collect()),
            tokens_per_call,
        }
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<super::message::CompletionResponse, crate::error::AgentError> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| crate::error::AgentError::Provider {
                message: "mutex poisoned".to_string(),
                status: None,
            })?;
        if responses.is_empty() {
            return Err(crate::error::AgentError::Provider {
                message: "scripted provider exhausted".to_string(),
                status: None,
            });
        }
        let content = responses.remove(0);
        Ok(super::message::CompletionResponse {
            content,
            tokens_used: super::message::TokenUsage {
                prompt_tokens: self.tokens_per_call / 2,
                completion_tokens: self.tokens_per_call / 2,
                total_tokens: self.tokens_per_call,
            },
            finish_reason: super::message::FinishReason::Stop,
            error: None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .max_iterations(10)
            .max_depth(3)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn engine(responses: &[&str]) -> RecursiveAgent {
        RecursiveAgent::new(Arc::new(ScriptedProvider::new(responses)), config())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_code_then_answer() {
        let agent = engine(&[
            "```code\nreturn ctx.length()\n```",
            "```answer\n{\"answer\": \"11\", \"confidence\": 0.9}\n```",
        ]);
        let result = agent.run("how long is the context?", "Hello World").await;

        assert_eq!(result.answer, "11");
        assert!((result.confidence - 0.9).abs() < f64::EPSILON);
        assert!(!result.truncated);
        assert_eq!(
            result.action_kinds(),
            vec![EntryAction::Code, EntryAction::Final]
        );
        // The code step's observation carries the returned value.
        assert!(result.execution_path[0].output.contains("returned: 11"));
        assert_eq!(result.total_tokens, 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sandbox_violation_is_observed() {
        let agent = engine(&[
            "```code\nrequire('fs')\n```",
            "```answer\n{\"answer\": \"could not read files\", \"confidence\": 0.4}\n```",
        ]);
        let result = agent.run("read the disk", "irrelevant").await;

        assert_eq!(result.answer, "could not read files");
        assert!(!result.truncated);
        let first = &result.execution_path[0];
        assert_eq!(first.action, EntryAction::Code);
        assert!(first
            .error
            .as_deref()
            .is_some_and(|e| e.contains("require")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_loop_detection_nudges() {
        let same = "```code\nreturn ctx.length()\n```";
        let agent = engine(&[
            same,
            same,
            same,
            "```answer\n{\"answer\": \"done\", \"confidence\": 0.7}\n```",
        ]);
        let result = agent.run("poke around", "Hello World").await;

        assert_eq!(result.answer, "done");
        // 4 LLM calls total; the 2nd and 3rd code blocks were repeats.
        assert!(result.execution_path.len() <= 4);
        let kinds = result.action_kinds();
        assert_eq!(kinds[0], EntryAction::Code);
        assert_eq!(kinds[1], EntryAction::Observe);
        assert_eq!(kinds[2], EntryAction::Observe);
        assert!(result.execution_path[1].output.contains("repeating yourself"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_iteration_cap_truncates() {
        let responses: Vec<String> = (0..20)
            .map(|i| format!("```code\nreturn ctx.find('{i}')\n```"))
            .collect();
        let refs: Vec<&str> = responses.iter().map(String::as_str).collect();
        let provider = Arc::new(ScriptedProvider::new(&refs));
        let config = AgentConfig::builder()
            .api_key("test")
            .max_iterations(3)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = RecursiveAgent::new(provider, config);

        let result = agent.run("never answers", "some context").await;
        assert!(result.truncated);
        assert_eq!(result.truncation_reason, Some(TruncationReason::Iterations));
        assert!((result.confidence - 0.3).abs() < f64::EPSILON);
        assert_eq!(result.execution_path.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_budget_cap_truncates() {
        let provider = Arc::new(ScriptedProvider::with_tokens(
            &["```code\nreturn 1\n```"; 5],
            600,
        ));
        let config = AgentConfig::builder()
            .api_key("test")
            .max_token_budget(1000)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = RecursiveAgent::new(provider, config);

        let result = agent.run("burn tokens", "context").await;
        assert!(result.truncated);
        assert_eq!(result.truncation_reason, Some(TruncationReason::Budget));
        // Two calls of 600 tokens pass the 1000 budget; the third
        // pre-check stops the loop.
        assert_eq!(result.total_tokens, 1200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_depth_cap_truncates_immediately() {
        let provider = Arc::new(ScriptedProvider::new(&["unused"]));
        let config = AgentConfig::builder()
            .api_key("test")
            .max_depth(0)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = RecursiveAgent::new(provider, config);

        let result = agent.run("anything", "context").await;
        assert!(result.truncated);
        assert_eq!(result.truncation_reason, Some(TruncationReason::Depth));
        assert!(result.execution_path.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_provider_error_is_failure() {
        // Exhausted provider errors on the first call.
        let agent = engine(&[]);
        let result = agent.run("goal", "context").await;

        assert!(!result.truncated);
        assert!((result.confidence).abs() < f64::EPSILON);
        assert!(result.answer.contains("exhausted"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recurse_action_spawns_sub_agent() {
        let agent = engine(&[
            // Parent delegates with a narrowing expression.
            "```recurse\n{\"sub_goal\": \"measure the head\", \"sub_context\": \"ctx.head(1)\"}\n```",
            // Sub-agent (depth 1) answers directly.
            "```answer\n{\"answer\": \"first line only\", \"confidence\": 0.8}\n```",
            // Parent wraps up.
            "```answer\n{\"answer\": \"delegated successfully\", \"confidence\": 0.9}\n```",
        ]);
        let result = agent.run("delegate something", "line one\nline two").await;

        assert_eq!(result.answer, "delegated successfully");
        assert_eq!(result.sub_agent_results.len(), 1);
        assert_eq!(result.sub_agent_results[0].answer, "first line only");
        // Parent tokens include the sub-agent's 100.
        assert_eq!(result.total_tokens, 300);
        assert!(result
            .action_kinds()
            .contains(&EntryAction::Recurse));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recurse_disabled_is_observed() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "```recurse\n{\"sub_goal\": \"anything\"}\n```",
            "```answer\n{\"answer\": \"did it myself\", \"confidence\": 0.6}\n```",
        ]));
        let config = AgentConfig::builder()
            .api_key("test")
            .enable_sub_agents(false)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = RecursiveAgent::new(provider, config);

        let result = agent.run("goal", "context").await;
        assert_eq!(result.answer, "did it myself");
        assert!(result.sub_agent_results.is_empty());
        assert!(result.execution_path[0]
            .output
            .contains("disabled"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rae_completion_inside_code() {
        let agent = engine(&[
            // Parent spawns a sub-agent from inside the sandbox.
            "```code\nlet sub = rae.completion('inner question', 'narrow context')\nreturn sub.answer\n```",
            // Sub-agent answer.
            "```answer\n{\"answer\": \"inner result\", \"confidence\": 1.0}\n```",
            // Parent final.
            "```answer\n{\"answer\": \"outer done\", \"confidence\": 0.9}\n```",
        ]);
        let result = agent.run("nested", "outer context").await;

        assert_eq!(result.answer, "outer done");
        assert_eq!(result.sub_agent_results.len(), 1);
        assert_eq!(result.sub_agent_results[0].answer, "inner result");
        // The code observation carries the sub-agent's answer.
        assert!(result.execution_path[0].output.contains("inner result"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watchdog_stall_truncates() {
        // The model keeps producing distinct no-op code that yields the
        // same (empty) observation.
        let responses: Vec<String> = (0..10)
            .map(|i| format!("```code\nlet x{i} = {i}\n```"))
            .collect();
        let refs: Vec<&str> = responses.iter().map(String::as_str).collect();
        let provider = Arc::new(ScriptedProvider::new(&refs));
        let agent = RecursiveAgent::new(provider, config()).with_watchdog(WatchdogConfig {
            max_stalled_steps: 2,
            ..WatchdogConfig::default()
        });

        let result = agent.run("stall out", "context").await;
        assert!(result.truncated);
        assert_eq!(result.truncation_reason, Some(TruncationReason::Iterations));
    }
}
