//! Recursive agent engine.
//!
//! An LLM-driven loop over a packed context string: each turn the
//! model emits exactly one action (code to run in the sandbox, a
//! sub-goal to recurse on, or a final answer) and the engine feeds
//! the result back as an observation. Depth, token budget, wall-clock,
//! and iteration caps bound every run.
//!
//! # Architecture
//!
//! ```text
//! goal + context → RecursiveAgent
//!   ├── LlmProvider (OpenAI-compatible, mockable)
//!   ├── parse_action (fenced-block grammar + heuristics)
//!   ├── Sandbox(ContextQuery) for code actions
//!   │   └── rae.completion(...) → sequential sub-agents
//!   └── AgentResult { answer, confidence, execution_path, … }
//! ```

pub mod action;
pub mod config;
pub mod engine;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod state;

// Re-export key types
pub use action::{Action, parse_action};
pub use config::AgentConfig;
pub use engine::{AgentResult, RecursiveAgent, RunStats};
pub use message::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, Role, TokenUsage,
};
pub use provider::LlmProvider;
pub use providers::OpenAiProvider;
pub use state::{EntryAction, ExecutionEntry, TruncationReason, VisitedCode};
