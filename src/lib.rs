//! ctxopt: context optimization for LLM coding assistants.
//!
//! Given a developer goal and a source tree, ctxopt selects the
//! minimal set of code fragments relevant to that goal within a token
//! budget, and can drive a bounded recursive agent that explores the
//! packed context through a sandboxed query API.
//!
//! # Pipeline
//!
//! ```text
//! index:  tree walk → parse → chunk → { dependency graph, vector store }
//! build:  goal → hybrid ranker → token budgeter → BuiltContext (Markdown)
//! agent:  goal + context → LLM loop ⇄ sandbox(query API) → AgentResult
//! ```
//!
//! # Subsystems
//!
//! - [`parser`]: structural extraction (imports, exports, symbols)
//! - [`chunker`]: sliding-window chunking with content hashes
//! - [`graph`]: file dependency graph with distance scoring
//! - [`store`] / [`embedding`]: persistent vectors and providers
//! - [`ranker`] / [`budget`]: hybrid scoring and budget packing
//! - [`indexer`] / [`builder`]: the two orchestrators
//! - [`query`]: the read-only context query surface
//! - [`sandbox`]: the restricted executor for LLM-emitted code
//! - [`agent`]: the recursive engine and its LLM providers

pub mod agent;
pub mod budget;
pub mod builder;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod parser;
pub mod query;
pub mod ranker;
pub mod sandbox;
pub mod store;
pub mod vcs;
pub mod watchdog;

pub use agent::{AgentConfig, AgentResult, RecursiveAgent};
pub use builder::ContextBuilder;
pub use config::Project;
pub use crate::core::types::{BuildOptions, BuiltContext};
pub use indexer::{Indexer, IndexerConfig};
pub use query::ContextQuery;
pub use sandbox::{Sandbox, SandboxConfig};
