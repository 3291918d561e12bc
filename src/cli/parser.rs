//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ctxopt: context optimization for LLM coding assistants.
///
/// Indexes a source tree, ranks and packs the fragments relevant to a
/// goal into a token budget, and optionally drives a bounded recursive
/// agent over the packed context.
#[derive(Parser, Debug)]
#[command(name = "ctxopt")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root directory.
    ///
    /// Defaults to the nearest ancestor containing `.contextos/`.
    #[arg(short = 'C', long, env = "CTXOPT_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project state (.contextos/).
    #[command(after_help = r"Examples:
  ctxopt init                    # Initialize in the current directory
  ctxopt init --name my-service  # Set the project name
")]
    Init {
        /// Project name recorded in context.yaml.
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Index the source tree into the graph and vector store.
    #[command(after_help = r"Examples:
  ctxopt index            # Incremental: unchanged files are skipped
  ctxopt index --force    # Re-parse everything
")]
    Index {
        /// Re-index files even when their content hash is unchanged.
        #[arg(short, long)]
        force: bool,
    },

    /// Build a packed context for a goal.
    #[command(after_help = r#"Examples:
  ctxopt build "add retry logic to the uploader"
  ctxopt build "fix login" --target src/auth.ts
  ctxopt build --max-tokens 4000        # Goal inferred from VCS state
  ctxopt --format json build "refactor" | jq .savings
"#)]
    Build {
        /// Developer goal. Omit to infer from staged/working changes.
        goal: Option<String>,

        /// Target file anchoring structural ranking.
        #[arg(short, long)]
        target: Option<String>,

        /// Token budget for the packed context.
        #[arg(short, long)]
        max_tokens: Option<usize>,

        /// Model id selecting the token counter.
        #[arg(long)]
        model: Option<String>,

        /// Leave project rules out of the core text.
        #[arg(long)]
        no_rules: bool,
    },

    /// Run the recursive agent over the last built context.
    #[command(after_help = r#"Examples:
  ctxopt agent "where is the retry budget enforced?"
  ctxopt agent "summarize error handling" --max-iterations 6
  ctxopt agent "trace the upload path" --no-sub-agents
"#)]
    Agent {
        /// Question or task for the agent.
        goal: String,

        /// Maximum recursion depth for sub-agents.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Total token budget for the run.
        #[arg(long)]
        max_token_budget: Option<u32>,

        /// Wall-clock limit in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Iteration cap per depth.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Disable sub-agent recursion.
        #[arg(long)]
        no_sub_agents: bool,

        /// Enable the stall/elapsed watchdog.
        #[arg(long)]
        watchdog: bool,
    },

    /// Show index and cache status.
    Status,
}
