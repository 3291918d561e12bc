//! Command dispatch.
//!
//! Thin glue between the parsed CLI and the library: each handler
//! opens the project, drives one pipeline, and prints text or JSON.
//! Anything with systems weight lives in the library modules.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::agent::{AgentConfig, OpenAiProvider, RecursiveAgent};
use crate::builder::ContextBuilder;
use crate::config::Project;
use crate::core::types::BuildOptions;
use crate::embedding::create_embedder;
use crate::indexer::Indexer;
use crate::vcs::GitChanges;
use crate::watchdog::WatchdogConfig;

use super::parser::{Cli, Commands};

/// Runs the parsed CLI to completion.
pub async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let root = cli.root.clone().unwrap_or(cwd);
    let json = cli.format == "json";

    match cli.command {
        Commands::Init { name } => init(&root, name.as_deref(), json),
        Commands::Index { force } => index(&root, force, json).await,
        Commands::Build {
            goal,
            target,
            max_tokens,
            model,
            no_rules,
        } => build(&root, goal, target, max_tokens, model, no_rules, json).await,
        Commands::Agent {
            goal,
            max_depth,
            max_token_budget,
            timeout_secs,
            max_iterations,
            no_sub_agents,
            watchdog,
        } => {
            agent(
                &root,
                &goal,
                AgentFlags {
                    max_depth,
                    max_token_budget,
                    timeout_secs,
                    max_iterations,
                    no_sub_agents,
                    watchdog,
                },
                json,
            )
            .await
        }
        Commands::Status => status(&root, json),
    }
}

fn init(root: &Path, name: Option<&str>, json: bool) -> Result<()> {
    let fallback = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    let project = Project::init(root, name.unwrap_or(&fallback))?;

    if json {
        emit(&serde_json::json!({
            "root": project.root,
            "state_dir": project.state_dir,
        }));
    } else {
        emit_text(&format!(
            "Initialized project state in {}",
            project.state_dir.display()
        ));
    }
    Ok(())
}

async fn index(root: &Path, force: bool, json: bool) -> Result<()> {
    let project = Project::discover(root)?;
    let embedder: Arc<dyn crate::embedding::Embedder> = Arc::from(create_embedder()?);
    let mut indexer = Indexer::open(project.indexer_config(), embedder)?;
    let report = indexer.index(force).await?;

    if json {
        emit(&serde_json::to_value(&report)?);
    } else {
        emit_text(&format!(
            "Indexed {} files ({} chunks) in {}ms; {} unchanged, {} removed",
            report.files_indexed,
            report.chunks_created,
            report.duration.as_millis(),
            report.files_skipped,
            report.files_removed,
        ));
        for warning in &report.warnings {
            emit_text(&format!("warning: {warning}"));
        }
    }
    Ok(())
}

async fn build(
    root: &Path,
    goal: Option<String>,
    target: Option<String>,
    max_tokens: Option<usize>,
    model: Option<String>,
    no_rules: bool,
    json: bool,
) -> Result<()> {
    let project = Project::discover(root)?;
    let embedder: Arc<dyn crate::embedding::Embedder> = Arc::from(create_embedder()?);

    let mut builder = ContextBuilder::new(project.clone(), embedder)
        .with_change_source(Arc::new(GitChanges::new(project.root.clone())));
    if let Ok(config) = AgentConfig::from_env() {
        builder = builder.with_llm(Arc::new(OpenAiProvider::new(&config)));
    }

    let options = BuildOptions {
        goal: goal.unwrap_or_default(),
        target_file: target,
        max_tokens: max_tokens.unwrap_or(project.config.budget.max_tokens),
        include_rules: !no_rules,
        model: model.unwrap_or_else(|| project.config.budget.target_model.clone()),
    };

    let built = builder.build(&options).await?;

    if json {
        emit(&serde_json::to_value(&built)?);
    } else {
        let markdown = std::fs::read_to_string(project.last_context_path())
            .context("built context cache missing")?;
        emit_text(&markdown);
    }
    Ok(())
}

struct AgentFlags {
    max_depth: Option<usize>,
    max_token_budget: Option<u32>,
    timeout_secs: Option<u64>,
    max_iterations: Option<usize>,
    no_sub_agents: bool,
    watchdog: bool,
}

async fn agent(root: &Path, goal: &str, flags: AgentFlags, json: bool) -> Result<()> {
    let project = Project::discover(root)?;
    let context = std::fs::read_to_string(project.last_context_path())
        .context("no built context found; run `ctxopt build` first")?;

    let mut config_builder = AgentConfig::builder().from_env();
    if let Some(depth) = flags.max_depth {
        config_builder = config_builder.max_depth(depth);
    }
    if let Some(budget) = flags.max_token_budget {
        config_builder = config_builder.max_token_budget(budget);
    }
    if let Some(secs) = flags.timeout_secs {
        config_builder = config_builder.timeout(Duration::from_secs(secs));
    }
    if let Some(iterations) = flags.max_iterations {
        config_builder = config_builder.max_iterations(iterations);
    }
    if flags.no_sub_agents {
        config_builder = config_builder.enable_sub_agents(false);
    }
    let config = config_builder.build()?;

    let provider = Arc::new(OpenAiProvider::new(&config));
    let mut engine = RecursiveAgent::new(provider, config);
    if flags.watchdog {
        engine = engine.with_watchdog(WatchdogConfig::default());
    }

    let result = engine.run(goal, &context).await;

    if json {
        emit(&serde_json::to_value(&result)?);
    } else {
        emit_text(&result.answer);
        let stats = result.stats();
        emit_text(&format!(
            "\n[confidence {:.2} | {} steps | {} sub-agents | {} tokens{}]",
            result.confidence,
            stats.steps,
            stats.sub_agents,
            stats.total_tokens,
            result
                .truncation_reason
                .map(|r| format!(" | truncated: {}", r.describe()))
                .unwrap_or_default(),
        ));
    }
    Ok(())
}

fn status(root: &Path, json: bool) -> Result<()> {
    let project = Project::discover(root)?;
    let graph = crate::graph::DependencyGraph::load(&project.graph_path());
    let store = crate::store::VectorStore::open(&project.store_path())?;
    let stats = store.stats()?;
    let last_context = project.last_context_path();

    if json {
        emit(&serde_json::json!({
            "root": project.root,
            "nodes": graph.node_count(),
            "edges": graph.edge_count(),
            "vectors": stats.vector_count,
            "vector_dim": stats.dim,
            "last_context": last_context.is_file(),
        }));
    } else {
        emit_text(&format!("Project: {}", project.root.display()));
        emit_text(&format!(
            "Graph: {} files, {} import edges",
            graph.node_count(),
            graph.edge_count()
        ));
        emit_text(&format!(
            "Vectors: {} ({}-dim) across {} files",
            stats.vector_count, stats.dim, stats.path_count
        ));
        emit_text(&format!(
            "Last context: {}",
            if last_context.is_file() {
                "cached"
            } else {
                "none (run `ctxopt build`)"
            }
        ));
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn emit(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

#[allow(clippy::print_stdout)]
fn emit_text(text: &str) {
    println!("{text}");
}
