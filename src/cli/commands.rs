//! Command implementations.
//!
//! Each command resolves configuration, builds whatever runtime it
//! needs, and returns rendered output; `main` only prints it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::{AgentRuntime, PromptSet, QueryMode};
use crate::cache::SqliteCache;
use crate::cli::output::{self, OutputFormat, StatusReport, ToolInfo};
use crate::cli::parser::{Cli, Commands};
use crate::config::{DocentConfig, DocentConfigBuilder};
use crate::embed::OpenAiEmbedder;
use crate::error::{CommandError, Result};
use crate::ingest::DocentEngine;
use crate::llm::create_provider;
use crate::source::CorpusLoader;

/// File name of the cache database inside the data directory.
const CACHE_FILENAME: &str = "cache.db";

/// Executes the parsed CLI command and returns its rendered output.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format).ok_or_else(|| CommandError::InvalidArgument {
        message: format!(
            "unknown output format '{}' (expected text or json)",
            cli.format
        ),
    })?;

    match &cli.command {
        Commands::Ingest { limit, fresh } => cmd_ingest(cli, format, *limit, *fresh),
        Commands::Query { query, mode } => cmd_query(cli, format, query, mode),
        Commands::Tools => cmd_tools(cli, format),
        Commands::Status => cmd_status(cli, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(format, dir.as_deref()),
    }
}

fn require_docs_dir(cli: &Cli) -> Result<PathBuf> {
    cli.docs_dir
        .clone()
        .ok_or_else(|| CommandError::DocsDirMissing.into())
}

fn config_builder(cli: &Cli) -> DocentConfigBuilder {
    let mut builder = DocentConfig::builder().from_env();
    if let Some(dir) = &cli.data_dir {
        builder = builder.data_dir(dir);
    }
    if let Some(dir) = &cli.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    builder
}

fn build_runtime(config: DocentConfig) -> Result<AgentRuntime> {
    let provider = Arc::from(create_provider(&config)?);
    let embedder = Arc::new(OpenAiEmbedder::new(&config));
    let prompts = PromptSet::load(config.prompt_dir.as_deref());
    Ok(AgentRuntime::new(provider, embedder, prompts, config))
}

fn async_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new().map_err(|e| CommandError::Runtime {
        message: format!("failed to start async runtime: {e}"),
    })?)
}

fn parse_mode(name: &str) -> Result<QueryMode> {
    match name.to_lowercase().as_str() {
        "agent" => Ok(QueryMode::Agent),
        "base" => Ok(QueryMode::Base),
        _ => Err(CommandError::InvalidArgument {
            message: format!("unknown query mode '{name}' (expected agent or base)"),
        }
        .into()),
    }
}

/// Builds the engine over the corpus, reading artifacts from cache
/// where content hashes still match.
fn build_engine(
    docs_dir: &Path,
    limit: Option<usize>,
    config: DocentConfig,
) -> Result<DocentEngine> {
    let cache_path = config.data_dir.join(CACHE_FILENAME);
    let mut loader = CorpusLoader::new(docs_dir);
    if let Some(limit) = limit {
        loader = loader.limit(limit);
    }
    let corpus = loader.load()?;
    let cache = Arc::new(SqliteCache::open(&cache_path)?);
    let runtime = build_runtime(config)?;
    let rt = async_runtime()?;
    Ok(rt.block_on(DocentEngine::build(corpus, runtime, cache))?)
}

fn cmd_ingest(cli: &Cli, format: OutputFormat, limit: Option<usize>, fresh: bool) -> Result<String> {
    let docs_dir = require_docs_dir(cli)?;
    let config = config_builder(cli).build()?;
    if fresh {
        let cache_path = config.data_dir.join(CACHE_FILENAME);
        if cache_path.exists() {
            fs::remove_file(&cache_path)?;
        }
    }
    let engine = build_engine(&docs_dir, limit, config)?;
    output::render_report(engine.report(), format).map_err(Into::into)
}

fn cmd_query(cli: &Cli, format: OutputFormat, query: &str, mode: &str) -> Result<String> {
    let docs_dir = require_docs_dir(cli)?;
    let mode = parse_mode(mode)?;
    let config = config_builder(cli).build()?;
    let cache_path = config.data_dir.join(CACHE_FILENAME);
    let corpus = CorpusLoader::new(&docs_dir).load()?;
    let cache = Arc::new(SqliteCache::open(&cache_path)?);
    let runtime = build_runtime(config)?;
    let rt = async_runtime()?;
    let outcome = rt.block_on(async {
        let engine = DocentEngine::build(corpus, runtime, cache).await?;
        engine.query(query, mode).await
    })?;
    output::render_outcome(&outcome, format, cli.verbose).map_err(Into::into)
}

fn cmd_tools(cli: &Cli, format: OutputFormat) -> Result<String> {
    let docs_dir = require_docs_dir(cli)?;
    let config = config_builder(cli).build()?;
    let engine = build_engine(&docs_dir, None, config)?;
    let tools: Vec<ToolInfo> = engine
        .registry()
        .names()
        .into_iter()
        .filter_map(|name| {
            engine.registry().get(name).map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
        })
        .collect();
    output::render_tools(&tools, format).map_err(Into::into)
}

fn cmd_status(cli: &Cli, format: OutputFormat) -> Result<String> {
    // Status must render even before any API key is configured.
    let (config, api_key_present) = match config_builder(cli).build() {
        Ok(config) => (config, true),
        Err(_) => (config_builder(cli).api_key("").build()?, false),
    };
    let cache_path = config.data_dir.join(CACHE_FILENAME);
    // Opening would create an empty database, so peek only when present.
    let cache_stats = if cache_path.exists() {
        SqliteCache::open(&cache_path)
            .and_then(|cache| cache.stats())
            .ok()
    } else {
        None
    };
    let status = StatusReport {
        provider: config.provider.clone(),
        agent_model: config.agent_model.clone(),
        answer_model: config.answer_model.clone(),
        embed_model: config.embed_model.clone(),
        docs_dir: cli.docs_dir.as_ref().map(|p| p.display().to_string()),
        data_dir: config.data_dir.display().to_string(),
        cache_path: cache_path.display().to_string(),
        cache_entries: cache_stats.map(|s| s.entries),
        cache_bytes: cache_stats.map(|s| s.total_bytes),
        prompt_dir: config.prompt_dir.as_ref().map(|p| p.display().to_string()),
        api_key_present,
    };
    output::render_status(&status, format).map_err(Into::into)
}

fn cmd_init_prompts(format: OutputFormat, dir: Option<&Path>) -> Result<String> {
    let target = match dir {
        Some(dir) => dir.to_path_buf(),
        None => PromptSet::default_dir().ok_or_else(|| CommandError::InvalidArgument {
            message: "cannot determine a default prompt directory (pass --dir)".to_string(),
        })?,
    };
    let written = PromptSet::write_defaults(&target)?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "directory": target.display().to_string(),
                "written": written
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>(),
                "count": written.len(),
            });
            output::render_json(&value).map_err(Into::into)
        }
        OutputFormat::Text => {
            let mut out = format!(
                "Wrote {} prompt template(s) to: {}",
                written.len(),
                target.display()
            );
            if written.is_empty() {
                out.push_str("\nAll templates already exist; none were overwritten.");
            }
            Ok(out)
        }
    }
}
