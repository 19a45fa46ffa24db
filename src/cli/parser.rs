//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Answers questions over a documentation corpus through per-document
/// retrieval agents and a tool-retrieving top-level agent.
#[derive(Parser, Debug)]
#[command(name = "docent-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the documentation corpus.
    #[arg(short = 'd', long, env = "DOCENT_DOCS_DIR", global = true)]
    pub docs_dir: Option<PathBuf>,

    /// Directory for the persistent index cache.
    ///
    /// Defaults to the platform data directory (for example
    /// `~/.local/share/docent`).
    #[arg(long, env = "DOCENT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory containing prompt template overrides.
    #[arg(long, global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the documentation corpus and build its document agents.
    ///
    /// Indexes and summarizes every document, persisting chunk vectors
    /// and summaries so later runs come up from cache.
    #[command(after_help = r#"Examples:
  docent-rs --docs-dir ./docs ingest               # Index every document
  docent-rs --docs-dir ./docs ingest --limit 10    # First 10 files only
  docent-rs --docs-dir ./docs ingest --fresh       # Drop caches and rebuild
  docent-rs --format json --docs-dir ./docs ingest | jq '.indexed'
"#)]
    Ingest {
        /// Cap the corpus to the first N files in walk order.
        #[arg(long)]
        limit: Option<usize>,

        /// Delete the cache database before ingesting.
        #[arg(long)]
        fresh: bool,
    },

    /// Answer a question over the ingested corpus.
    #[command(after_help = r#"Examples:
  docent-rs --docs-dir ./docs query "What is the price?"
  docent-rs --docs-dir ./docs query "Compare pricing and FAQ policies"
  docent-rs --docs-dir ./docs query --mode base "What is the price?"
  docent-rs --format json --docs-dir ./docs query "..." | jq -r '.answer'
"#)]
    Query {
        /// The question to answer.
        query: String,

        /// Query path: agent (two-tier agents) or base (flat retrieval).
        #[arg(short, long, default_value = "agent")]
        mode: String,
    },

    /// List the registered document tools and their descriptions.
    Tools,

    /// Show configuration, cache, and corpus status.
    Status,

    /// Write default prompt templates to disk for customization.
    ///
    /// Creates markdown template files in the prompt directory so the
    /// agent prompts can be customized without recompiling.
    #[command(name = "init-prompts")]
    #[command(after_help = r#"Examples:
  docent-rs init-prompts                  # Write to ~/.config/docent-rs/prompts/
  docent-rs init-prompts --dir ./prompts  # Write to a custom directory
"#)]
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/docent-rs/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}
