//! Hierarchical retrieval and question answering over a documentation
//! corpus.
//!
//! Every document in the corpus becomes a retrieval agent: its text is
//! chunked, embedded into a vector index, and summarized into a one-line
//! tool description. A top-level agent answers questions by retrieving
//! the most relevant document tools, pruning them with an LLM rerank,
//! and letting the model select and invoke tools until it can answer.
//! A comparison tool decomposes cross-document questions into focused
//! sub-questions and synthesizes the partial answers.
//!
//! The flat alternative, [`base::BaseEngine`], searches one aggregate
//! chunk index and answers with a single grounded completion.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docent_rs::agent::{AgentRuntime, PromptSet};
//! use docent_rs::cache::MemoryCache;
//! use docent_rs::embed::OpenAiEmbedder;
//! use docent_rs::llm::create_provider;
//! use docent_rs::{CorpusLoader, DocentConfig, DocentEngine, QueryMode};
//!
//! # async fn run() -> docent_rs::Result<()> {
//! let config = DocentConfig::from_env()?;
//! let provider = Arc::from(create_provider(&config)?);
//! let embedder = Arc::new(OpenAiEmbedder::new(&config));
//! let prompts = PromptSet::load(config.prompt_dir.as_deref());
//! let runtime = AgentRuntime::new(provider, embedder, prompts, config);
//!
//! let corpus = CorpusLoader::new("./docs").load()?;
//! let engine = DocentEngine::build(corpus, runtime, Arc::new(MemoryCache::new())).await?;
//! let outcome = engine.query("What does the pricing page say?", QueryMode::Agent).await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod base;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod embed;
pub mod error;
pub mod index;
pub mod ingest;
pub mod io;
pub mod llm;
pub mod registry;
pub mod rerank;
pub mod source;
pub mod summarize;

pub use agent::{QueryMode, QueryOutcome};
pub use config::DocentConfig;
pub use error::{DocentError, Result};
pub use ingest::{DocentEngine, IngestReport};
pub use source::CorpusLoader;
