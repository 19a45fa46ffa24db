//! Two-tier agentic query system.
//!
//! One specialized agent per document answers grounded questions about
//! its own document; a top-level agent retrieves, filters, and invokes
//! those agents as tools. Uses a pluggable provider abstraction backed
//! by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! User query → TopAgent
//!   ├── RerankingRetriever (object index search, then rerank filter)
//!   ├── plan_comparison → per-query compare_tool over the survivors
//!   ├── Selection (function calling over the candidate set)
//!   ├── Invoking → DocumentAgent::answer / SubQuestionEngine::answer
//!   │   └── Each DocumentAgent runs its own tool loop over
//!   │       fact_lookup and summarize
//!   └── Synthesizing → final answer + QueryOutcome diagnostics
//! ```

pub mod compare;
pub mod doc_agent;
pub mod orchestrator;
pub mod outcome;
pub mod prompt;
pub mod tool;
pub mod tool_loop;

use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::DocentConfig;
use crate::embed::Embedder;
use crate::llm::LlmProvider;

// Re-export key types
pub use compare::{COMPARE_TOOL_NAME, SubQuestionEngine, plan_comparison};
pub use doc_agent::{DocumentAgent, doc_tool_name};
pub use orchestrator::{Phase, TopAgent};
pub use outcome::{QueryMode, QueryOutcome, SubAnswer, ToolAnswer, ToolInvocationRecord};
pub use prompt::PromptSet;
pub use tool::QueryTool;
pub use tool_loop::{ToolHandler, tool_loop};

/// Shared handles threaded through every agent layer.
///
/// Cloning is cheap; all members are reference-counted. The semaphore
/// bounds fan-out work (summarize rounds, corpus ingestion); holders
/// must not acquire a second permit while keeping one.
#[derive(Clone)]
pub struct AgentRuntime {
    /// Completion capability.
    pub provider: Arc<dyn LlmProvider>,
    /// Embedding capability.
    pub embedder: Arc<dyn Embedder>,
    /// Resolved prompt templates.
    pub prompts: Arc<PromptSet>,
    /// Engine configuration.
    pub config: Arc<DocentConfig>,
    /// Concurrency bound for fan-out work.
    pub semaphore: Arc<Semaphore>,
}

impl fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("provider", &self.provider.name())
            .field("embedder", &self.embedder.name())
            .finish_non_exhaustive()
    }
}

impl AgentRuntime {
    /// Bundles the capabilities with a semaphore sized from the config.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        prompts: PromptSet,
        config: DocentConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            provider,
            embedder,
            prompts: Arc::new(prompts),
            config: Arc::new(config),
            semaphore,
        }
    }
}
