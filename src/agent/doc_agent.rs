//! Per-document specialist agents.
//!
//! Each agent owns one document's vector and summary indices and answers
//! through two grounded sub-tools, `fact_lookup` and `summarize`. An
//! answer produced without at least one sub-tool call is rejected.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::Chunk;
use crate::error::AgentError;
use crate::index::{SummaryIndex, TreeSummarizer, VectorIndex};
use crate::llm::{
    ChatRequest, TokenUsage, ToolCall, ToolChoice, ToolResult, query_tool_definition,
    system_message, user_message,
};

use super::AgentRuntime;
use super::outcome::ToolAnswer;
use super::prompt::{render_document, render_grounded};
use super::tool_loop::{ToolHandler, tool_loop};

/// Vector-retrieval sub-tool name.
const FACT_TOOL_NAME: &str = "fact_lookup";
/// Whole-document summarization sub-tool name.
const SUMMARIZE_TOOL_NAME: &str = "summarize";

const FACT_TOOL_DESCRIPTION: &str = "Useful for questions related to specific facts";
const SUMMARIZE_TOOL_DESCRIPTION: &str = "Useful for summarization questions";

/// Registry name of the tool wrapping a document agent.
#[must_use]
pub fn doc_tool_name(doc_key: &str) -> String {
    format!("tool_{doc_key}")
}

/// A specialist agent answering queries about exactly one document.
pub struct DocumentAgent {
    doc_key: String,
    name: String,
    description: String,
    system_prompt: String,
    runtime: AgentRuntime,
    vectors: VectorIndex<Chunk>,
    summary_index: SummaryIndex,
    summarizer: TreeSummarizer,
}

impl fmt::Debug for DocumentAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentAgent")
            .field("doc_key", &self.doc_key)
            .field("chunks", &self.vectors.len())
            .finish_non_exhaustive()
    }
}

impl DocumentAgent {
    /// Assembles the agent for one document.
    ///
    /// `description` is the text other layers retrieve this agent by.
    /// The summarize sub-tool shares the runtime's concurrency budget.
    #[must_use]
    pub fn build(
        doc_key: &str,
        description: impl Into<String>,
        vectors: VectorIndex<Chunk>,
        summary_index: SummaryIndex,
        runtime: &AgentRuntime,
    ) -> Self {
        let summarizer = TreeSummarizer::new(
            Arc::clone(&runtime.provider),
            &runtime.config,
            runtime.prompts.summarize.clone(),
            Arc::clone(&runtime.semaphore),
        );

        Self {
            doc_key: doc_key.to_string(),
            name: doc_tool_name(doc_key),
            description: description.into(),
            system_prompt: render_document(&runtime.prompts.doc_agent, doc_key),
            runtime: runtime.clone(),
            vectors,
            summary_index,
            summarizer,
        }
    }

    /// Key of the document this agent covers.
    #[must_use]
    pub fn doc_key(&self) -> &str {
        &self.doc_key
    }

    /// Tool name this agent is registered under (`tool_<doc_key>`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool description used for retrieval over the registry.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Answers `query` about this agent's document.
    ///
    /// The first reasoning round forces a sub-tool call; later rounds let
    /// the model decide. An answer that never consulted a sub-tool is
    /// rejected rather than returned.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyQuery`] for blank input,
    /// [`AgentError::NoToolInvoked`] when the model answered from prior
    /// knowledge, and other [`AgentError`] values when a capability call
    /// fails.
    pub async fn answer(&self, query: &str) -> Result<ToolAnswer, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }

        debug!(agent = %self.name, query, "document agent query");

        let handler = SubToolHandler {
            agent: self,
            invocations: AtomicUsize::new(0),
            usage: Mutex::new(TokenUsage::default()),
        };

        let mut request = ChatRequest::completion(
            &self.runtime.config.agent_model,
            vec![system_message(&self.system_prompt), user_message(query)],
            Some(self.runtime.config.agent_max_tokens),
        );
        request.tools = vec![
            query_tool_definition(FACT_TOOL_NAME, FACT_TOOL_DESCRIPTION),
            query_tool_definition(SUMMARIZE_TOOL_NAME, SUMMARIZE_TOOL_DESCRIPTION),
        ];
        request.tool_choice = ToolChoice::Required;

        let mut usage = TokenUsage::default();
        let response = tool_loop(
            self.runtime.provider.as_ref(),
            &mut request,
            &handler,
            self.runtime.config.max_tool_iterations,
            &mut usage,
        )
        .await?;

        if handler.invocations.load(Ordering::SeqCst) == 0 {
            return Err(AgentError::NoToolInvoked {
                agent: self.name.clone(),
            });
        }
        usage.absorb(*handler.usage.lock().await);

        Ok(ToolAnswer {
            text: response.content.trim().to_string(),
            usage,
        })
    }

    /// Embeds the question, retrieves the closest chunks, and answers
    /// strictly from that context.
    async fn fact_lookup(&self, query: &str) -> Result<(String, TokenUsage), AgentError> {
        let vector = self.runtime.embedder.embed(query).await?;
        let hits = self.vectors.search(&vector, self.runtime.config.fact_top_k);
        debug!(agent = %self.name, hits = hits.len(), "fact lookup");

        if hits.is_empty() {
            return Ok((
                format!("No indexed content found in `{}` for this question.", self.doc_key),
                TokenUsage::default(),
            ));
        }

        let context = hits
            .iter()
            .map(|hit| hit.meta.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render_grounded(&self.runtime.prompts.qa, &context, query);
        let request = ChatRequest::completion(
            &self.runtime.config.answer_model,
            vec![user_message(&prompt)],
            Some(self.runtime.config.answer_max_tokens),
        );

        let response = self.runtime.provider.chat(&request).await?;
        Ok((response.content.trim().to_string(), response.usage))
    }
}

/// Dispatches the agent's sub-tools inside the reasoning loop.
///
/// An unknown tool name is reported back to the model as a recoverable
/// error; a failing capability aborts the whole answer.
struct SubToolHandler<'a> {
    agent: &'a DocumentAgent,
    invocations: AtomicUsize,
    usage: Mutex<TokenUsage>,
}

#[async_trait]
impl ToolHandler for SubToolHandler<'_> {
    async fn handle(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        let query = call.query_argument();

        match call.name.as_str() {
            FACT_TOOL_NAME => {
                let (text, usage) = self.agent.fact_lookup(&query).await?;
                self.invocations.fetch_add(1, Ordering::SeqCst);
                self.usage.lock().await.absorb(usage);
                Ok(ToolResult::ok(call, text))
            }
            SUMMARIZE_TOOL_NAME => {
                let output = self
                    .agent
                    .summarizer
                    .query(&self.agent.summary_index, &query)
                    .await
                    .map_err(|e| AgentError::ToolInvocation {
                        name: SUMMARIZE_TOOL_NAME.to_string(),
                        message: e.to_string(),
                    })?;
                self.invocations.fetch_add(1, Ordering::SeqCst);
                self.usage.lock().await.absorb(output.usage);
                Ok(ToolResult::ok(call, output.text))
            }
            other => {
                warn!(agent = %self.agent.name, tool = other, "unknown sub-tool requested");
                Ok(ToolResult::error(
                    call,
                    format!(
                        "unknown tool '{other}'; available tools: {FACT_TOOL_NAME}, {SUMMARIZE_TOOL_NAME}"
                    ),
                ))
            }
        }
    }
}
