//! Per-query comparison over multiple documents.
//!
//! Comparison queries are decomposed into one sub-question per relevant
//! document agent, fanned out concurrently, and the partial answers are
//! synthesized into a single response. A fresh engine is planned for
//! every query cycle from the tools that survived filtering.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::llm::{ChatRequest, TokenUsage, system_message, user_message};

use super::AgentRuntime;
use super::doc_agent::DocumentAgent;
use super::outcome::{SubAnswer, ToolAnswer};
use super::prompt::{ToolBrief, build_decompose_prompt, build_synthesize_prompt};
use super::tool::QueryTool;

/// Name of the per-query comparison tool.
pub const COMPARE_TOOL_NAME: &str = "compare_tool";

/// Builds the comparison tool for one query cycle.
///
/// Only document tools from `candidates` are bound; the engine answers
/// cross-document questions by querying those agents individually.
#[must_use]
pub fn plan_comparison(candidates: &[QueryTool], runtime: &AgentRuntime) -> QueryTool {
    let agents: Vec<Arc<DocumentAgent>> = candidates
        .iter()
        .filter_map(|tool| match tool {
            QueryTool::Document(agent) => Some(Arc::clone(agent)),
            QueryTool::Compare(_) => None,
        })
        .collect();

    QueryTool::Compare(Arc::new(SubQuestionEngine::new(agents, runtime.clone())))
}

/// Decompose-and-gather engine behind `compare_tool`.
pub struct SubQuestionEngine {
    agents: Vec<Arc<DocumentAgent>>,
    runtime: AgentRuntime,
}

impl fmt::Debug for SubQuestionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubQuestionEngine")
            .field("agents", &self.agents.len())
            .finish_non_exhaustive()
    }
}

impl SubQuestionEngine {
    /// Binds the engine to the document agents it may consult.
    #[must_use]
    pub fn new(agents: Vec<Arc<DocumentAgent>>, runtime: AgentRuntime) -> Self {
        Self { agents, runtime }
    }

    /// Number of document agents bound to this engine.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Answers a comparison query across the bound documents.
    ///
    /// Sub-questions naming a tool outside the bound set are dropped;
    /// failed sub-invocations are dropped from synthesis. The whole
    /// query fails only when nothing usable remains.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Decomposition`] when no sub-question maps
    /// to a bound tool, [`AgentError::AllToolsFailed`] when every
    /// sub-invocation failed, and other [`AgentError`] values when a
    /// capability call fails.
    pub async fn answer(&self, query: &str) -> Result<ToolAnswer, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }
        if self.agents.is_empty() {
            return Err(AgentError::Decomposition {
                message: "no document tools available for comparison".to_string(),
            });
        }

        let mut usage = TokenUsage::default();

        let plan = self.decompose(query, &mut usage).await?;
        debug!(sub_questions = plan.len(), "comparison plan");

        let sub_answers = self.gather(plan, &mut usage).await?;
        let text = self.synthesize(query, &sub_answers, &mut usage).await?;

        Ok(ToolAnswer { text, usage })
    }

    /// Splits the query into per-document sub-questions.
    async fn decompose(
        &self,
        query: &str,
        usage: &mut TokenUsage,
    ) -> Result<Vec<(Arc<DocumentAgent>, String)>, AgentError> {
        let briefs: Vec<ToolBrief<'_>> = self
            .agents
            .iter()
            .map(|agent| ToolBrief {
                name: agent.name(),
                description: agent.description(),
            })
            .collect();

        let request = ChatRequest::json_completion(
            &self.runtime.config.agent_model,
            vec![
                system_message(&self.runtime.prompts.decompose),
                user_message(&build_decompose_prompt(query, &briefs)),
            ],
            Some(self.runtime.config.agent_max_tokens),
        );
        let response = self.runtime.provider.chat(&request).await?;
        usage.absorb(response.usage);

        let mut plan = Vec::new();
        for item in parse_sub_questions(&response.content)? {
            if item.sub_question.trim().is_empty() {
                warn!(tool = %item.tool_name, "dropping empty sub-question");
                continue;
            }
            match self.agents.iter().find(|a| a.name() == item.tool_name) {
                Some(agent) => plan.push((Arc::clone(agent), item.sub_question)),
                None => {
                    warn!(tool = %item.tool_name, "decomposition named an unbound tool");
                }
            }
        }

        if plan.is_empty() {
            return Err(AgentError::Decomposition {
                message: "no sub-question matched an available tool".to_string(),
            });
        }
        Ok(plan)
    }

    /// Runs every sub-question concurrently and keeps the successes.
    async fn gather(
        &self,
        plan: Vec<(Arc<DocumentAgent>, String)>,
        usage: &mut TokenUsage,
    ) -> Result<Vec<SubAnswer>, AgentError> {
        let attempted = plan.len();

        let mut handles = Vec::with_capacity(attempted);
        for (agent, sub_question) in plan {
            handles.push(tokio::spawn(async move {
                let answer = agent.answer(&sub_question).await;
                (agent.name().to_string(), sub_question, answer)
            }));
        }

        let mut sub_answers = Vec::with_capacity(attempted);
        for handle in handles {
            let (tool_name, sub_question, answer) =
                handle.await.map_err(|e| AgentError::Orchestration {
                    message: format!("comparison task failed: {e}"),
                })?;
            match answer {
                Ok(answer) => {
                    usage.absorb(answer.usage);
                    sub_answers.push(SubAnswer {
                        tool_name,
                        sub_question,
                        answer: answer.text,
                    });
                }
                Err(e) => {
                    warn!(tool = %tool_name, error = %e, "sub-question failed");
                }
            }
        }

        if sub_answers.is_empty() {
            return Err(AgentError::AllToolsFailed { attempted });
        }
        Ok(sub_answers)
    }

    /// Combines the sub-answers into one response to the original query.
    async fn synthesize(
        &self,
        query: &str,
        sub_answers: &[SubAnswer],
        usage: &mut TokenUsage,
    ) -> Result<String, AgentError> {
        let request = ChatRequest::completion(
            &self.runtime.config.agent_model,
            vec![
                system_message(&self.runtime.prompts.synthesize),
                user_message(&build_synthesize_prompt(query, sub_answers)),
            ],
            Some(self.runtime.config.answer_max_tokens),
        );
        let response = self.runtime.provider.chat(&request).await?;
        usage.absorb(response.usage);

        Ok(response.content.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawSubQuestion {
    tool_name: String,
    sub_question: String,
}

/// Parses the decomposition response into raw sub-questions.
fn parse_sub_questions(content: &str) -> Result<Vec<RawSubQuestion>, AgentError> {
    let trimmed = content.trim();

    // Handle markdown code blocks
    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    // Try as array first
    let array_err = match serde_json::from_str::<Vec<RawSubQuestion>>(json_str) {
        Ok(items) => return Ok(items),
        Err(e) => e,
    };

    // Try as wrapper object: {"sub_questions": [...]}
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) {
        if let Some(arr) = value.get("sub_questions").and_then(|v| v.as_array()) {
            let json_arr = serde_json::Value::Array(arr.clone());
            if let Ok(items) = serde_json::from_value::<Vec<RawSubQuestion>>(json_arr) {
                return Ok(items);
            }
        }
        // Try as a single sub-question object
        if let Ok(single) = serde_json::from_value::<RawSubQuestion>(value) {
            return Ok(vec![single]);
        }
    }

    let preview: String = json_str.chars().take(200).collect();
    Err(AgentError::ResponseParse {
        message: format!("failed to parse sub-questions: {array_err}"),
        content: preview,
    })
}
