//! Query tools the top-level agent selects among.

use std::sync::Arc;

use crate::error::AgentError;

use super::compare::{COMPARE_TOOL_NAME, SubQuestionEngine};
use super::doc_agent::DocumentAgent;
use super::outcome::ToolAnswer;
use super::prompt::COMPARE_TOOL_DESCRIPTION;

/// A tool the top-level agent can select and invoke.
#[derive(Debug, Clone)]
pub enum QueryTool {
    /// One document's specialist agent.
    Document(Arc<DocumentAgent>),
    /// The per-query comparison engine.
    Compare(Arc<SubQuestionEngine>),
}

impl QueryTool {
    /// Registered tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Document(agent) => agent.name(),
            Self::Compare(_) => COMPARE_TOOL_NAME,
        }
    }

    /// Description the model selects this tool by.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Document(agent) => agent.description(),
            Self::Compare(_) => COMPARE_TOOL_DESCRIPTION,
        }
    }

    /// Invokes the tool on `query`.
    ///
    /// # Errors
    ///
    /// Propagates the underlying agent or engine failure.
    pub async fn answer(&self, query: &str) -> Result<ToolAnswer, AgentError> {
        match self {
            Self::Document(agent) => agent.answer(query).await,
            Self::Compare(engine) => engine.answer(query).await,
        }
    }
}
