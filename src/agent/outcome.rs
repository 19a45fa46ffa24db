//! Structured results returned from the query boundary.

use serde::Serialize;

use crate::llm::TokenUsage;

/// Which retrieval path produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Two-tier path: tool retrieval, rerank, selection, invocation.
    Agent,
    /// Flat similarity search over the aggregate chunk index.
    Base,
}

impl QueryMode {
    /// Lowercase name, matching the CLI `--mode` values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Base => "base",
        }
    }
}

/// Answer text and cost from one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolAnswer {
    /// The tool's answer text.
    pub text: String,
    /// Token usage the invocation consumed.
    pub usage: TokenUsage,
}

/// One sub-question routed to a document tool by the comparison engine.
#[derive(Debug, Clone, Serialize)]
pub struct SubAnswer {
    /// Tool that answered the sub-question.
    pub tool_name: String,
    /// The focused sub-question posed to that tool.
    pub sub_question: String,
    /// The tool's answer text.
    pub answer: String,
}

/// Record of one tool invocation during a query cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocationRecord {
    /// Name of the invoked tool.
    pub tool_name: String,
    /// Argument the model passed to the tool.
    pub argument: String,
    /// Answer text, when the invocation succeeded.
    pub answer: Option<String>,
    /// Failure description, when it did not.
    pub error: Option<String>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
}

impl ToolInvocationRecord {
    /// Records a successful invocation.
    #[must_use]
    pub fn success(
        tool_name: impl Into<String>,
        argument: impl Into<String>,
        answer: impl Into<String>,
        duration: std::time::Duration,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            argument: argument.into(),
            answer: Some(answer.into()),
            error: None,
            duration_ms: duration_millis(duration),
        }
    }

    /// Records a failed invocation.
    #[must_use]
    pub fn failure(
        tool_name: impl Into<String>,
        argument: impl Into<String>,
        error: impl Into<String>,
        duration: std::time::Duration,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            argument: argument.into(),
            answer: None,
            error: Some(error.into()),
            duration_ms: duration_millis(duration),
        }
    }

    /// Whether this invocation produced an answer.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// The full result of one query cycle.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    /// Final synthesized answer text.
    pub answer: String,
    /// Retrieval path that produced the answer.
    pub mode: QueryMode,
    /// Candidate tool names offered to the model this cycle.
    pub candidates: Vec<String>,
    /// Every tool invocation attempted, in order.
    pub invocations: Vec<ToolInvocationRecord>,
    /// Corrective re-prompts issued for out-of-set selections.
    pub selection_retries: u32,
    /// Token usage aggregated across the cycle.
    pub usage: TokenUsage,
    /// Wall-clock duration of the cycle.
    pub elapsed_ms: u64,
}

fn duration_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
