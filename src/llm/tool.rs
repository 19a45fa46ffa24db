//! Tool-call wire types shared by providers and agents.
//!
//! Every tool in this system takes a single `query` string argument, so
//! the schema builder lives here next to the types.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Definition of a callable tool advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name within one request.
    pub name: String,
    /// Human-readable description the model selects by.
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the result message.
    pub id: String,
    /// Name of the tool being called.
    pub name: String,
    /// Raw JSON argument string as produced by the model.
    pub arguments: String,
}

impl ToolCall {
    /// Extracts the `query` argument common to every tool here.
    ///
    /// Falls back to the raw argument string when it is not the expected
    /// JSON object, so a sloppy model call still carries signal.
    #[must_use]
    pub fn query_argument(&self) -> String {
        #[derive(Deserialize)]
        struct Args {
            query: String,
        }

        serde_json::from_str::<Args>(&self.arguments)
            .map_or_else(|_| self.arguments.trim().to_string(), |args| args.query)
    }
}

/// The outcome of executing a tool call.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Id of the call this result answers.
    pub tool_call_id: String,
    /// Result payload handed back to the model.
    pub content: String,
    /// Marks the payload as an error description.
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result for `call`.
    #[must_use]
    pub fn ok(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result for `call`; the message is surfaced to the model.
    #[must_use]
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content: format!("Error: {}", message.into()),
            is_error: true,
        }
    }
}

/// How the model may use the advertised tools in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    #[default]
    Auto,
    /// The model must call at least one tool this round.
    Required,
}

// ---------------------------------------------------------------------------
// Schema builder
// ---------------------------------------------------------------------------

/// Builds the definition of a tool taking a single `query` string.
#[must_use]
pub fn query_tool_definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to answer with this tool"
                }
            },
            "required": ["query"]
        }),
    }
}
