//! Completion capability: provider-agnostic wire types and the
//! `OpenAI`-compatible transport.

pub mod client;
pub mod message;
pub mod openai;
pub mod provider;
pub mod tool;

pub use client::create_provider;
pub use message::{
    ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage, assistant_tool_calls_message,
    system_message, tool_message, user_message,
};
pub use openai::OpenAiProvider;
pub use provider::LlmProvider;
pub use tool::{ToolCall, ToolChoice, ToolDefinition, ToolResult, query_tool_definition};
