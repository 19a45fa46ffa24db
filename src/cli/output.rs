//! Rendering of command results in text and JSON form.

#![allow(clippy::format_push_string)]

use serde::Serialize;

use crate::agent::QueryOutcome;
use crate::error::CommandError;
use crate::ingest::IngestReport;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// One registered tool, as listed by the `tools` command.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Registered tool name.
    pub name: String,
    /// Description the registry indexes the tool under.
    pub description: String,
}

/// Configuration and cache state, as shown by the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Configured LLM provider name.
    pub provider: String,
    /// Model driving tool selection.
    pub agent_model: String,
    /// Model producing grounded answers.
    pub answer_model: String,
    /// Embedding model for chunk and description vectors.
    pub embed_model: String,
    /// Corpus directory, when one is configured.
    pub docs_dir: Option<String>,
    /// Data directory holding the cache database.
    pub data_dir: String,
    /// Path of the cache database file.
    pub cache_path: String,
    /// Blob count in the cache database, when it exists.
    pub cache_entries: Option<u64>,
    /// Total cached payload size in bytes, when the database exists.
    pub cache_bytes: Option<u64>,
    /// Prompt override directory, when one is configured.
    pub prompt_dir: Option<String>,
    /// Whether an API key is configured.
    pub api_key_present: bool,
}

/// Serializes a value as pretty-printed JSON.
pub fn render_json<T: Serialize>(value: &T) -> Result<String, CommandError> {
    serde_json::to_string_pretty(value).map_err(|e| CommandError::Serialize {
        message: e.to_string(),
    })
}

/// Renders a query outcome: the answer plus a stats footer in text form.
pub fn render_outcome(
    outcome: &QueryOutcome,
    format: OutputFormat,
    verbose: bool,
) -> Result<String, CommandError> {
    match format {
        OutputFormat::Json => render_json(outcome),
        OutputFormat::Text => {
            let mut output = outcome.answer.clone();
            output.push_str(&format!(
                "\n\n---\nMode: {} | Tools: {} | Retries: {} | Tokens: {} | Time: {:.1}s",
                outcome.mode.as_str(),
                outcome.invocations.len(),
                outcome.selection_retries,
                outcome.usage.total_tokens,
                seconds(outcome.elapsed_ms),
            ));
            for record in outcome.invocations.iter().filter(|r| !r.succeeded()) {
                let error = record.error.as_deref().unwrap_or("unknown error");
                output.push_str(&format!("\nwarning: {} failed: {error}", record.tool_name));
            }
            if verbose {
                if !outcome.candidates.is_empty() {
                    output.push_str(&format!(
                        "\nCandidates: {}",
                        outcome.candidates.join(", ")
                    ));
                }
                for record in &outcome.invocations {
                    output.push_str(&format!(
                        "\n  {} ({} ms): {}",
                        record.tool_name,
                        record.duration_ms,
                        record.argument
                    ));
                }
            }
            Ok(output)
        }
    }
}

/// Renders an ingestion report.
pub fn render_report(report: &IngestReport, format: OutputFormat) -> Result<String, CommandError> {
    match format {
        OutputFormat::Json => render_json(report),
        OutputFormat::Text => {
            let mut output = format!(
                "Ingested {}/{} document(s) in {:.1}s",
                report.indexed,
                report.documents,
                seconds(report.elapsed_ms),
            );
            output.push_str(&format!(
                "\nFrom cache: {} | Summary fallbacks: {}",
                report.cache_hits, report.summary_fallbacks
            ));
            for failure in &report.failures {
                output.push_str(&format!(
                    "\nwarning: {} dropped: {}",
                    failure.doc_key, failure.error
                ));
            }
            Ok(output)
        }
    }
}

/// Renders the registered tool listing.
pub fn render_tools(tools: &[ToolInfo], format: OutputFormat) -> Result<String, CommandError> {
    match format {
        OutputFormat::Json => render_json(&tools),
        OutputFormat::Text => {
            if tools.is_empty() {
                return Ok("No tools registered (run `ingest` first).".to_string());
            }
            let mut output = format!("{} tool(s) registered:", tools.len());
            for tool in tools {
                output.push_str(&format!("\n\n{}\n  {}", tool.name, tool.description));
            }
            Ok(output)
        }
    }
}

/// Renders the status report.
pub fn render_status(status: &StatusReport, format: OutputFormat) -> Result<String, CommandError> {
    match format {
        OutputFormat::Json => render_json(status),
        OutputFormat::Text => {
            let mut output = String::new();
            output.push_str(&format!("Provider:      {}\n", status.provider));
            output.push_str(&format!("Agent model:   {}\n", status.agent_model));
            output.push_str(&format!("Answer model:  {}\n", status.answer_model));
            output.push_str(&format!("Embed model:   {}\n", status.embed_model));
            output.push_str(&format!(
                "API key:       {}\n",
                if status.api_key_present {
                    "configured"
                } else {
                    "missing"
                }
            ));
            output.push_str(&format!(
                "Docs dir:      {}\n",
                status.docs_dir.as_deref().unwrap_or("(not set)")
            ));
            output.push_str(&format!("Data dir:      {}\n", status.data_dir));
            match (status.cache_entries, status.cache_bytes) {
                (Some(entries), Some(bytes)) => output.push_str(&format!(
                    "Cache:         {} ({entries} blobs, {bytes} bytes)\n",
                    status.cache_path
                )),
                _ => output.push_str(&format!("Cache:         {} (absent)\n", status.cache_path)),
            }
            output.push_str(&format!(
                "Prompt dir:    {}",
                status.prompt_dir.as_deref().unwrap_or("(defaults)")
            ));
            Ok(output)
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agent::{QueryMode, ToolInvocationRecord};
    use crate::llm::TokenUsage;
    use test_case::test_case;

    #[test_case("text", Some(OutputFormat::Text); "text")]
    #[test_case("JSON", Some(OutputFormat::Json); "json uppercase")]
    #[test_case("yaml", None; "unsupported")]
    fn test_parse_format(name: &str, expected: Option<OutputFormat>) {
        assert_eq!(OutputFormat::parse(name), expected);
    }

    fn sample_outcome() -> QueryOutcome {
        QueryOutcome {
            answer: "Plans start at $10.".to_string(),
            mode: QueryMode::Agent,
            candidates: vec!["tool_root_pricing".to_string(), "tool_root_faq".to_string()],
            invocations: vec![ToolInvocationRecord::success(
                "tool_root_pricing",
                "What is the price?",
                "Plans start at $10.",
                std::time::Duration::from_millis(120),
            )],
            selection_retries: 1,
            usage: TokenUsage {
                prompt_tokens: 900,
                completion_tokens: 100,
                total_tokens: 1000,
            },
            elapsed_ms: 2500,
        }
    }

    #[test]
    fn test_outcome_text_footer() {
        let text = render_outcome(&sample_outcome(), OutputFormat::Text, false).unwrap();
        assert!(text.starts_with("Plans start at $10.\n\n---\n"));
        assert!(text.contains("Mode: agent | Tools: 1 | Retries: 1 | Tokens: 1000 | Time: 2.5s"));
        assert!(!text.contains("Candidates:"));
    }

    #[test]
    fn test_outcome_text_verbose_lists_candidates() {
        let text = render_outcome(&sample_outcome(), OutputFormat::Text, true).unwrap();
        assert!(text.contains("Candidates: tool_root_pricing, tool_root_faq"));
        assert!(text.contains("tool_root_pricing (120 ms): What is the price?"));
    }

    #[test]
    fn test_outcome_text_surfaces_failures() {
        let mut outcome = sample_outcome();
        outcome.invocations.push(ToolInvocationRecord::failure(
            "tool_root_faq",
            "What is the refund window?",
            "request timed out",
            std::time::Duration::from_millis(30),
        ));
        let text = render_outcome(&outcome, OutputFormat::Text, false).unwrap();
        assert!(text.contains("warning: tool_root_faq failed: request timed out"));
    }

    #[test]
    fn test_outcome_json_round_trips_fields() {
        let json = render_outcome(&sample_outcome(), OutputFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["answer"], "Plans start at $10.");
        assert_eq!(value["mode"], "agent");
        assert_eq!(value["usage"]["total_tokens"], 1000);
        assert_eq!(value["invocations"][0]["tool_name"], "tool_root_pricing");
    }

    #[test]
    fn test_report_text_lists_failures() {
        let report = IngestReport {
            documents: 3,
            indexed: 2,
            cache_hits: 1,
            summary_fallbacks: 0,
            failures: vec![crate::ingest::IngestFailure {
                doc_key: "root_beta".to_string(),
                error: "embedding failed".to_string(),
            }],
            elapsed_ms: 800,
        };
        let text = render_report(&report, OutputFormat::Text).unwrap();
        assert!(text.starts_with("Ingested 2/3 document(s) in 0.8s"));
        assert!(text.contains("From cache: 1 | Summary fallbacks: 0"));
        assert!(text.contains("warning: root_beta dropped: embedding failed"));
    }

    #[test]
    fn test_tools_text_empty_registry() {
        let text = render_tools(&[], OutputFormat::Text).unwrap();
        assert!(text.contains("run `ingest` first"));
    }

    #[test]
    fn test_tools_text_lists_descriptions() {
        let tools = vec![ToolInfo {
            name: "tool_root_pricing".to_string(),
            description: "Covers widget pricing.".to_string(),
        }];
        let text = render_tools(&tools, OutputFormat::Text).unwrap();
        assert!(text.starts_with("1 tool(s) registered:"));
        assert!(text.contains("tool_root_pricing\n  Covers widget pricing."));
    }

    #[test]
    fn test_status_text_reports_missing_key() {
        let status = StatusReport {
            provider: "openai".to_string(),
            agent_model: "gpt-4o-mini".to_string(),
            answer_model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            docs_dir: None,
            data_dir: "/tmp/docent".to_string(),
            cache_path: "/tmp/docent/cache.db".to_string(),
            cache_entries: None,
            cache_bytes: None,
            prompt_dir: None,
            api_key_present: false,
        };
        let text = render_status(&status, OutputFormat::Text).unwrap();
        assert!(text.contains("API key:       missing"));
        assert!(text.contains("Docs dir:      (not set)"));
        assert!(text.contains("(absent)"));
    }
}
