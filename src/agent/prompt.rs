//! System prompts and template builders for agents.
//!
//! Prompts are the core instructions that define each agent's behavior.
//! Template builders format user messages with query context, candidate
//! tools, and sub-answers.

use std::fmt::Write;
use std::path::Path;

use super::outcome::SubAnswer;

/// System prompt for each per-document agent.
///
/// `{document}` is replaced with the document key at build time. The
/// reasoning loop also enforces the tool-use requirement mechanically.
pub const DOC_AGENT_SYSTEM_PROMPT: &str = "\
You are a specialized agent designed to answer queries about the `{document}` part of the documentation.
You must ALWAYS use at least one of the tools provided when answering a question; do NOT rely on prior knowledge.";

/// System prompt for the top-level agent.
pub const TOP_AGENT_SYSTEM_PROMPT: &str = "\
You are an agent designed to answer queries about the documentation.
Please always use the tools provided to answer a question. Do not rely on prior knowledge.";

/// Description of the per-query comparison tool.
///
/// Fixed steering text; the top-level agent is expected to prefer this
/// tool for multi-document queries and pass the original query through.
pub const COMPARE_TOOL_DESCRIPTION: &str = "\
Useful for any queries that involve comparing multiple documents. ALWAYS use this tool for comparison queries - make sure to call this tool with the original query. Do NOT use the other tools for any queries involving multiple documents.";

/// Grounded question-answering template for fact lookups.
///
/// `{context}` receives the retrieved chunks, `{query}` the question.
pub const QA_PROMPT: &str = "\
Context information is below.
---------------------
{context}
---------------------
Given the context information and not prior knowledge, answer the query.
Query: {query}
Answer: ";

/// Summarize-and-combine template used at every tree level.
///
/// `{context}` receives chunk text at the leaves and partial answers at
/// combine levels; `{query}` the question.
pub const SUMMARIZE_PROMPT: &str = "\
Context information from multiple sources is below.
---------------------
{context}
---------------------
Given the information from multiple sources and not prior knowledge, answer the query.
Query: {query}
Answer: ";

/// System prompt for the sub-question decomposition step.
pub const DECOMPOSE_SYSTEM_PROMPT: &str = r#"You are a query decomposition expert. You break a comparison query into focused sub-questions, each answerable by exactly one of the available document tools.

## Instructions

1. Read the user query and the list of available tools with their descriptions.
2. Generate one sub-question per relevant tool. A comparison query should produce at least two sub-questions over distinct tools.
3. Phrase each sub-question so it can be answered from that tool's document alone.
4. Only name tools from the available list. Never invent tool names.

## Output Format (JSON)

Return a JSON array of sub-questions:
```json
[
  {"tool_name": "tool_root_pricing", "sub_question": "What plans are offered and at what price?"},
  {"tool_name": "tool_root_faq", "sub_question": "What refund policy does the FAQ state?"}
]
```

## Rules

- Use each tool at most once.
- Keep sub-questions focused and self-contained.
- Return ONLY the JSON array, no surrounding text."#;

/// System prompt for synthesizing sub-answers into one response.
pub const SYNTHESIZE_SYSTEM_PROMPT: &str = r"You are a synthesis expert. You combine answers to sub-questions into one response that directly addresses the user's original query.

## Instructions

1. Review each sub-question and its answer.
2. Reconcile the sub-answers: compare, contrast, and connect them rather than concatenating.
3. Note disagreements between sources explicitly.
4. Answer the original query directly.

## Rules

- Use only the provided sub-answers. Do not introduce outside knowledge.
- If a sub-answer is missing or empty, work with what remains and state what could not be determined.";

/// System prompt for relevance scoring during the rerank step.
pub const RERANK_SYSTEM_PROMPT: &str = r#"You are a relevance scoring expert. You score how well each candidate tool matches a user query.

## Instructions

1. Read the query and the numbered candidate list (name plus description).
2. Score every candidate from 0.0 (irrelevant) to 1.0 (directly relevant).
3. Judge by the description's content, not by name similarity.

## Output Format (JSON)

Return a JSON array with one entry per candidate:
```json
[
  {"index": 0, "score": 0.92},
  {"index": 1, "score": 0.15}
]
```

## Rules

- Score every candidate exactly once, using its given index.
- Return ONLY the JSON array, no surrounding text."#;

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/docent-rs/prompts";

/// Filenames for each prompt template.
const DOC_AGENT_FILENAME: &str = "doc_agent.md";
/// Filename for the top agent prompt template.
const TOP_AGENT_FILENAME: &str = "top_agent.md";
/// Filename for the fact-lookup QA template.
const QA_FILENAME: &str = "qa.md";
/// Filename for the tree-summarize template.
const SUMMARIZE_FILENAME: &str = "summarize.md";
/// Filename for the decomposition prompt template.
const DECOMPOSE_FILENAME: &str = "decompose.md";
/// Filename for the synthesis prompt template.
const SYNTHESIZE_FILENAME: &str = "synthesize.md";
/// Filename for the rerank scoring prompt template.
const RERANK_FILENAME: &str = "rerank.md";

/// A set of prompts for every agent and template in the pipeline.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// System prompt template for per-document agents (`{document}`).
    pub doc_agent: String,
    /// System prompt for the top-level agent.
    pub top_agent: String,
    /// Grounded QA template (`{context}`, `{query}`).
    pub qa: String,
    /// Tree-summarize template (`{context}`, `{query}`).
    pub summarize: String,
    /// System prompt for sub-question decomposition.
    pub decompose: String,
    /// System prompt for sub-answer synthesis.
    pub synthesize: String,
    /// System prompt for rerank scoring.
    pub rerank: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` CLI flag)
    /// 2. `DOCENT_PROMPT_DIR` environment variable
    /// 3. `~/.config/docent-rs/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(std::path::PathBuf::from)
            .or_else(|| {
                std::env::var("DOCENT_PROMPT_DIR")
                    .ok()
                    .map(std::path::PathBuf::from)
            })
            .or_else(|| dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR)));

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            doc_agent: load_file(DOC_AGENT_FILENAME, DOC_AGENT_SYSTEM_PROMPT),
            top_agent: load_file(TOP_AGENT_FILENAME, TOP_AGENT_SYSTEM_PROMPT),
            qa: load_file(QA_FILENAME, QA_PROMPT),
            summarize: load_file(SUMMARIZE_FILENAME, SUMMARIZE_PROMPT),
            decompose: load_file(DECOMPOSE_FILENAME, DECOMPOSE_SYSTEM_PROMPT),
            synthesize: load_file(SYNTHESIZE_FILENAME, SYNTHESIZE_SYSTEM_PROMPT),
            rerank: load_file(RERANK_FILENAME, RERANK_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            doc_agent: DOC_AGENT_SYSTEM_PROMPT.to_string(),
            top_agent: TOP_AGENT_SYSTEM_PROMPT.to_string(),
            qa: QA_PROMPT.to_string(),
            summarize: SUMMARIZE_PROMPT.to_string(),
            decompose: DECOMPOSE_SYSTEM_PROMPT.to_string(),
            synthesize: SYNTHESIZE_SYSTEM_PROMPT.to_string(),
            rerank: RERANK_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten, so local edits survive repeated runs.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (DOC_AGENT_FILENAME, DOC_AGENT_SYSTEM_PROMPT),
            (TOP_AGENT_FILENAME, TOP_AGENT_SYSTEM_PROMPT),
            (QA_FILENAME, QA_PROMPT),
            (SUMMARIZE_FILENAME, SUMMARIZE_PROMPT),
            (DECOMPOSE_FILENAME, DECOMPOSE_SYSTEM_PROMPT),
            (SYNTHESIZE_FILENAME, SYNTHESIZE_SYSTEM_PROMPT),
            (RERANK_FILENAME, RERANK_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<std::path::PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Renders a template carrying a `{document}` placeholder.
#[must_use]
pub fn render_document(template: &str, doc_key: &str) -> String {
    template.replace("{document}", doc_key)
}

/// Renders a grounded template carrying `{context}` and `{query}`.
#[must_use]
pub fn render_grounded(template: &str, context: &str, query: &str) -> String {
    template.replace("{context}", context).replace("{query}", query)
}

/// A candidate tool's name and description, as listed to the model.
#[derive(Debug, Clone, Copy)]
pub struct ToolBrief<'a> {
    /// Registered tool name.
    pub name: &'a str,
    /// Tool description (the document summary, for document tools).
    pub description: &'a str,
}

/// Builds the user message for the decomposition step.
#[must_use]
pub fn build_decompose_prompt(query: &str, tools: &[ToolBrief<'_>]) -> String {
    let mut prompt = format!("<query>{query}</query>\n\n<tools>\n");
    for tool in tools {
        let _ = writeln!(prompt, "- {}: {}", tool.name, tool.description);
    }
    prompt.push_str("</tools>\n\nGenerate the sub-questions.");
    prompt
}

/// Builds the user message for the sub-answer synthesis step.
#[must_use]
pub fn build_synthesize_prompt(query: &str, sub_answers: &[SubAnswer]) -> String {
    let mut prompt = format!("<query>{query}</query>\n\n<sub_answers>\n");
    for sub in sub_answers {
        let _ = write!(
            prompt,
            "<sub_answer tool=\"{tool}\">\n\
             <sub_question>{question}</sub_question>\n\
             <answer>{answer}</answer>\n\
             </sub_answer>\n\n",
            tool = sub.tool_name,
            question = sub.sub_question,
            answer = sub.answer,
        );
    }
    prompt.push_str("</sub_answers>\n\nSynthesize the final answer to the original query.");
    prompt
}

/// Builds the user message for the rerank scoring step.
#[must_use]
pub fn build_rerank_prompt(query: &str, candidates: &[ToolBrief<'_>]) -> String {
    let mut prompt = format!("<query>{query}</query>\n\n<candidates>\n");
    for (index, tool) in candidates.iter().enumerate() {
        let _ = writeln!(prompt, "{index}. {}: {}", tool.name, tool.description);
    }
    prompt.push_str("</candidates>\n\nScore every candidate.");
    prompt
}
