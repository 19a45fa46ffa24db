//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default maximum concurrent API calls during indexing and ingest.
const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Default top agent max tokens. High enough for a synthesized answer
/// that quotes evidence from several tool results.
const DEFAULT_AGENT_MAX_TOKENS: u32 = 4096;
/// Default sub-answer max tokens (document agents, decomposition).
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 2048;
/// Default summary max tokens. Summaries are one to two lines.
const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 256;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default max retries.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default maximum tool-calling loop iterations.
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
/// Default candidate count fetched from the object index before reranking.
const DEFAULT_RETRIEVE_TOP_K: usize = 10;
/// Default tool count surviving the rerank filter.
const DEFAULT_RERANK_TOP_N: usize = 5;
/// Default chunk count retrieved by the flat base engine.
const DEFAULT_BASE_TOP_K: usize = 4;
/// Default chunk count retrieved per fact lookup inside a document agent.
const DEFAULT_FACT_TOP_K: usize = 2;
/// Default embedding model.
const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct DocentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for the top-level agent (tool selection and synthesis).
    pub agent_model: String,
    /// Model for sub-answers: document agents, summaries, decomposition.
    pub answer_model: String,
    /// Model for relevance scoring in the rerank filter.
    pub rerank_model: String,
    /// Embedding model for chunk, summary, and tool-description vectors.
    pub embed_model: String,
    /// Optional reduced embedding dimensionality.
    ///
    /// When set, requested from the API per call; the model's native
    /// width is used otherwise.
    pub embed_dimensions: Option<u32>,
    /// Maximum concurrent API requests during indexing and ingest.
    pub max_concurrency: usize,
    /// Maximum tokens for top agent responses.
    pub agent_max_tokens: u32,
    /// Maximum tokens for sub-answer responses.
    pub answer_max_tokens: u32,
    /// Maximum tokens for document summaries.
    pub summary_max_tokens: u32,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts per request.
    pub max_retries: u32,
    /// Maximum tool-calling loop iterations before aborting.
    pub max_tool_iterations: usize,
    /// Candidate tools fetched from the object index per query.
    ///
    /// The rerank filter narrows this set down to [`rerank_top_n`]
    /// survivors, so raising it widens recall without widening the
    /// set the agent ultimately sees.
    ///
    /// [`rerank_top_n`]: DocentConfig::rerank_top_n
    pub retrieve_top_k: usize,
    /// Tools surviving the rerank filter and exposed to the top agent.
    pub rerank_top_n: usize,
    /// Chunks retrieved per query by the flat base engine.
    pub base_top_k: usize,
    /// Chunks retrieved per fact lookup inside a document agent.
    pub fact_top_k: usize,
    /// Target chunk size in characters for the sentence splitter.
    pub chunk_target_size: usize,
    /// Directory holding the persistent index and summary cache.
    pub data_dir: PathBuf,
    /// Directory containing prompt template files.
    ///
    /// When set, agents load system prompts from markdown files in this
    /// directory, falling back to compiled-in defaults for any missing
    /// files.
    pub prompt_dir: Option<PathBuf>,
    /// Minimum delay between API requests per task.
    ///
    /// Applied after acquiring the concurrency semaphore permit.
    /// Set to `Duration::ZERO` (default) to disable rate limiting
    /// beyond what the concurrency semaphore provides.
    pub request_delay: Duration,
}

impl DocentConfig {
    /// Creates a new builder for `DocentConfig`.
    #[must_use]
    pub fn builder() -> DocentConfigBuilder {
        DocentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Default on-disk location for the index cache.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().map_or_else(|| PathBuf::from(".docent"), |d| d.join("docent"))
}

/// Builder for [`DocentConfig`].
#[derive(Debug, Clone, Default)]
pub struct DocentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    agent_model: Option<String>,
    answer_model: Option<String>,
    rerank_model: Option<String>,
    embed_model: Option<String>,
    embed_dimensions: Option<u32>,
    max_concurrency: Option<usize>,
    agent_max_tokens: Option<u32>,
    answer_max_tokens: Option<u32>,
    summary_max_tokens: Option<u32>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    max_tool_iterations: Option<usize>,
    retrieve_top_k: Option<usize>,
    rerank_top_n: Option<usize>,
    base_top_k: Option<usize>,
    fact_top_k: Option<usize>,
    chunk_target_size: Option<usize>,
    data_dir: Option<PathBuf>,
    prompt_dir: Option<PathBuf>,
    request_delay: Option<Duration>,
}

impl DocentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("DOCENT_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("DOCENT_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("DOCENT_BASE_URL"))
                .ok();
        }
        if self.agent_model.is_none() {
            self.agent_model = std::env::var("DOCENT_AGENT_MODEL").ok();
        }
        if self.answer_model.is_none() {
            self.answer_model = std::env::var("DOCENT_ANSWER_MODEL").ok();
        }
        if self.rerank_model.is_none() {
            self.rerank_model = std::env::var("DOCENT_RERANK_MODEL").ok();
        }
        if self.embed_model.is_none() {
            self.embed_model = std::env::var("DOCENT_EMBED_MODEL").ok();
        }
        if self.embed_dimensions.is_none() {
            self.embed_dimensions = std::env::var("DOCENT_EMBED_DIMENSIONS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = std::env::var("DOCENT_MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.retrieve_top_k.is_none() {
            self.retrieve_top_k = std::env::var("DOCENT_RETRIEVE_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.rerank_top_n.is_none() {
            self.rerank_top_n = std::env::var("DOCENT_RERANK_TOP_N")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.data_dir.is_none() {
            self.data_dir = std::env::var("DOCENT_DATA_DIR").ok().map(PathBuf::from);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("DOCENT_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the top agent model.
    #[must_use]
    pub fn agent_model(mut self, model: impl Into<String>) -> Self {
        self.agent_model = Some(model.into());
        self
    }

    /// Sets the sub-answer model.
    #[must_use]
    pub fn answer_model(mut self, model: impl Into<String>) -> Self {
        self.answer_model = Some(model.into());
        self
    }

    /// Sets the rerank scoring model.
    #[must_use]
    pub fn rerank_model(mut self, model: impl Into<String>) -> Self {
        self.rerank_model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = Some(model.into());
        self
    }

    /// Sets a reduced embedding dimensionality.
    #[must_use]
    pub const fn embed_dimensions(mut self, dims: u32) -> Self {
        self.embed_dimensions = Some(dims);
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the top agent max tokens.
    #[must_use]
    pub const fn agent_max_tokens(mut self, n: u32) -> Self {
        self.agent_max_tokens = Some(n);
        self
    }

    /// Sets the sub-answer max tokens.
    #[must_use]
    pub const fn answer_max_tokens(mut self, n: u32) -> Self {
        self.answer_max_tokens = Some(n);
        self
    }

    /// Sets the summary max tokens.
    #[must_use]
    pub const fn summary_max_tokens(mut self, n: u32) -> Self {
        self.summary_max_tokens = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the maximum tool-calling loop iterations.
    #[must_use]
    pub const fn max_tool_iterations(mut self, n: usize) -> Self {
        self.max_tool_iterations = Some(n);
        self
    }

    /// Sets the candidate count fetched from the object index.
    #[must_use]
    pub const fn retrieve_top_k(mut self, n: usize) -> Self {
        self.retrieve_top_k = Some(n);
        self
    }

    /// Sets the tool count surviving the rerank filter.
    #[must_use]
    pub const fn rerank_top_n(mut self, n: usize) -> Self {
        self.rerank_top_n = Some(n);
        self
    }

    /// Sets the base engine chunk count.
    #[must_use]
    pub const fn base_top_k(mut self, n: usize) -> Self {
        self.base_top_k = Some(n);
        self
    }

    /// Sets the fact-lookup chunk count.
    #[must_use]
    pub const fn fact_top_k(mut self, n: usize) -> Self {
        self.fact_top_k = Some(n);
        self
    }

    /// Sets the target chunk size in characters.
    #[must_use]
    pub const fn chunk_target_size(mut self, n: usize) -> Self {
        self.chunk_target_size = Some(n);
        self
    }

    /// Sets the data directory for the persistent cache.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the minimum delay between API requests per task.
    #[must_use]
    pub const fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Builds the [`DocentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<DocentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        Ok(DocentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            agent_model: self
                .agent_model
                .unwrap_or_else(|| "gpt-5.2-2025-12-11".to_string()),
            answer_model: self
                .answer_model
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            rerank_model: self
                .rerank_model
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            embed_model: self
                .embed_model
                .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            embed_dimensions: self.embed_dimensions,
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            agent_max_tokens: self.agent_max_tokens.unwrap_or(DEFAULT_AGENT_MAX_TOKENS),
            answer_max_tokens: self.answer_max_tokens.unwrap_or(DEFAULT_ANSWER_MAX_TOKENS),
            summary_max_tokens: self
                .summary_max_tokens
                .unwrap_or(DEFAULT_SUMMARY_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            max_tool_iterations: self
                .max_tool_iterations
                .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS),
            retrieve_top_k: self.retrieve_top_k.unwrap_or(DEFAULT_RETRIEVE_TOP_K),
            rerank_top_n: self.rerank_top_n.unwrap_or(DEFAULT_RERANK_TOP_N),
            base_top_k: self.base_top_k.unwrap_or(DEFAULT_BASE_TOP_K),
            fact_top_k: self.fact_top_k.unwrap_or(DEFAULT_FACT_TOP_K),
            chunk_target_size: self
                .chunk_target_size
                .unwrap_or(crate::core::DEFAULT_CHUNK_TARGET),
            data_dir: self.data_dir.unwrap_or_else(default_data_dir),
            prompt_dir: self.prompt_dir,
            request_delay: self.request_delay.unwrap_or(Duration::ZERO),
        })
    }
}
