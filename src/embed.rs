//! Embedding capability: turning text into vectors.
//!
//! The pipeline only ever talks to the [`Embedder`] trait; the shipped
//! implementation calls the `OpenAI` embeddings endpoint through the same
//! SDK as the chat provider, with the same timeout and retry discipline.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequest, EmbeddingInput};
use async_trait::async_trait;
use tracing::debug;

use crate::config::DocentConfig;
use crate::error::AgentError;
use crate::llm::openai::{api_error, is_transient, retry_backoff};

/// Inputs per embeddings request; larger corpora are split across calls.
const EMBED_BATCH_LIMIT: usize = 256;

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedder name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Output vector dimensionality.
    fn dimensions(&self) -> usize;

    /// Embeds a single text.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures or timeouts.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError>;

    /// Embeds a batch of texts, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures or timeouts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError>;
}

/// `OpenAI` embeddings-backed [`Embedder`].
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    override_dimensions: Option<u32>,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Creates an embedder from pipeline configuration.
    #[must_use]
    pub fn new(config: &DocentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.embed_model.clone(),
            override_dimensions: config.embed_dimensions,
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AgentError> {
        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::StringArray(texts),
            dimensions: self.override_dimensions,
            ..Default::default()
        };

        let timeout_secs = self.timeout.as_secs();
        let mut last_error = AgentError::Timeout { secs: timeout_secs };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
                debug!(attempt, "retrying embeddings request");
            }

            let embeddings = self.client.embeddings();
            let call = embeddings.create(request.clone());
            match tokio::time::timeout(self.timeout, call).await {
                Err(_) => {
                    last_error = AgentError::Timeout { secs: timeout_secs };
                }
                Ok(Err(e)) if is_transient(&e) => {
                    last_error = api_error(&e);
                }
                Ok(Err(e)) => return Err(api_error(&e)),
                Ok(Ok(response)) => {
                    let mut data = response.data;
                    // Ordinal alignment with the input is a hard requirement
                    // downstream, so order by the returned index explicitly.
                    data.sort_by_key(|d| d.index);
                    return Ok(data.into_iter().map(|d| d.embedding).collect());
                }
            }
        }

        Err(last_error)
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("client", &"<async-openai::Client>")
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        if let Some(d) = self.override_dimensions {
            return d as usize;
        }
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let mut vectors = self.request(vec![text.to_string()]).await?;
        vectors.pop().ok_or_else(|| AgentError::ApiRequest {
            message: "embeddings response was empty".to_string(),
            status: None,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_LIMIT) {
            let batch_vectors = self.request(batch.to_vec()).await?;
            if batch_vectors.len() != batch.len() {
                return Err(AgentError::ApiRequest {
                    message: format!(
                        "embeddings response had {} vectors for {} inputs",
                        batch_vectors.len(),
                        batch.len()
                    ),
                    status: None,
                });
            }
            vectors.extend(batch_vectors);
        }

        debug!(count = vectors.len(), model = %self.model, "embedded batch");
        Ok(vectors)
    }
}
