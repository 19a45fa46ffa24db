//! Tool registry: an object index over tool descriptions.
//!
//! Every document agent is registered as a tool under its description;
//! the descriptions are embedded once at build time. Retrieval embeds
//! the query and returns the closest tools, which downstream filtering
//! narrows further.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::agent::QueryTool;
use crate::embed::Embedder;
use crate::error::AgentError;
use crate::index::VectorIndex;

/// Registered query tools plus the vector index over their descriptions.
pub struct ToolRegistry {
    tools: HashMap<String, QueryTool>,
    index: VectorIndex<String>,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Builds the registry, embedding every tool description in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] on a duplicate tool name and
    /// propagates embedding failures.
    pub async fn build(
        tools: Vec<QueryTool>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, AgentError> {
        let mut by_name = HashMap::with_capacity(tools.len());
        let mut names = Vec::with_capacity(tools.len());
        let mut descriptions = Vec::with_capacity(tools.len());

        for tool in tools {
            let name = tool.name().to_string();
            if by_name.contains_key(&name) {
                return Err(AgentError::Orchestration {
                    message: format!("duplicate tool name '{name}'"),
                });
            }
            names.push(name.clone());
            descriptions.push(tool.description().to_string());
            by_name.insert(name, tool);
        }

        let vectors = embedder.embed_batch(&descriptions).await?;
        let mut index = VectorIndex::new(embedder.dimensions());
        for (name, vector) in names.into_iter().zip(vectors) {
            index.push(name, vector);
        }

        debug!(tools = index.len(), "tool registry built");
        Ok(Self {
            tools: by_name,
            index,
            embedder,
        })
    }

    /// Returns up to `k` tools whose descriptions best match `query`,
    /// most similar first.
    ///
    /// # Errors
    ///
    /// Propagates query embedding failures.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<QueryTool>, AgentError> {
        if self.tools.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&vector, k);

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.tools.get(hit.meta) {
                Some(tool) => candidates.push(tool.clone()),
                None => warn!(tool = %hit.meta, "index entry without a registered tool"),
            }
        }

        debug!(candidates = candidates.len(), "tool retrieval");
        Ok(candidates)
    }

    /// Looks up a tool by its registered name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&QueryTool> {
        self.tools.get(name)
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry holds no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
