//! Error types for the docent pipeline.
//!
//! Each subsystem gets its own error enum so callers can match on the
//! failure domain; [`DocentError`] unifies them at the crate boundary.
//! Ingestion-time errors (`IndexError`, `SummaryError`) are isolated per
//! document and never abort a whole corpus build; query-time errors
//! (`AgentError`) abort only the current query cycle.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DocentError>;

/// Errors from the blob cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be opened or initialized.
    #[error("failed to open cache at '{path}': {message}")]
    Open {
        /// Path to the cache database.
        path: String,
        /// Underlying failure description.
        message: String,
    },

    /// A read for a key failed (distinct from the key being absent).
    #[error("cache read failed for key '{key}': {message}")]
    Read {
        /// The cache key being read.
        key: String,
        /// Underlying failure description.
        message: String,
    },

    /// A write for a key failed.
    #[error("cache write failed for key '{key}': {message}")]
    Write {
        /// The cache key being written.
        key: String,
        /// Underlying failure description.
        message: String,
    },
}

/// Errors from the document source loader.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The given corpus path is not a readable directory.
    #[error("'{path}' is not a readable directory")]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// Reading a document file failed.
    #[error("failed to read '{path}': {message}")]
    Io {
        /// Path of the file that failed.
        path: String,
        /// Underlying failure description.
        message: String,
    },

    /// Two files resolved to the same document key.
    #[error("duplicate document key '{key}' (keys must be unique across the corpus)")]
    DuplicateKey {
        /// The colliding key.
        key: String,
    },

    /// The directory walk found no loadable documents.
    #[error("no documents found under '{path}'")]
    Empty {
        /// The corpus directory.
        path: String,
    },
}

/// Errors while building a document's indices (ingestion time).
///
/// Fatal for that document only; corpus ingestion continues for the rest.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding capability failed; no partial index is kept.
    #[error("embedding failed for document '{key}': {message}")]
    Embedding {
        /// Document being indexed.
        key: String,
        /// Underlying failure description.
        message: String,
    },

    /// The document text split into zero chunks.
    #[error("document '{key}' produced no chunks")]
    EmptyDocument {
        /// Document being indexed.
        key: String,
    },

    /// The persistence layer failed while loading or storing the index.
    #[error("cache access failed for document '{key}': {message}")]
    Cache {
        /// Document being indexed.
        key: String,
        /// Underlying failure description.
        message: String,
    },
}

/// Errors while deriving a document's summary (ingestion time).
///
/// Callers downgrade this to a placeholder tool description rather than
/// dropping the document.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// The completion capability failed during tree summarization.
    #[error("summarization failed for document '{key}': {message}")]
    Completion {
        /// Document being summarized.
        key: String,
        /// Underlying failure description.
        message: String,
    },

    /// The persistence layer failed while loading or storing the summary.
    #[error("summary cache access failed for document '{key}': {message}")]
    Cache {
        /// Document being summarized.
        key: String,
        /// Underlying failure description.
        message: String,
    },
}

/// Errors from the agent system: providers, retrieval, and the query cycle.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key found in configuration or environment.
    #[error("no API key configured (set OPENAI_API_KEY or DOCENT_API_KEY)")]
    ApiKeyMissing,

    /// The provider API returned an error.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error description.
        message: String,
        /// HTTP status code when known.
        status: Option<u16>,
    },

    /// An external call exceeded the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout {
        /// The enforced timeout in seconds.
        secs: u64,
    },

    /// A streaming response failed mid-stream.
    #[error("stream error: {message}")]
    Stream {
        /// Underlying failure description.
        message: String,
    },

    /// The model's response could not be parsed as expected.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// The raw content that failed to parse.
        content: String,
    },

    /// The provider name is not recognized.
    #[error("unsupported provider '{name}'")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// The query text was empty or whitespace.
    #[error("query text is empty")]
    EmptyQuery,

    /// Tool retrieval over the registry failed at query time.
    #[error("tool retrieval failed: {message}")]
    Retrieval {
        /// Underlying failure description.
        message: String,
    },

    /// The rerank capability failed at query time.
    #[error("rerank failed: {message}")]
    Rerank {
        /// Underlying failure description.
        message: String,
    },

    /// The model selected a tool outside the candidate set twice.
    #[error("model selected tool '{name}' outside the candidate set")]
    Selection {
        /// The out-of-set tool name.
        name: String,
    },

    /// A selected tool failed while being invoked.
    #[error("tool '{name}' failed: {message}")]
    ToolInvocation {
        /// Name of the failed tool.
        name: String,
        /// Underlying failure description.
        message: String,
    },

    /// Every selected tool failed; nothing is left to synthesize from.
    #[error("all {attempted} invoked tools failed")]
    AllToolsFailed {
        /// Number of tools that were invoked.
        attempted: usize,
    },

    /// An agent finished without consulting any of its tools.
    #[error("agent '{agent}' answered without invoking any tool")]
    NoToolInvoked {
        /// Name of the offending agent.
        agent: String,
    },

    /// Query decomposition produced no usable sub-questions.
    #[error("query decomposition failed: {message}")]
    Decomposition {
        /// Underlying failure description.
        message: String,
    },

    /// The tool-calling loop hit its iteration cap.
    #[error("tool loop exceeded {max_iterations} iterations")]
    ToolLoopExceeded {
        /// The configured iteration cap.
        max_iterations: usize,
    },

    /// A failure in orchestration itself rather than any capability.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// What went wrong.
        message: String,
    },
}

/// Errors surfaced by CLI command implementations.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A flag or argument combination was invalid.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the input.
        message: String,
    },

    /// No docs directory was supplied.
    #[error("docs directory is required (pass --docs-dir or set DOCENT_DOCS_DIR)")]
    DocsDirMissing,

    /// The async runtime could not be created.
    #[error("runtime initialization failed: {message}")]
    Runtime {
        /// Underlying failure description.
        message: String,
    },

    /// Serializing a result for output failed.
    #[error("output serialization failed: {message}")]
    Serialize {
        /// Underlying failure description.
        message: String,
    },
}

/// Top-level error type unifying all subsystems.
#[derive(Debug, Error)]
pub enum DocentError {
    /// Index build failure.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Summarization failure.
    #[error(transparent)]
    Summary(#[from] SummaryError),

    /// Cache layer failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Document source failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Agent system failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Plain I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocentError {
    /// Short stable kind label for user-facing error reporting.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Index(_) => "index",
            Self::Summary(_) => "summary",
            Self::Cache(_) => "cache",
            Self::Source(_) => "source",
            Self::Agent(_) => "agent",
            Self::Command(_) => "command",
            Self::Io(_) => "io",
        }
    }
}
