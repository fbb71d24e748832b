//! Capability ports consumed by the orchestration graph.
//!
//! The pipeline never talks to a backend directly; it depends on the five
//! contracts defined here. Concrete adapters live in their own modules
//! ([`crate::loader`], [`crate::vectordb`], [`crate::llm`], [`crate::cache`],
//! [`crate::websearch`]) and convert their module-local errors into the shared
//! [`PortError`] taxonomy at this boundary.

use async_trait::async_trait;
use thiserror::Error;

/// A contiguous segment of extracted document text, sized for embedding and
/// model context limits.
pub type TextChunk = String;

/// Failure taxonomy shared by every port call.
#[derive(Debug, Error)]
pub enum PortError {
    /// Document was fetched but contained no extractable text.
    #[error("no extractable text: {0}")]
    Extraction(String),
    /// Network, store, or model backend failed; safe to retry.
    #[error("{0}")]
    Transient(String),
    /// Caller supplied inputs inconsistent with the requested operation.
    #[error("{0}")]
    Validation(String),
}

/// Loads a source document and splits it into ordered text chunks.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Fetch the document at `url` and return its text as ordered chunks.
    ///
    /// Fails with [`PortError::Extraction`] when the document yields no text.
    async fn load(&self, url: &str) -> Result<Vec<TextChunk>, PortError>;
}

/// Vector collection keyed by document identifier.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store `chunks` under the collection for `doc_id`.
    async fn upsert(&self, chunks: &[TextChunk], doc_id: &str) -> Result<(), PortError>;

    /// Return the top-`k` chunks for `query` ranked by embedding distance.
    async fn similarity_search(
        &self,
        doc_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<TextChunk>, PortError>;

    /// Whether at least one chunk is stored for `doc_id`.
    async fn has_chunks(&self, doc_id: &str) -> Result<bool, PortError>;

    /// All stored chunks for `doc_id` in stable chunk-index order.
    async fn get_all(&self, doc_id: &str) -> Result<Vec<TextChunk>, PortError>;
}

/// Free-text language model execution.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a fully-formatted prompt and return the completion text.
    async fn execute(&self, prompt: &str) -> Result<String, PortError>;

    /// Produce a condensed synthesis of all `chunks`, reducing hierarchically
    /// when the input exceeds a single context window.
    async fn summarize(&self, chunks: &[TextChunk]) -> Result<String, PortError>;
}

/// Cache for whole-document summaries. Expiry policy is owned by the
/// implementation and invisible to the pipeline.
#[async_trait]
pub trait SummaryCache: Send + Sync {
    /// Whether a summary is cached under `key`.
    async fn exists(&self, key: &str) -> Result<bool, PortError>;

    /// Fetch the cached summary for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, PortError>;

    /// Store `summary` under `key`.
    async fn set(&self, key: &str, summary: &str) -> Result<(), PortError>;
}

/// External web search returning top-`k` text snippets.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web for `query` and return up to `k` snippet chunks.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<TextChunk>, PortError>;
}
