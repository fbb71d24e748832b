//! Document loading: fetch a PDF by URL, extract its text, and split it into
//! embedding-sized chunks.

use crate::chunking::{self, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_TOKENS};
use crate::config::get_config;
use crate::ports::{DocumentLoader, PortError, TextChunk};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Errors raised while fetching or extracting a document.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Transport failed before the document was received.
    #[error("document fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Source responded with an error status.
    #[error("document source returned {status} for {url}")]
    UnexpectedStatus {
        /// HTTP status returned by the document source.
        status: reqwest::StatusCode,
        /// URL that was requested.
        url: String,
    },
    /// PDF bytes could not be parsed into text.
    #[error("failed to extract text: {0}")]
    Extract(String),
    /// Document parsed but contained no text.
    #[error("document contains no extractable text")]
    EmptyText,
    /// Extracted text could not be chunked.
    #[error(transparent)]
    Chunking(#[from] chunking::ChunkingError),
}

impl From<LoaderError> for PortError {
    fn from(error: LoaderError) -> Self {
        match error {
            LoaderError::Extract(_) | LoaderError::EmptyText => {
                PortError::Extraction(error.to_string())
            }
            other => PortError::Transient(other.to_string()),
        }
    }
}

/// PDF loader backed by `reqwest` and `pdf-extract`.
pub struct PdfLoader {
    http: Client,
}

impl PdfLoader {
    /// Construct a loader with its own HTTP client.
    pub fn new() -> Self {
        let http = Client::builder()
            .user_agent("docgraph/loader")
            .build()
            .expect("Failed to construct reqwest::Client for document loading");
        Self { http }
    }

    async fn fetch_and_extract(&self, url: &str) -> Result<Vec<TextChunk>, LoaderError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LoaderError::UnexpectedStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await?;

        // pdf-extract is synchronous and CPU-bound; keep it off the reactor.
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|error| LoaderError::Extract(error.to_string()))
        })
        .await
        .map_err(|error| LoaderError::Extract(error.to_string()))??;

        if text.trim().is_empty() {
            return Err(LoaderError::EmptyText);
        }

        let config = get_config();
        let chunk_size = config
            .text_splitter_chunk_size
            .unwrap_or(DEFAULT_CHUNK_TOKENS);
        let overlap = config
            .text_splitter_chunk_overlap
            .unwrap_or(DEFAULT_CHUNK_OVERLAP);
        let chunks = chunking::chunk_text(&text, chunk_size, overlap, &config.embedding_model)?;
        tracing::debug!(url, chunks = chunks.len(), chunk_size, "Document chunked");
        Ok(chunks)
    }
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, url: &str) -> Result<Vec<TextChunk>, PortError> {
        Ok(self.fetch_and_extract(url).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::ensure_test_config;
    use httpmock::{Method::GET, MockServer};

    #[tokio::test]
    async fn error_status_is_transient() {
        ensure_test_config();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.pdf");
                then.status(404);
            })
            .await;

        let loader = PdfLoader::new();
        let error = loader
            .load(&format!("{}/doc.pdf", server.base_url()))
            .await
            .expect_err("status error");
        assert!(matches!(error, PortError::Transient(_)));
    }

    #[tokio::test]
    async fn unparseable_bytes_are_an_extraction_error() {
        ensure_test_config();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.pdf");
                then.status(200).body("this is not a pdf");
            })
            .await;

        let loader = PdfLoader::new();
        let error = loader
            .load(&format!("{}/doc.pdf", server.base_url()))
            .await
            .expect_err("extraction error");
        assert!(matches!(error, PortError::Extraction(_)));
    }
}
