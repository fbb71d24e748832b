//! Web search adapter backed by the Tavily REST API.

use crate::chunking;
use crate::config::get_config;
use crate::ports::{PortError, TextChunk, WebSearch};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";

/// Token budget for re-chunked web snippets.
const WEB_CHUNK_TOKENS: usize = 256;
/// Overlap for re-chunked web snippets.
const WEB_CHUNK_OVERLAP: usize = 25;

/// Errors raised by the web search adapter.
#[derive(Debug, Error)]
pub enum WebSearchError {
    /// Transport failed before a response was received.
    #[error("web search request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Search provider returned an error response.
    #[error("web search provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Snippets could not be re-chunked.
    #[error(transparent)]
    Chunking(#[from] chunking::ChunkingError),
}

impl From<WebSearchError> for PortError {
    fn from(error: WebSearchError) -> Self {
        PortError::Transient(error.to_string())
    }
}

/// Tavily-backed implementation of the web search port.
pub struct TavilyClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl TavilyClient {
    /// Construct a client using configuration derived from the environment.
    pub fn new() -> Self {
        let config = get_config();
        Self::with_base_url(
            DEFAULT_TAVILY_URL.to_string(),
            config.tavily_api_key.clone().unwrap_or_default(),
        )
    }

    /// Construct a client against an explicit base URL.
    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        let http = Client::builder()
            .user_agent("docgraph/websearch")
            .build()
            .expect("Failed to construct reqwest::Client for web search");
        Self {
            http,
            base_url,
            api_key,
        }
    }

    async fn search_snippets(&self, query: &str, k: usize) -> Result<Vec<TextChunk>, WebSearchError> {
        let endpoint = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(endpoint)
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": k,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WebSearchError::UnexpectedStatus { status, body });
        }

        let body: TavilyResponse = response.json().await?;
        let combined = body
            .results
            .into_iter()
            .filter_map(|result| result.content)
            .collect::<Vec<_>>()
            .join("\n\n");
        if combined.trim().is_empty() {
            return Ok(Vec::new());
        }

        let model = &get_config().embedding_model;
        let chunks = chunking::chunk_text(&combined, WEB_CHUNK_TOKENS, WEB_CHUNK_OVERLAP, model)?;
        tracing::debug!(query, snippets = chunks.len(), "Web search results chunked");
        Ok(chunks)
    }
}

impl Default for TavilyClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<TextChunk>, PortError> {
        Ok(self.search_snippets(query, k).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::ensure_test_config;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn search_collects_and_chunks_snippets() {
        ensure_test_config();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/search");
                then.status(200).json_body(json!({
                    "results": [
                        { "content": "First snippet about the topic." },
                        { "content": "Second snippet with more detail." },
                        { "url": "https://example.org/no-content" }
                    ]
                }));
            })
            .await;

        let client = TavilyClient::with_base_url(server.base_url(), "tvly-test".into());
        let chunks = client.search("recent results", 5).await.expect("search");
        mock.assert();
        assert!(!chunks.is_empty());
        assert!(chunks.concat().contains("First snippet"));
    }

    #[tokio::test]
    async fn empty_results_yield_no_chunks() {
        ensure_test_config();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/search");
                then.status(200).json_body(json!({ "results": [] }));
            })
            .await;

        let client = TavilyClient::with_base_url(server.base_url(), "tvly-test".into());
        let chunks = client.search("anything", 5).await.expect("search");
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_transient() {
        ensure_test_config();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/search");
                then.status(401).body("invalid api key");
            })
            .await;

        let client = TavilyClient::with_base_url(server.base_url(), "bad-key".into());
        let error = client.search("anything", 5).await.expect_err("auth error");
        assert!(matches!(error, PortError::Transient(_)));
    }
}
