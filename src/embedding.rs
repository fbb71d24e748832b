//! Embedding client abstraction and HTTP adapters.
//!
//! Both adapters speak the provider's REST API directly through `reqwest`;
//! the provider is chosen once from configuration at wiring time.

use crate::config::{LlmProvider, get_config};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider was unreachable or returned a transport failure.
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider returned an error response.
    #[error("embedding provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned fewer vectors than inputs.
    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of input texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn generate_embeddings(&self, texts: Vec<String>)
    -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client() -> Box<dyn EmbeddingClient> {
    let config = get_config();
    match config.llm_provider {
        LlmProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            config.embedding_model.clone(),
        )),
        LlmProvider::OpenAI => Box::new(OpenAiEmbeddingClient::new(
            config
                .openai_api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string()),
            config.openai_api_key.clone().unwrap_or_default(),
            config.embedding_model.clone(),
        )),
    }
}

/// Embedding adapter for the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct a client targeting the given Ollama base URL.
    pub fn new(base_url: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("docgraph/embedding")
            .build()
            .expect("Failed to construct reqwest::Client for embeddings");
        Self {
            http,
            base_url,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = texts.len();
        let endpoint = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(endpoint)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus { status, body });
        }

        let body: OllamaEmbedResponse = response.json().await?;
        if body.embeddings.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: body.embeddings.len(),
            });
        }
        Ok(body.embeddings)
    }
}

/// Embedding adapter for the OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddingClient {
    /// Construct a client targeting an OpenAI-compatible API base.
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("docgraph/embedding")
            .build()
            .expect("Failed to construct reqwest::Client for embeddings");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = texts.len();
        let endpoint = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus { status, body });
        }

        let body: OpenAiEmbedResponse = response.json().await?;
        if body.data.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: body.data.len(),
            });
        }
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_embeddings_round_trip() {
        let server = MockServer::start_async().await;
        let client =
            OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text".to_string());

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({
                    "embeddings": [[0.1, 0.2], [0.3, 0.4]]
                }));
            })
            .await;

        let vectors = client
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .expect("embeddings");

        mock.assert();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn openai_count_mismatch_is_detected() {
        let server = MockServer::start_async().await;
        let client = OpenAiEmbeddingClient::new(
            server.base_url(),
            "sk-test".to_string(),
            "text-embedding-3-small".to_string(),
        );

        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [{ "embedding": [0.5, 0.5] }]
                }));
            })
            .await;

        let error = client
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            EmbeddingError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let server = MockServer::start_async().await;
        let client = OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text".into());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("boom");
            })
            .await;

        let error = client
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("error status");
        assert!(matches!(error, EmbeddingError::UnexpectedStatus { .. }));
    }
}
