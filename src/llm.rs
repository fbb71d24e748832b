//! Language-model execution adapters.
//!
//! Implements the [`LanguageModel`] port for the Ollama `/api/generate`
//! endpoint and OpenAI-compatible chat completions. Whole-document
//! summarization is a map-reduce over token-budgeted chunk batches so inputs
//! larger than one context window still reduce to a single synthesis.

use crate::config::{LlmProvider, get_config};
use crate::ports::{LanguageModel, PortError, TextChunk};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Word budget per map batch during summarization.
const SUMMARIZE_BATCH_WORDS: usize = 3_000;

/// Errors surfaced by the completion providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport failed before a response was received.
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider returned an error response.
    #[error("completion provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider response could not be interpreted.
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for PortError {
    fn from(error: LlmError) -> Self {
        PortError::Transient(error.to_string())
    }
}

/// Build a language model client from the current configuration.
pub fn get_language_model() -> Arc<dyn LanguageModel> {
    let config = get_config();
    match config.llm_provider {
        LlmProvider::Ollama => Arc::new(OllamaLlmClient::new(
            config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            config.llm_model.clone(),
        )),
        LlmProvider::OpenAI => Arc::new(OpenAiLlmClient::new(
            config
                .openai_api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string()),
            config.openai_api_key.clone().unwrap_or_default(),
            config.llm_model.clone(),
        )),
    }
}

/// Completion client for a local Ollama runtime.
pub struct OllamaLlmClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaLlmClient {
    /// Construct a client targeting the given Ollama base URL.
    pub fn new(base_url: String, model: String) -> Self {
        let http = Client::builder()
            .user_agent("docgraph/llm")
            .build()
            .expect("Failed to construct reqwest::Client for completions");
        Self {
            http,
            base_url,
            model,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let endpoint = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0.3 }
        });

        let response = self.http.post(endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::UnexpectedStatus { status, body });
        }

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;
        if !body.done {
            return Err(LlmError::InvalidResponse(
                "incomplete response (streaming not supported)".into(),
            ));
        }
        Ok(body.response.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl LanguageModel for OllamaLlmClient {
    async fn execute(&self, prompt: &str) -> Result<String, PortError> {
        Ok(self.complete(prompt).await?)
    }

    async fn summarize(&self, chunks: &[TextChunk]) -> Result<String, PortError> {
        map_reduce(self, chunks).await
    }
}

/// Completion client for an OpenAI-compatible chat completions API.
pub struct OpenAiLlmClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiLlmClient {
    /// Construct a client targeting an OpenAI-compatible API base.
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let http = Client::builder()
            .user_agent("docgraph/llm")
            .build()
            .expect("Failed to construct reqwest::Client for completions");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
        });

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::UnexpectedStatus { status, body });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".into()))?;
        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl LanguageModel for OpenAiLlmClient {
    async fn execute(&self, prompt: &str) -> Result<String, PortError> {
        Ok(self.complete(prompt).await?)
    }

    async fn summarize(&self, chunks: &[TextChunk]) -> Result<String, PortError> {
        map_reduce(self, chunks).await
    }
}

/// Map-reduce summarization over `chunks`.
///
/// Chunks are grouped into batches under a word budget; each batch is
/// summarized independently (map) and the partial summaries are synthesized
/// into one final summary (reduce). A single batch skips the reduce pass.
async fn map_reduce<M>(model: &M, chunks: &[TextChunk]) -> Result<String, PortError>
where
    M: LanguageModel + ?Sized,
{
    if chunks.is_empty() {
        return Err(PortError::Validation("no chunks to summarize".into()));
    }

    let batches = batch_by_words(chunks, SUMMARIZE_BATCH_WORDS);
    if batches.len() == 1 {
        return model.execute(&summarize_prompt(&batches[0])).await;
    }

    let mut partials = Vec::with_capacity(batches.len());
    for batch in &batches {
        partials.push(model.execute(&summarize_prompt(batch)).await?);
    }
    model.execute(&combine_prompt(&partials)).await
}

/// Group chunks into contiguous batches whose word count stays under `budget`.
fn batch_by_words(chunks: &[TextChunk], budget: usize) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    let mut current_words = 0;

    for chunk in chunks {
        let words = chunk.split_whitespace().count();
        if current_words > 0 && current_words + words > budget {
            batches.push(std::mem::take(&mut current));
            current_words = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(chunk);
        current_words += words;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn summarize_prompt(text: &str) -> String {
    format!(
        "Write a concise summary of the document text below, covering its \
         main topic, key findings, and conclusions.\n\n### Text\n{text}\n\n### Summary:"
    )
}

fn combine_prompt(partials: &[String]) -> String {
    let joined = partials.join("\n\n");
    format!(
        "The sections below are partial summaries of one document. Synthesize \
         them into a single coherent summary.\n\n### Partial summaries\n{joined}\n\n### Summary:"
    )
}
