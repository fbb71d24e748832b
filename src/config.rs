//! Environment-driven runtime configuration.

use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docgraph server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores document chunks.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Prefix prepended to per-document collection names.
    pub qdrant_collection_prefix: String,
    /// Redis connection URL for the summary cache.
    pub redis_url: String,
    /// TTL applied to cached summaries, in seconds.
    pub summary_ttl_seconds: u64,
    /// Provider answering completion requests.
    pub llm_provider: LlmProvider,
    /// Model identifier passed to the completion provider.
    pub llm_model: String,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: Option<String>,
    /// Override for the OpenAI-compatible API base URL.
    pub openai_api_base: Option<String>,
    /// API key for the OpenAI-compatible endpoint.
    pub openai_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// API key for the Tavily web search endpoint.
    pub tavily_api_key: Option<String>,
    /// Optional override for the automatic chunk size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Optional sliding token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: Option<usize>,
    /// Maximum attempts per pipeline step.
    pub retry_max_attempts: Option<u32>,
    /// Fixed pause between retry attempts, in milliseconds.
    pub retry_backoff_ms: Option<u64>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported completion backends for the pipeline.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_collection_prefix: load_env_optional("QDRANT_COLLECTION_PREFIX")
                .unwrap_or_else(|| "doc-".to_string()),
            redis_url: load_env("REDIS_URL")?,
            summary_ttl_seconds: parse_optional("SUMMARY_TTL_SECONDS")?.unwrap_or(86_400),
            llm_provider: load_env("LLM_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".to_string()))?,
            llm_model: load_env("LLM_MODEL")?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            openai_api_base: load_env_optional("OPENAI_API_BASE"),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            tavily_api_key: load_env_optional("TAVILY_API_KEY"),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?,
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?,
            retry_max_attempts: parse_optional("RETRY_MAX_ATTEMPTS")?,
            retry_backoff_ms: parse_optional("RETRY_BACKOFF_MS")?,
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Fixed configuration values used by unit tests that never reach the network.
#[cfg(test)]
pub(crate) mod test_support {
    use super::{CONFIG, Config, LlmProvider};

    /// Install a deterministic configuration if no other test got there first.
    pub(crate) fn ensure_test_config() {
        let _ = CONFIG.set(Config {
            qdrant_url: "http://127.0.0.1:6333".to_string(),
            qdrant_api_key: None,
            qdrant_collection_prefix: "doc-".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            summary_ttl_seconds: 86_400,
            llm_provider: LlmProvider::Ollama,
            llm_model: "llama3.2".to_string(),
            ollama_url: None,
            openai_api_base: None,
            openai_api_key: None,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
            tavily_api_key: None,
            text_splitter_chunk_size: None,
            text_splitter_chunk_overlap: None,
            retry_max_attempts: None,
            retry_backoff_ms: None,
            server_port: None,
        });
    }
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection_prefix = %config.qdrant_collection_prefix,
        llm_provider = ?config.llm_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
