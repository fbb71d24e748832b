//! Token-budgeted text splitting for document and web-snippet ingestion.
//!
//! Splitting is semantic-first (`semchunk-rs`) with a `tiktoken-rs` token
//! counter; when the configured model has no known encoding we fall back to a
//! whitespace counter so ingestion keeps flowing. An optional word-based
//! overlap keeps spans around chunk boundaries visible to retrieval.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{cl100k_base, get_bpe_from_model};

/// Token budget used when no explicit chunk size is configured.
pub const DEFAULT_CHUNK_TOKENS: usize = 512;
/// Overlap used when no explicit overlap is configured.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Caller configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load an encoding for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Split `text` into segments of at most `chunk_size` tokens with an optional
/// word overlap between adjacent segments.
///
/// Returns an empty vector when the input is all whitespace.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    model: &str,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_token_counter(model);
    Ok(chunk_with_counter(text, chunk_size, overlap, counter))
}

/// Resolve a token counter for `model`, falling back to whitespace counting
/// when no encoding is known.
fn build_token_counter(model: &str) -> TokenCounter {
    let resolved = if model.trim().is_empty() {
        cl100k_base()
    } else {
        get_bpe_from_model(model).or_else(|error| {
            tracing::debug!(model, error = %error, "Tokenizer lookup failed; using cl100k_base");
            cl100k_base()
        })
    };

    match resolved {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        Err(error) => {
            tracing::warn!(model, error = %error, "No tokenizer available; using whitespace counter");
            whitespace_counter()
        }
    }
}

fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: TokenCounter,
) -> Vec<String> {
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base = chunker.chunk(text);
    apply_overlap(base, chunk_size, overlap, &counter)
}

/// Prefix each chunk (after the first) with the tail of its predecessor,
/// trimming from the front so the combined segment stays within budget.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &TokenCounter,
) -> Vec<String> {
    let effective = overlap.min(chunk_size.saturating_sub(1));
    if effective == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut out = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        let combined = match previous.as_deref() {
            None => current.clone(),
            Some(prev) => {
                let tail = word_tail(prev, effective);
                let glued = if tail.is_empty() {
                    current.clone()
                } else {
                    format!("{tail} {current}")
                };
                trim_to_budget(glued, chunk_size, counter)
            }
        };
        out.push(combined);
        previous = Some(current);
    }
    out
}

/// Last `words` whitespace-separated words of `text`.
fn word_tail(text: &str, words: usize) -> String {
    let all: Vec<&str> = text.split_whitespace().collect();
    let start = all.len().saturating_sub(words);
    all[start..].join(" ")
}

/// Drop leading words until `text` fits the token budget.
fn trim_to_budget(text: String, budget: usize, counter: &TokenCounter) -> String {
    if counter.as_ref()(&text) <= budget {
        return text;
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    for start in 1..words.len() {
        let candidate = words[start..].join(" ");
        if counter.as_ref()(&candidate) <= budget {
            return candidate;
        }
    }
    String::new()
}
