//! Mutable state threaded through every graph step.

use crate::ports::TextChunk;

/// Reserved query meaning "summarize the whole document".
///
/// Compared against the incoming query after trimming and ignoring ASCII
/// case, so `" summary_all "` triggers summary mode as well.
pub const SUMMARY_SENTINEL: &str = "SUMMARY_ALL";

/// Verbatim answer used when query refinement concludes the question is
/// unrelated to the document.
pub const UNRELATED_ANSWER: &str =
    "The question is not related to the contents of this document, so it cannot be answered from it.";

/// Whether `query` is the reserved summary sentinel.
pub fn is_summary_query(query: &str) -> bool {
    query.trim().eq_ignore_ascii_case(SUMMARY_SENTINEL)
}

/// Single mutable record flowing through one graph execution.
///
/// One instance is created per `generate` call, lives for the duration of the
/// run, and is discarded once the facade extracts the response. Instances are
/// never shared across concurrent requests.
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// Document identifier, set once at entry.
    pub file_id: String,
    /// Source document URL, set once at entry.
    pub url: String,
    /// User query; rewritten in place by the Refine node.
    pub query: String,
    /// Target language for the final response.
    pub lang: String,

    /// Ordered chunks loaded from the source document or fetched from the
    /// vector store.
    pub chunks: Option<Vec<TextChunk>>,
    /// Chunks selected as relevant context for the current query; replaced at
    /// each retrieval step.
    pub retrieved: Option<Vec<TextChunk>>,

    /// Full-document summary, cached or freshly computed.
    pub summary: Option<String>,
    /// Final response text for question-answering mode.
    pub answer: Option<String>,

    /// Whether `summary` came from the cache.
    pub cached: bool,
    /// Whether the document's chunks are already present in the vector store.
    pub embedded: bool,
    /// Whether the query is the summary sentinel; computed once at entry.
    pub is_summary: bool,
    /// Whether the router judged that external web information is needed.
    pub is_web: bool,
    /// Whether verification judged the generated answer acceptable.
    pub is_good: bool,

    /// Number of completed query-refinement rounds; bounds the refine loop.
    pub refine_rounds: u32,

    /// Terminal diagnostic written by the last failed retry of any step.
    /// Append-once: never cleared, and once set every routing decision drains
    /// to the finish node.
    pub error: Option<String>,
}

impl PipelineState {
    /// Create a fresh state for one pipeline run.
    pub fn new(file_id: &str, url: &str, query: &str, lang: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            url: url.to_string(),
            query: query.to_string(),
            lang: lang.to_string(),
            chunks: None,
            retrieved: None,
            summary: None,
            answer: None,
            cached: false,
            embedded: false,
            is_summary: false,
            is_web: false,
            is_good: false,
            refine_rounds: 0,
            error: None,
        }
    }
}
