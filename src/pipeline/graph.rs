//! The orchestration graph: an explicit finite-state machine coordinating
//! document loading, indexing, retrieval, generation, verification, and
//! caching.
//!
//! Each node is a handler method on [`SummaryGraph`]; transitions are decided
//! by the pure [`SummaryGraph::route`] function. Every node runs through the
//! retry wrapper, so a handler failure never escapes the graph: exhausted
//! retries write `state.error` and all subsequent routing drains to
//! [`Node::Finish`].

use crate::pipeline::retry::{RetryPolicy, run_with_retries};
use crate::pipeline::state::{PipelineState, UNRELATED_ANSWER, is_summary_query};
use crate::ports::{DocumentLoader, LanguageModel, PortError, SummaryCache, VectorStore, WebSearch};
use futures_util::FutureExt;
use std::sync::Arc;

/// Top-k for plain vector retrieval.
const VECTOR_K: usize = 8;
/// Top-k for vector retrieval when paired with web search.
const VECTOR_K_WEB: usize = 3;
/// Top-k for web search snippets.
const WEB_K: usize = 5;
/// Maximum number of query-refinement rounds before the run is failed.
const MAX_REFINE_ROUNDS: u32 = 3;

/// Identifier for every node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Computes run mode, cache hit, and embedding presence.
    Entry,
    /// Loads the source document into text chunks.
    Load,
    /// Upserts chunks into the vector store.
    Embed,
    /// Builds a working summary and decides the retrieval strategy.
    Router,
    /// Fans out to web search and vector retrieval concurrently.
    RetrieveWeb,
    /// Vector-only retrieval.
    RetrieveVector,
    /// Per-chunk relevance filtering of retrieved context.
    Grade,
    /// Whole-document summarization.
    Summarize,
    /// Answer generation from graded context.
    Generate,
    /// Answer verification against the query and context.
    Verify,
    /// Query rewriting (or refusal) after failed verification.
    Refine,
    /// Summary cache write.
    Save,
    /// Translation of the final text into the requested language.
    Translate,
    /// Terminal no-op.
    Finish,
}

impl Node {
    /// Step name used in logs and retry diagnostics.
    pub fn step_name(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Load => "load_pdf",
            Self::Embed => "embed",
            Self::Router => "route_query",
            Self::RetrieveWeb => "retrieve_web",
            Self::RetrieveVector => "retrieve",
            Self::Grade => "grade",
            Self::Summarize => "summarize",
            Self::Generate => "generate",
            Self::Verify => "verify",
            Self::Refine => "refine",
            Self::Save => "save_summary",
            Self::Translate => "translate",
            Self::Finish => "finish",
        }
    }
}

/// Compiled pipeline graph wired to its five capability ports.
///
/// Built once at process start and shared across requests through an `Arc`;
/// per-request state is owned by each [`SummaryGraph::run`] call.
pub struct SummaryGraph {
    loader: Arc<dyn DocumentLoader>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
    cache: Arc<dyn SummaryCache>,
    web: Arc<dyn WebSearch>,
    retry: RetryPolicy,
}

impl SummaryGraph {
    /// Wire the graph to its port implementations.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        cache: Arc<dyn SummaryCache>,
        web: Arc<dyn WebSearch>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            loader,
            store,
            llm,
            cache,
            web,
            retry,
        }
    }

    /// Execute the graph to completion for one request.
    pub async fn run(self: &Arc<Self>, mut state: PipelineState) -> PipelineState {
        let mut node = Node::Entry;
        while node != Node::Finish {
            tracing::debug!(file_id = %state.file_id, node = node.step_name(), "Running pipeline node");
            let graph = Arc::clone(self);
            run_with_retries(self.retry, node.step_name(), &mut state, move |st| {
                let graph = Arc::clone(&graph);
                async move { graph.dispatch(node, st).await }.boxed()
            })
            .await;
            node = Self::route(node, &state);
        }
        state
    }

    /// Decide the next node. Any recorded error drains straight to `Finish`.
    pub fn route(node: Node, state: &PipelineState) -> Node {
        if state.error.is_some() {
            return Node::Finish;
        }
        match node {
            Node::Entry => {
                if state.is_summary && state.cached {
                    Node::Translate
                } else if state.embedded {
                    Node::Router
                } else {
                    Node::Load
                }
            }
            Node::Load => Node::Embed,
            Node::Embed => Node::Router,
            Node::Router => {
                if state.is_summary {
                    Node::Summarize
                } else if state.is_web {
                    Node::RetrieveWeb
                } else {
                    Node::RetrieveVector
                }
            }
            Node::RetrieveWeb | Node::RetrieveVector => Node::Grade,
            Node::Grade => Node::Generate,
            Node::Generate => Node::Verify,
            Node::Verify => {
                if state.is_good {
                    if state.is_summary {
                        Node::Save
                    } else {
                        Node::Translate
                    }
                } else {
                    Node::Refine
                }
            }
            // Refine leaves a refusal answer in place when the query is
            // unrelated; otherwise it rewrote the query and we loop back.
            Node::Refine => {
                if state.answer.is_some() {
                    Node::Translate
                } else {
                    Node::Router
                }
            }
            Node::Summarize => Node::Save,
            Node::Save => Node::Translate,
            Node::Translate => Node::Finish,
            Node::Finish => Node::Finish,
        }
    }

    async fn dispatch(&self, node: Node, state: &mut PipelineState) -> Result<(), PortError> {
        match node {
            Node::Entry => self.entry(state).await,
            Node::Load => self.load_pdf(state).await,
            Node::Embed => self.embed(state).await,
            Node::Router => self.route_query(state).await,
            Node::RetrieveWeb => self.retrieve_web(state).await,
            Node::RetrieveVector => self.retrieve(state).await,
            Node::Grade => self.grade(state).await,
            Node::Summarize => self.summarize(state).await,
            Node::Generate => self.generate(state).await,
            Node::Verify => self.verify(state).await,
            Node::Refine => self.refine(state).await,
            Node::Save => self.save_summary(state).await,
            Node::Translate => self.translate(state).await,
            Node::Finish => Ok(()),
        }
    }

    /// Compute the run mode, probe the summary cache, and check whether the
    /// document is already embedded.
    async fn entry(&self, st: &mut PipelineState) -> Result<(), PortError> {
        st.is_summary = is_summary_query(&st.query);

        if st.is_summary && self.cache.exists(&st.file_id).await? {
            st.summary = self.cache.get(&st.file_id).await?;
            st.cached = st.summary.is_some();
        } else {
            st.cached = false;
        }

        st.embedded = self.store.has_chunks(&st.file_id).await?;
        tracing::debug!(
            file_id = %st.file_id,
            is_summary = st.is_summary,
            cached = st.cached,
            embedded = st.embedded,
            "Entry decision computed"
        );
        Ok(())
    }

    async fn load_pdf(&self, st: &mut PipelineState) -> Result<(), PortError> {
        let chunks = self.loader.load(&st.url).await?;
        tracing::info!(file_id = %st.file_id, chunks = chunks.len(), "Document loaded");
        st.chunks = Some(chunks);
        Ok(())
    }

    async fn embed(&self, st: &mut PipelineState) -> Result<(), PortError> {
        if st.embedded {
            return Ok(());
        }
        let chunks = st
            .chunks
            .as_deref()
            .ok_or_else(|| PortError::Validation("no chunks available to embed".into()))?;
        self.store.upsert(chunks, &st.file_id).await?;
        st.embedded = true;
        Ok(())
    }

    /// Build a working summary when none exists yet, then ask the model
    /// whether the query needs external web information.
    async fn route_query(&self, st: &mut PipelineState) -> Result<(), PortError> {
        if st.summary.is_none() {
            if let Some(cached) = self.cache.get(&st.file_id).await? {
                st.summary = Some(cached);
            } else {
                if st.chunks.is_none() {
                    st.chunks = Some(self.store.get_all(&st.file_id).await?);
                }
                let chunks = st
                    .chunks
                    .as_deref()
                    .ok_or_else(|| PortError::Validation("no chunks available to summarize".into()))?;
                st.summary = Some(self.llm.summarize(chunks).await?);
            }
        }

        let verdict = self.llm.execute(&prompts::web_route(&st.query)).await?;
        st.is_web = affirmed(&verdict, "yes");
        tracing::debug!(file_id = %st.file_id, is_web = st.is_web, "Retrieval strategy decided");
        Ok(())
    }

    /// Fan out to web search and vector retrieval concurrently, joining both
    /// before proceeding; vector results come first in the combined context.
    async fn retrieve_web(&self, st: &mut PipelineState) -> Result<(), PortError> {
        let (mut retrieved, web_hits) = tokio::try_join!(
            self.store.similarity_search(&st.file_id, &st.query, VECTOR_K_WEB),
            self.web.search(&st.query, WEB_K),
        )?;
        retrieved.extend(web_hits);
        st.retrieved = Some(retrieved);
        Ok(())
    }

    async fn retrieve(&self, st: &mut PipelineState) -> Result<(), PortError> {
        st.retrieved = Some(
            self.store
                .similarity_search(&st.file_id, &st.query, VECTOR_K)
                .await?,
        );
        Ok(())
    }

    /// Keep only the retrieved chunks the model grades as relevant. This is a
    /// pure filter: it never introduces chunks that were not retrieved.
    async fn grade(&self, st: &mut PipelineState) -> Result<(), PortError> {
        let summary = st.summary.clone().unwrap_or_default();
        let candidates = st.retrieved.clone().unwrap_or_default();
        let mut kept = Vec::with_capacity(candidates.len());
        for chunk in candidates {
            let verdict = self
                .llm
                .execute(&prompts::grade(&st.query, &summary, &chunk))
                .await?;
            if affirmed(&verdict, "good") {
                kept.push(chunk);
            }
        }
        tracing::debug!(
            file_id = %st.file_id,
            kept = kept.len(),
            "Graded retrieved context"
        );
        st.retrieved = Some(kept);
        Ok(())
    }

    async fn summarize(&self, st: &mut PipelineState) -> Result<(), PortError> {
        // The router may already have produced a working summary from the
        // full chunk set; recomputing it would be the same call.
        if st.summary.is_some() {
            return Ok(());
        }
        if st.chunks.is_none() {
            st.chunks = Some(self.store.get_all(&st.file_id).await?);
        }
        let chunks = st
            .chunks
            .as_deref()
            .ok_or_else(|| PortError::Validation("no chunks available to summarize".into()))?;
        st.summary = Some(self.llm.summarize(chunks).await?);
        Ok(())
    }

    async fn generate(&self, st: &mut PipelineState) -> Result<(), PortError> {
        let retrieved = st.retrieved.as_deref().unwrap_or_default();
        let reply = self
            .llm
            .execute(&prompts::answer(&st.query, retrieved))
            .await?;
        st.answer = Some(reply.trim().to_string());
        Ok(())
    }

    /// Judge the generated answer against the query and graded context.
    async fn verify(&self, st: &mut PipelineState) -> Result<(), PortError> {
        let answer = st
            .answer
            .as_deref()
            .ok_or_else(|| PortError::Validation("no answer available to verify".into()))?;
        let retrieved = st.retrieved.as_deref().unwrap_or_default();
        let verdict = self
            .llm
            .execute(&prompts::verify(&st.query, answer, retrieved))
            .await?;
        st.is_good = affirmed(&verdict, "true");
        tracing::debug!(file_id = %st.file_id, is_good = st.is_good, "Answer verified");
        Ok(())
    }

    /// Either declare the query unrelated to the document or rewrite it for
    /// better retrieval. Bounded by [`MAX_REFINE_ROUNDS`].
    async fn refine(&self, st: &mut PipelineState) -> Result<(), PortError> {
        if st.refine_rounds >= MAX_REFINE_ROUNDS {
            return Err(PortError::Validation(format!(
                "query refinement budget exhausted after {MAX_REFINE_ROUNDS} rounds"
            )));
        }
        st.refine_rounds += 1;

        let summary = st.summary.clone().unwrap_or_default();
        let reply = self
            .llm
            .execute(&prompts::refine(&st.query, &summary))
            .await?;

        if reply.to_uppercase().contains("UNRELATED") {
            st.answer = Some(UNRELATED_ANSWER.to_string());
            return Ok(());
        }

        let rewritten = reply.trim();
        if rewritten.is_empty() {
            return Err(PortError::Validation(
                "refine returned an empty query rewrite".into(),
            ));
        }
        tracing::info!(
            file_id = %st.file_id,
            round = st.refine_rounds,
            "Query rewritten for another retrieval pass"
        );
        st.query = rewritten.to_string();
        // Discard the rejected answer so routing loops back to the router.
        st.answer = None;
        Ok(())
    }

    async fn save_summary(&self, st: &mut PipelineState) -> Result<(), PortError> {
        if !st.is_summary || st.cached {
            return Ok(());
        }
        if let Some(summary) = st.summary.as_deref().filter(|text| !text.is_empty()) {
            self.cache.set(&st.file_id, summary).await?;
            tracing::info!(file_id = %st.file_id, "Summary cached");
        }
        Ok(())
    }

    /// Translate the outgoing text into the requested language. Summary mode
    /// writes the translated text back to both `summary` and `answer`.
    async fn translate(&self, st: &mut PipelineState) -> Result<(), PortError> {
        if st.is_summary {
            st.answer = st.summary.clone();
        }
        let text = st
            .answer
            .clone()
            .ok_or_else(|| PortError::Validation("no text available to translate".into()))?;
        let translated = self
            .llm
            .execute(&prompts::translate(&st.lang, &text))
            .await?
            .trim()
            .to_string();
        if st.is_summary {
            st.summary = Some(translated.clone());
        }
        st.answer = Some(translated);
        Ok(())
    }
}

/// Free-text verdict parsing rule: lowercase the reply and look for the
/// affirmative token as a substring.
fn affirmed(reply: &str, token: &str) -> bool {
    reply.to_lowercase().contains(token)
}

mod prompts {
    //! Prompt templates used by the graph nodes.

    use crate::ports::TextChunk;

    pub(super) fn web_route(query: &str) -> String {
        format!(
            "Decide whether answering the question below requires information \
             from outside the document, such as recent events or external facts.\n\
             Reply with a single word: \"yes\" or \"no\".\n\n\
             ### Question\n{query}\n\n### Decision:"
        )
    }

    pub(super) fn grade(query: &str, summary: &str, chunk: &str) -> String {
        format!(
            "Judge whether the passage is relevant to the question, given the \
             document summary for context. Reply with a single word: \"good\" \
             if relevant, \"bad\" otherwise.\n\n\
             ### Question\n{query}\n\n### Document summary\n{summary}\n\n\
             ### Passage\n{chunk}\n\n### Verdict:"
        )
    }

    pub(super) fn answer(query: &str, retrieved: &[TextChunk]) -> String {
        let context = retrieved.join("\n\n");
        format!(
            "Answer the question using only the passages below.\n\n\
             ### Question\n{query}\n\n### Passages\n{context}\n\n### Answer:"
        )
    }

    pub(super) fn verify(query: &str, answer: &str, retrieved: &[TextChunk]) -> String {
        let context = retrieved.join("\n\n");
        format!(
            "Evaluate the answer against four criteria: it addresses the \
             question, it is grounded in the passages, it is logically \
             consistent, and it is complete. Reply with a single word: \
             \"true\" if all four hold, \"false\" otherwise.\n\n\
             ### Question\n{query}\n\n### Answer\n{answer}\n\n\
             ### Passages\n{context}\n\n### Verdict:"
        )
    }

    pub(super) fn refine(query: &str, summary: &str) -> String {
        format!(
            "The question below could not be answered from the retrieved \
             passages. If the question is unrelated to the document described \
             by the summary, reply with the single word \"UNRELATED\". \
             Otherwise reply with a rewritten version of the question that \
             would retrieve better passages, and nothing else.\n\n\
             ### Question\n{query}\n\n### Document summary\n{summary}\n\n### Reply:"
        )
    }

    pub(super) fn translate(lang: &str, text: &str) -> String {
        format!(
            "Translate the text below into the language with code \"{lang}\". \
             If it is already in that language, return it unchanged. Reply \
             with the translated text only.\n\n### Text\n{text}\n\n### Translation:"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PipelineState {
        PipelineState::new("doc1", "https://example.org/doc1.pdf", "question", "ko")
    }

    #[test]
    fn error_drains_to_finish_from_any_node() {
        let mut st = state();
        st.error = Some("load_pdf: failed after 3 tries: boom".into());
        for node in [
            Node::Entry,
            Node::Load,
            Node::Embed,
            Node::Router,
            Node::Grade,
            Node::Verify,
            Node::Refine,
            Node::Translate,
        ] {
            assert_eq!(SummaryGraph::route(node, &st), Node::Finish);
        }
    }

    #[test]
    fn entry_routes_cached_summary_to_translate() {
        let mut st = state();
        st.is_summary = true;
        st.cached = true;
        st.summary = Some("cached".into());
        assert_eq!(SummaryGraph::route(Node::Entry, &st), Node::Translate);
    }

    #[test]
    fn entry_routes_embedded_document_to_router() {
        let mut st = state();
        st.embedded = true;
        assert_eq!(SummaryGraph::route(Node::Entry, &st), Node::Router);
    }

    #[test]
    fn entry_routes_cold_document_to_load() {
        let st = state();
        assert_eq!(SummaryGraph::route(Node::Entry, &st), Node::Load);
        assert_eq!(SummaryGraph::route(Node::Load, &st), Node::Embed);
        assert_eq!(SummaryGraph::route(Node::Embed, &st), Node::Router);
    }

    #[test]
    fn router_picks_retrieval_strategy() {
        let mut st = state();
        assert_eq!(SummaryGraph::route(Node::Router, &st), Node::RetrieveVector);
        st.is_web = true;
        assert_eq!(SummaryGraph::route(Node::Router, &st), Node::RetrieveWeb);
        st.is_summary = true;
        assert_eq!(SummaryGraph::route(Node::Router, &st), Node::Summarize);
    }

    #[test]
    fn verify_routes_by_verdict_and_mode() {
        let mut st = state();
        st.is_good = true;
        assert_eq!(SummaryGraph::route(Node::Verify, &st), Node::Translate);
        st.is_summary = true;
        assert_eq!(SummaryGraph::route(Node::Verify, &st), Node::Save);
        st.is_good = false;
        assert_eq!(SummaryGraph::route(Node::Verify, &st), Node::Refine);
    }

    #[test]
    fn refine_loops_back_unless_refused() {
        let mut st = state();
        assert_eq!(SummaryGraph::route(Node::Refine, &st), Node::Router);
        st.answer = Some(UNRELATED_ANSWER.into());
        assert_eq!(SummaryGraph::route(Node::Refine, &st), Node::Translate);
    }

    #[test]
    fn verdict_parsing_is_case_insensitive_substring() {
        assert!(affirmed("Good - the passage is relevant.", "good"));
        assert!(affirmed("TRUE", "true"));
        assert!(!affirmed("bad", "good"));
        assert!(!affirmed("False.", "true"));
    }
}
