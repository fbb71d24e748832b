//! Thin facade between the HTTP surface and the compiled graph.

use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::graph::SummaryGraph;
use crate::pipeline::state::PipelineState;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Structured payload returned for every pipeline run.
///
/// Exactly one of `summary`, `answer`, or `error` is populated: `error` when
/// any step exhausted its retries, `summary` in summary mode, and `answer`
/// for question answering.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    /// Document identifier echoed back to the caller.
    pub file_id: String,
    /// Whether the summary was served from the cache.
    pub cached: bool,
    /// Whole-document summary (summary mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Generated answer (question-answering mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Terminal diagnostic recorded by the failing step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Abstraction over the pipeline used by external surfaces.
#[async_trait]
pub trait GenerateApi: Send + Sync {
    /// Run the full pipeline for one request.
    async fn generate(&self, file_id: &str, url: &str, query: &str, lang: &str)
    -> GenerateOutcome;

    /// Current pipeline counters for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the compiled graph and exposes the single `generate` entry point.
///
/// The graph and its wired port implementations are constructed once per
/// process and reused across requests; each call creates its own
/// [`PipelineState`], so no pipeline fields are ever shared.
pub struct PipelineService {
    graph: Arc<SummaryGraph>,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineService {
    /// Compile the graph once and wrap it behind the facade.
    pub fn new(graph: SummaryGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Run the graph to completion and map the final state to a response.
    pub async fn generate(
        &self,
        file_id: &str,
        url: &str,
        query: &str,
        lang: &str,
    ) -> GenerateOutcome {
        let state = PipelineState::new(file_id, url, query, lang);
        let result = self.graph.run(state).await;
        self.metrics
            .record_run(result.cached, result.error.is_some());

        if let Some(error) = result.error {
            tracing::warn!(file_id, error = %error, "Pipeline run failed");
            return GenerateOutcome {
                file_id: result.file_id,
                cached: result.cached,
                summary: None,
                answer: None,
                error: Some(error),
            };
        }

        tracing::info!(
            file_id,
            cached = result.cached,
            is_summary = result.is_summary,
            "Pipeline run completed"
        );
        if result.is_summary {
            GenerateOutcome {
                file_id: result.file_id,
                cached: result.cached,
                summary: result.summary,
                answer: None,
                error: None,
            }
        } else {
            GenerateOutcome {
                file_id: result.file_id,
                cached: result.cached,
                summary: None,
                answer: result.answer,
                error: None,
            }
        }
    }

    /// Return the current pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl GenerateApi for PipelineService {
    async fn generate(
        &self,
        file_id: &str,
        url: &str,
        query: &str,
        lang: &str,
    ) -> GenerateOutcome {
        PipelineService::generate(self, file_id, url, query, lang).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}
