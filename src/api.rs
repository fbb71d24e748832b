//! HTTP surface for the document summarization service.
//!
//! This module exposes a compact Axum router with two endpoints:
//!
//! - `POST /summary` – Run the full pipeline for one document and query.
//!   Accepts `file_id`, `pdf_url`, `query`, and an optional `lang` (defaults
//!   to `"ko"`), and returns the summary or answer plus cache status.
//! - `GET /metrics` – Observe pipeline counters (runs, cache hits, failures).

use crate::pipeline::{GenerateApi, GenerateOutcome};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Build the HTTP router exposing the summarization API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: GenerateApi + 'static,
{
    Router::new()
        .route("/summary", post(generate_summary::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Request body for the `POST /summary` endpoint.
#[derive(Deserialize)]
struct SummaryRequest {
    /// Stable document identifier used for caching and collection naming.
    file_id: String,
    /// URL of the PDF to load if the document is not yet indexed.
    pdf_url: String,
    /// User question, or the sentinel `SUMMARY_ALL` for a whole-document summary.
    query: String,
    /// BCP-47 style language code for the final output.
    #[serde(default = "default_lang")]
    lang: String,
}

fn default_lang() -> String {
    "ko".to_string()
}

/// Run the pipeline for one request.
///
/// The pipeline itself never escalates to an HTTP error: step failures are
/// reported inside the response body so callers can distinguish a failed run
/// from a transport problem.
async fn generate_summary<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SummaryRequest>,
) -> Json<GenerateOutcome>
where
    S: GenerateApi,
{
    let SummaryRequest {
        file_id,
        pdf_url,
        query,
        lang,
    } = request;
    let outcome = service.generate(&file_id, &pdf_url, &query, &lang).await;
    tracing::info!(
        file_id,
        cached = outcome.cached,
        failed = outcome.error.is_some(),
        "Summary request completed"
    );
    Json(outcome)
}

/// Return a concise snapshot of pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: GenerateApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        runs: snapshot.runs,
        cache_hits: snapshot.cache_hits,
        failures: snapshot.failures,
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    runs: u64,
    cache_hits: u64,
    failures: u64,
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{GenerateApi, GenerateOutcome};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn summary_route_passes_request_fields_through() {
        let service = Arc::new(StubService::new(GenerateOutcome {
            file_id: "doc1".into(),
            cached: false,
            summary: None,
            answer: Some("Forty-two.".into()),
            error: None,
        }));
        let app = create_router(service.clone());

        let payload = json!({
            "file_id": "doc1",
            "pdf_url": "https://example.org/doc1.pdf",
            "query": "What is the answer?",
            "lang": "en"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/summary")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["file_id"], "doc1");
        assert_eq!(json["answer"], "Forty-two.");
        assert_eq!(json["cached"], false);
        assert!(json.get("summary").is_none());
        assert!(json.get("error").is_none());

        let calls = service.recorded_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("doc1".to_string(), "https://example.org/doc1.pdf".to_string(), "What is the answer?".to_string(), "en".to_string()));
    }

    #[tokio::test]
    async fn summary_route_defaults_lang_to_korean() {
        let service = Arc::new(StubService::new(GenerateOutcome {
            file_id: "doc1".into(),
            cached: true,
            summary: Some("요약".into()),
            answer: None,
            error: None,
        }));
        let app = create_router(service.clone());

        let payload = json!({
            "file_id": "doc1",
            "pdf_url": "https://example.org/doc1.pdf",
            "query": "SUMMARY_ALL"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/summary")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let calls = service.recorded_calls().await;
        assert_eq!(calls[0].3, "ko");
    }

    #[tokio::test]
    async fn failed_runs_are_reported_in_the_body_not_the_status() {
        let service = Arc::new(StubService::new(GenerateOutcome {
            file_id: "doc1".into(),
            cached: false,
            summary: None,
            answer: None,
            error: Some("load_pdf: failed after 3 tries: connection refused".into()),
        }));
        let app = create_router(service);

        let payload = json!({
            "file_id": "doc1",
            "pdf_url": "https://example.org/doc1.pdf",
            "query": "anything"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/summary")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert!(
            json["error"]
                .as_str()
                .expect("error string")
                .starts_with("load_pdf: failed after 3 tries:")
        );
    }

    #[tokio::test]
    async fn metrics_route_reports_counters() {
        let service = Arc::new(StubService::new(GenerateOutcome {
            file_id: "doc1".into(),
            cached: false,
            summary: None,
            answer: None,
            error: None,
        }));
        let app = create_router(service);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["runs"], 3);
        assert_eq!(json["cache_hits"], 1);
        assert_eq!(json["failures"], 0);
    }

    struct StubService {
        calls: Mutex<Vec<(String, String, String, String)>>,
        outcome: GenerateOutcome,
    }

    impl StubService {
        fn new(outcome: GenerateOutcome) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome,
            }
        }

        async fn recorded_calls(&self) -> Vec<(String, String, String, String)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl GenerateApi for StubService {
        async fn generate(
            &self,
            file_id: &str,
            url: &str,
            query: &str,
            lang: &str,
        ) -> GenerateOutcome {
            let mut guard = self.calls.lock().await;
            guard.push((
                file_id.to_string(),
                url.to_string(),
                query.to_string(),
                lang.to_string(),
            ));
            self.outcome.clone()
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                runs: 3,
                cache_hits: 1,
                failures: 0,
            }
        }
    }
}
