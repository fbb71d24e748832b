//! HTTP client implementing the vector store port against Qdrant.
//!
//! Each document gets its own collection (`{prefix}{doc_id}`), created on
//! first upsert. Point payloads carry the chunk text, its document order, a
//! content hash, and a creation date tag.

use crate::config::get_config;
use crate::embedding::EmbeddingClient;
use crate::ports::{PortError, TextChunk, VectorStore};
use crate::vectordb::payload::{
    build_payload, chunk_from_payload, compute_chunk_hash, current_timestamp_rfc3339,
    generate_point_id,
};
use crate::vectordb::types::{
    CountResponse, QueryResponse, QueryResponseResult, ScrollResponse, VectorDbError,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Qdrant-backed implementation of the vector store port.
pub struct QdrantStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection_prefix: String,
    pub(crate) embedder: Box<dyn EmbeddingClient>,
    pub(crate) vector_size: u64,
}

impl QdrantStore {
    /// Construct a store using configuration derived from the environment.
    pub fn new(embedder: Box<dyn EmbeddingClient>) -> Result<Self, VectorDbError> {
        let config = get_config();
        let client = Client::builder()
            .user_agent("docgraph/qdrant")
            .build()?;
        let base_url =
            normalize_base_url(&config.qdrant_url).map_err(VectorDbError::InvalidUrl)?;
        tracing::debug!(url = %base_url, prefix = %config.qdrant_collection_prefix, "Initialized Qdrant client");

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
            collection_prefix: config.qdrant_collection_prefix.clone(),
            embedder,
            vector_size: config.embedding_dimension as u64,
        })
    }

    fn collection_name(&self, doc_id: &str) -> String {
        format!("{}{}", self.collection_prefix, doc_id)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut req = self.client.request(method, format!("{base}/{path}"));
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorDbError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection}"))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(VectorDbError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), VectorDbError> {
        if self.collection_exists(collection).await? {
            return Ok(());
        }
        let body = json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{collection}"))
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response).await?;
        tracing::debug!(collection, vector_size = self.vector_size, "Collection created");
        Ok(())
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<(), VectorDbError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorDbError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }

    async fn point_count(&self, collection: &str) -> Result<usize, VectorDbError> {
        let response = self
            .request(Method::POST, &format!("collections/{collection}/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorDbError::UnexpectedStatus { status, body });
        }
        let payload: CountResponse = response.json().await?;
        Ok(payload.result.count)
    }

    async fn upsert_chunks(
        &self,
        chunks: &[TextChunk],
        doc_id: &str,
    ) -> Result<(), VectorDbError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let collection = self.collection_name(doc_id);
        self.ensure_collection(&collection).await?;

        let vectors = self.embedder.generate_embeddings(chunks.to_vec()).await?;
        let now = current_timestamp_rfc3339();
        let points: Vec<Value> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, vector))| {
                json!({
                    "id": generate_point_id(),
                    "vector": vector,
                    "payload": build_payload(doc_id, index, text, &compute_chunk_hash(text), &now),
                })
            })
            .collect();

        let point_count = points.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        self.ensure_success(response).await?;
        tracing::info!(collection, points = point_count, "Chunks indexed");
        Ok(())
    }

    async fn search_chunks(
        &self,
        doc_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<TextChunk>, VectorDbError> {
        let collection = self.collection_name(doc_id);
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().unwrap_or_default();

        let response = self
            .request(Method::POST, &format!("collections/{collection}/points/query"))
            .json(&json!({
                "query": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorDbError::UnexpectedStatus { status, body };
            tracing::error!(collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .filter_map(|point| point.payload)
            .filter_map(|payload| chunk_from_payload(&payload).map(|(_, text)| text))
            .collect())
    }

    async fn scroll_all(&self, doc_id: &str) -> Result<Vec<TextChunk>, VectorDbError> {
        let collection = self.collection_name(doc_id);
        let mut offset: Option<Value> = None;
        let mut indexed = Vec::new();

        loop {
            let mut body = json!({
                "with_payload": true,
                "with_vector": false,
                "limit": 256,
            });
            if let Some(next) = &offset {
                body.as_object_mut()
                    .expect("scroll body is an object")
                    .insert("offset".into(), next.clone());
            }

            let response = self
                .request(
                    Method::POST,
                    &format!("collections/{collection}/points/scroll"),
                )
                .json(&body)
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(VectorDbError::UnexpectedStatus { status, body });
            }

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                if let Some(payload) = point.payload
                    && let Some(entry) = chunk_from_payload(&payload)
                {
                    indexed.push(entry);
                }
            }

            match result.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        // Scroll order is storage order; restore document order explicitly.
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, text)| text).collect())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, chunks: &[TextChunk], doc_id: &str) -> Result<(), PortError> {
        Ok(self.upsert_chunks(chunks, doc_id).await?)
    }

    async fn similarity_search(
        &self,
        doc_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<TextChunk>, PortError> {
        Ok(self.search_chunks(doc_id, query, k).await?)
    }

    async fn has_chunks(&self, doc_id: &str) -> Result<bool, PortError> {
        let collection = self.collection_name(doc_id);
        if !self.collection_exists(&collection).await? {
            return Ok(false);
        }
        Ok(self.point_count(&collection).await? > 0)
    }

    async fn get_all(&self, doc_id: &str) -> Result<Vec<TextChunk>, PortError> {
        Ok(self.scroll_all(doc_id).await?)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use httpmock::{Method::GET, Method::POST, MockServer};

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2]).collect())
        }
    }

    fn store(base_url: String) -> QdrantStore {
        QdrantStore {
            client: Client::builder()
                .user_agent("docgraph-test")
                .build()
                .expect("client"),
            base_url,
            api_key: None,
            collection_prefix: "doc-".into(),
            embedder: Box::new(FixedEmbedder),
            vector_size: 2,
        }
    }

    #[tokio::test]
    async fn missing_collection_means_no_chunks() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/doc-doc1");
                then.status(404);
            })
            .await;

        let store = store(server.base_url());
        let present = store.has_chunks("doc1").await.expect("existence check");
        mock.assert();
        assert!(!present);
    }

    #[tokio::test]
    async fn similarity_search_extracts_payload_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/doc-doc1/points/query");
                then.status(200).json_body(json!({
                    "result": [
                        {
                            "id": "p1",
                            "score": 0.9,
                            "payload": { "chunk_index": 0, "text": "first", "doc_id": "doc1" }
                        },
                        {
                            "id": "p2",
                            "score": 0.7,
                            "payload": { "chunk_index": 3, "text": "second", "doc_id": "doc1" }
                        }
                    ]
                }));
            })
            .await;

        let store = store(server.base_url());
        let hits = store
            .similarity_search("doc1", "question", 2)
            .await
            .expect("search");
        mock.assert();
        assert_eq!(hits, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn get_all_restores_document_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/doc-doc1/points/scroll");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "payload": { "chunk_index": 2, "text": "third" } },
                            { "payload": { "chunk_index": 0, "text": "first" } },
                            { "payload": { "chunk_index": 1, "text": "second" } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let store = store(server.base_url());
        let chunks = store.get_all("doc1").await.expect("scroll");
        assert_eq!(
            chunks,
            vec![
                "first".to_string(),
                "second".to_string(),
                "third".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn upsert_creates_missing_collection_and_writes_points() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/doc-doc1");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::PUT).path("/collections/doc-doc1");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let put_points = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::PUT)
                    .path("/collections/doc-doc1/points");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let store = store(server.base_url());
        store
            .upsert(&["alpha".to_string(), "beta".to_string()], "doc1")
            .await
            .expect("upsert");

        exists.assert();
        create.assert();
        put_points.assert();
    }
}
