//! Helpers for constructing and hashing Qdrant point payloads.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload stored alongside each indexed chunk.
///
/// `chunk_index` preserves the document order so `get_all` can return chunks
/// in a stable sequence; `created_at` is the creation date tag used by
/// retention tooling.
pub(crate) fn build_payload(
    doc_id: &str,
    chunk_index: usize,
    text: &str,
    chunk_hash: &str,
    created_at: &str,
) -> Value {
    json!({
        "doc_id": doc_id,
        "chunk_index": chunk_index,
        "text": text,
        "chunk_hash": chunk_hash,
        "created_at": created_at,
    })
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub(crate) fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier suitable for Qdrant points.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}

/// Extract `(chunk_index, text)` from a stored payload, if both are present.
pub(crate) fn chunk_from_payload(payload: &Map<String, Value>) -> Option<(usize, String)> {
    let index = payload.get("chunk_index")?.as_u64()? as usize;
    let text = payload.get("text")?.as_str()?.to_string();
    Some((index, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert!(!h1.is_empty());
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn payload_round_trips_index_and_text() {
        let payload = build_payload("doc1", 7, "sample", "hash", "2025-01-01T00:00:00Z");
        let map = payload.as_object().expect("object payload");
        assert_eq!(map["doc_id"], "doc1");
        assert_eq!(chunk_from_payload(map), Some((7, "sample".to_string())));
    }

    #[test]
    fn payload_without_text_is_skipped() {
        let mut map = serde_json::Map::new();
        map.insert("chunk_index".into(), serde_json::json!(1));
        assert_eq!(chunk_from_payload(&map), None);
    }
}
