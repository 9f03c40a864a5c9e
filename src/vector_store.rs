//! Vector store adapter.
//!
//! The engine talks to the external similarity store through the
//! [`VectorIndex`] trait; the concrete implementation is a Qdrant REST
//! client. Each corpus owns one collection, created with cosine distance.
//!
//! Point ids are UUIDv5 digests of `corpus_id:file_id:chunk_index`, so an
//! upsert retried after a partial failure overwrites the same points
//! instead of duplicating them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};

/// Payload stored alongside every vector; enough to attribute a retrieved
/// chunk back to its corpus and file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub corpus_id: String,
    pub file_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A vector plus payload, ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A nearest-neighbor hit, ordered by the store from most to least similar.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub score: f64,
    pub payload: ChunkPayload,
}

/// Deterministic point id for a chunk. Stable across retries and re-runs.
pub fn point_id(corpus_id: &str, file_id: &str, chunk_index: i64) -> Uuid {
    let key = format!("{corpus_id}:{file_id}:{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(&self, collection: &str, dims: usize) -> Result<()>;

    /// Delete every point belonging to `file_id`.
    async fn delete_by_file(&self, collection: &str, file_id: &str) -> Result<()>;

    /// Insert or overwrite points, keyed by their ids.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Top-`limit` nearest neighbors of `vector`, most similar first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u64,
    ) -> Result<Vec<ScoredChunk>>;

    /// Drop the collection and all of its points.
    async fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Number of live points in the collection.
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Reachability probe for health reporting.
    async fn ping(&self) -> Result<()>;
}

/// Qdrant REST implementation of [`VectorIndex`].
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::store(e.to_string(), false))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Send a request, retrying rate-limit/server/network failures with the
    /// same backoff schedule as the provider adapters.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| Error::store(e.to_string(), false));
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    let body_text = response.text().await.unwrap_or_default();
                    let err = Error::store(format!("HTTP {status}: {body_text}"), retryable);
                    if !retryable {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(Error::store(e.to_string(), true));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::store("vector store request failed after retries", true)))
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(&self, collection: &str, dims: usize) -> Result<()> {
        let url = format!("{}/collections/{}", self.base_url, collection);

        // Qdrant returns 404 for a missing collection; anything else means
        // it already exists and we leave it alone.
        let exists = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::store(e.to_string(), true))?
            .status()
            .is_success();

        if exists {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": dims, "distance": "Cosine" }
        });
        self.send_with_retry(|| self.client.put(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_by_file(&self, collection: &str, file_id: &str) -> Result<()> {
        let url = format!(
            "{}/collections/{}/points/delete?wait=true",
            self.base_url, collection
        );
        let body = serde_json::json!({
            "filter": {
                "must": [ { "key": "file_id", "match": { "value": file_id } } ]
            }
        });
        self.send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id.to_string(),
                    "vector": r.vector,
                    "payload": r.payload,
                })
            })
            .collect();

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, collection
        );
        let body = serde_json::json!({ "points": points });
        self.send_with_retry(|| self.client.put(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u64,
    ) -> Result<Vec<ScoredChunk>> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, collection
        );
        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let json = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;

        parse_search_response(&json)
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let url = format!("{}/collections/{}", self.base_url, collection);
        self.send_with_retry(|| self.client.delete(&url)).await?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let url = format!("{}/collections/{}", self.base_url, collection);
        let json = self.send_with_retry(|| self.client.get(&url)).await?;

        json.get("result")
            .and_then(|r| r.get("points_count"))
            .and_then(|c| c.as_u64())
            .ok_or_else(|| Error::store("invalid collection info response", false))
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/collections", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::store(e.to_string(), true))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::store(
                format!("HTTP {}", resp.status()),
                resp.status().is_server_error(),
            ))
        }
    }
}

fn parse_search_response(json: &serde_json::Value) -> Result<Vec<ScoredChunk>> {
    let hits = json
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| Error::store("invalid search response: missing result array", false))?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let score = hit
            .get("score")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| Error::store("invalid search response: missing score", false))?;
        let payload: ChunkPayload = hit
            .get("payload")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| Error::store(format!("invalid search payload: {e}"), false))?
            .ok_or_else(|| Error::store("invalid search response: missing payload", false))?;

        results.push(ScoredChunk { score, payload });
    }

    Ok(results)
}
