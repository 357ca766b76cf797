//! Qdrant REST vector store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::classification::IndexMetadata;
use crate::metrics;

use super::{IndexEntry, IndexFilter, IndexingError, SearchHit, VectorStore};

/// Vector store backed by a Qdrant collection using cosine distance.
pub struct QdrantVectorStore {
    http: reqwest::Client,
    url: String,
    collection: String,
    api_key: Option<String>,
    dimension: usize,
    timeout: Duration,
    ready: OnceCell<()>,
}

/// Point id derived from the ticket id, so re-upserts hit the same point.
pub fn point_id(ticket_id: &str) -> u64 {
    let digest = Sha256::digest(ticket_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[derive(Debug, Serialize)]
struct Point<'a> {
    id: u64,
    vector: &'a [f32],
    payload: &'a IndexMetadata,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<IndexMetadata>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

impl QdrantVectorStore {
    pub fn new(url: impl Into<String>, collection: impl Into<String>, dimension: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: None,
            dimension,
            timeout: Duration::from_secs(10),
            ready: OnceCell::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.url, path))
            .timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    async fn send(
        &self,
        operation: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, IndexingError> {
        let start = Instant::now();
        let result = req.send().await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                metrics::observe_external_call("qdrant", operation, false, elapsed);
                return Err(IndexingError::Unavailable(e.to_string()));
            }
        };

        let status = response.status();
        metrics::observe_external_call("qdrant", operation, status.is_success(), elapsed);

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("{} {}: {}", operation, status.as_u16(), body);
        if status.is_server_error() || status.as_u16() == 429 {
            Err(IndexingError::Unavailable(message))
        } else {
            Err(IndexingError::Rejected(message))
        }
    }

    /// Create the collection if it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), IndexingError> {
        self.ready
            .get_or_try_init(|| async {
                let path = format!("/collections/{}", self.collection);
                let existing = self
                    .request(reqwest::Method::GET, &path)
                    .send()
                    .await
                    .map_err(|e| IndexingError::Unavailable(e.to_string()))?;

                if existing.status().is_success() {
                    debug!(collection = %self.collection, "Qdrant collection exists");
                    return Ok(());
                }
                if existing.status().as_u16() != 404 {
                    return Err(IndexingError::Unavailable(format!(
                        "collection lookup returned {}",
                        existing.status()
                    )));
                }

                let body = json!({
                    "vectors": { "size": self.dimension, "distance": "Cosine" }
                });
                self.send(
                    "create_collection",
                    self.request(reqwest::Method::PUT, &path).json(&body),
                )
                .await?;

                info!(
                    collection = %self.collection,
                    dimension = self.dimension,
                    "Created Qdrant collection"
                );
                Ok(())
            })
            .await
            .map(|_| ())
    }

    fn filter_json(filter: &IndexFilter) -> Option<Value> {
        let mut must = Vec::new();
        if let Some(urgency) = filter.urgency {
            must.push(json!({ "key": "urgency", "match": { "value": urgency.as_str() } }));
        }
        if let Some(intent) = filter.intent {
            must.push(json!({ "key": "intent", "match": { "value": intent.as_str() } }));
        }
        if let Some(product_area) = filter.product_area {
            must.push(json!({ "key": "product_area", "match": { "value": product_area.as_str() } }));
        }
        if must.is_empty() {
            None
        } else {
            Some(json!({ "must": must }))
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexingError> {
        self.ensure_collection().await?;

        let point = Point {
            id: point_id(&entry.ticket_id),
            vector: &entry.embedding,
            payload: &entry.metadata,
        };
        let body = json!({ "points": [point] });

        let path = format!("/collections/{}/points?wait=true", self.collection);
        self.send("upsert", self.request(reqwest::Method::PUT, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
        filter: &IndexFilter,
    ) -> Result<Vec<SearchHit>, IndexingError> {
        self.ensure_collection().await?;

        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
            "score_threshold": threshold,
        });
        if let Some(filter) = Self::filter_json(filter) {
            body["filter"] = filter;
        }

        let path = format!("/collections/{}/points/search", self.collection);
        let response = self
            .send("search", self.request(reqwest::Method::POST, &path).json(&body))
            .await?;

        let parsed: QdrantResponse<Vec<ScoredPoint>> = response
            .json()
            .await
            .map_err(|e| IndexingError::Unavailable(format!("invalid search response: {}", e)))?;

        Ok(parsed
            .result
            .into_iter()
            .filter_map(|p| {
                p.payload.map(|metadata| SearchHit {
                    ticket_id: metadata.ticket_id.clone(),
                    score: p.score,
                    metadata,
                })
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, IndexingError> {
        self.ensure_collection().await?;

        let path = format!("/collections/{}/points/count", self.collection);
        let response = self
            .send(
                "count",
                self.request(reqwest::Method::POST, &path)
                    .json(&json!({ "exact": true })),
            )
            .await?;

        let parsed: QdrantResponse<CountResult> = response
            .json()
            .await
            .map_err(|e| IndexingError::Unavailable(format!("invalid count response: {}", e)))?;
        Ok(parsed.result.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{Intent, Urgency};

    #[test]
    fn test_point_id_is_stable() {
        assert_eq!(point_id("ticket-1"), point_id("ticket-1"));
        assert_ne!(point_id("ticket-1"), point_id("ticket-2"));
    }

    #[test]
    fn test_filter_json() {
        assert!(QdrantVectorStore::filter_json(&IndexFilter::new()).is_none());

        let filter = IndexFilter::new()
            .with_urgency(Urgency::High)
            .with_intent(Intent::BillingDispute);
        let json = QdrantVectorStore::filter_json(&filter).unwrap();
        let must = json["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(must[0]["key"], "urgency");
        assert_eq!(must[0]["match"]["value"], "high");
        assert_eq!(must[1]["match"]["value"], "billing_dispute");
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{"result":[{"id":1,"version":0,"score":0.82,"payload":{
            "ticket_id":"t-1","excerpt":"x","urgency":"high","intent":"billing_dispute",
            "product_area":"billing","sentiment":"negative","keywords":["invoice"],
            "summary":"s","confidence":0.9,"indexed_at":"2024-01-01T00:00:00Z"}}],
            "status":"ok","time":0.001}"#;
        let parsed: QdrantResponse<Vec<ScoredPoint>> = serde_json::from_str(json).unwrap();
        let point = &parsed.result[0];
        assert!((point.score - 0.82).abs() < 1e-6);
        assert_eq!(point.payload.as_ref().unwrap().ticket_id, "t-1");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transient() {
        let store = QdrantVectorStore::new("http://127.0.0.1:9", "support_tickets", 4)
            .with_timeout(Duration::from_millis(500));
        let err = store.count().await.unwrap_err();
        assert!(matches!(err, IndexingError::Unavailable(_)));
    }
}
