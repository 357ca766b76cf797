//! Free-text semantic search over indexed tickets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{Embedder, EmbeddingError};

use super::{IndexFilter, IndexingError, SearchConfig, SearchHit, SemanticIndexer};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("top_k must be between 1 and {max}, got {value}")]
    InvalidTopK { value: usize, max: usize },

    #[error("threshold must be between -1.0 and 1.0, got {0}")]
    InvalidThreshold(f32),

    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexingError),
}

/// A chat-style knowledge-base query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default, flatten)]
    pub filter: IndexFilter,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_filter(mut self, filter: IndexFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub top_k: usize,
    pub threshold: f32,
    pub hits: Vec<SearchHit>,
}

/// Embeds the query text with the same embedder used for tickets and asks
/// the indexer for the nearest entries.
pub struct SemanticSearch {
    embedder: Arc<dyn Embedder>,
    indexer: Arc<SemanticIndexer>,
    config: SearchConfig,
}

impl SemanticSearch {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        indexer: Arc<SemanticIndexer>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            indexer,
            config,
        }
    }

    pub fn indexer(&self) -> &Arc<SemanticIndexer> {
        &self.indexer
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 || top_k > self.config.max_top_k {
            return Err(SearchError::InvalidTopK {
                value: top_k,
                max: self.config.max_top_k,
            });
        }

        let threshold = request.threshold.unwrap_or(self.config.default_threshold);
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(SearchError::InvalidThreshold(threshold));
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self
            .indexer
            .query_filtered(&embedding, top_k, threshold, &request.filter)
            .await?;

        Ok(SearchResponse {
            query: query.to_string(),
            top_k,
            threshold,
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryVectorStore;
    use crate::testing::KeywordEmbedder;

    fn search() -> SemanticSearch {
        let embedder = Arc::new(KeywordEmbedder::new());
        let indexer = Arc::new(SemanticIndexer::new(
            Arc::new(InMemoryVectorStore::new()),
            embedder.dimension(),
        ));
        SemanticSearch::new(embedder, indexer, SearchConfig::default())
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let search = search();

        assert!(matches!(
            search.search(SearchRequest::new("  ")).await,
            Err(SearchError::EmptyQuery)
        ));
        assert!(matches!(
            search.search(SearchRequest::new("billing").with_top_k(0)).await,
            Err(SearchError::InvalidTopK { .. })
        ));
        assert!(matches!(
            search.search(SearchRequest::new("billing").with_threshold(2.0)).await,
            Err(SearchError::InvalidThreshold(_))
        ));
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let response = search().search(SearchRequest::new("billing problem")).await.unwrap();
        let defaults = SearchConfig::default();
        assert_eq!(response.top_k, defaults.default_top_k);
        assert_eq!(response.threshold, defaults.default_threshold);
        assert!(response.hits.is_empty());
    }

    #[test]
    fn test_request_filter_flattened() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"query": "refund", "urgency": "high", "top_k": 3}"#).unwrap();
        assert_eq!(request.top_k, Some(3));
        assert_eq!(request.filter.urgency, Some(crate::classification::Urgency::High));
    }
}
