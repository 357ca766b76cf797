//! Semantic indexer: validated upserts and similarity queries over a
//! [`VectorStore`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::classification::IndexMetadata;
use crate::metrics;

use super::{IndexEntry, IndexFilter, IndexingError, SearchHit, VectorStore};

/// Front door to the vector store.
///
/// Upserts are keyed by ticket id, so indexing the same ticket twice
/// replaces the earlier entry. Query results are always ordered by
/// descending score, at or above the threshold, and at most `top_k` long,
/// whatever the backend returns.
pub struct SemanticIndexer {
    store: Arc<dyn VectorStore>,
    dimension: usize,
}

impl SemanticIndexer {
    pub fn new(store: Arc<dyn VectorStore>, dimension: usize) -> Self {
        Self { store, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn backend(&self) -> &str {
        self.store.backend()
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexingError> {
        if actual != self.dimension {
            return Err(IndexingError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Insert or replace the entry for `ticket_id`.
    pub async fn upsert(
        &self,
        ticket_id: &str,
        embedding: Vec<f32>,
        metadata: IndexMetadata,
    ) -> Result<(), IndexingError> {
        self.check_dimension(embedding.len())?;
        if metadata.ticket_id != ticket_id {
            return Err(IndexingError::Rejected(format!(
                "metadata belongs to {}, not {}",
                metadata.ticket_id, ticket_id
            )));
        }

        self.store
            .upsert(IndexEntry {
                ticket_id: ticket_id.to_string(),
                embedding,
                metadata,
            })
            .await?;

        metrics::INDEX_UPSERTS
            .with_label_values(&[self.store.backend()])
            .inc();
        info!(ticket_id = %ticket_id, backend = self.store.backend(), "Ticket indexed");
        Ok(())
    }

    /// Most similar entries to `embedding`.
    pub async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexingError> {
        self.query_filtered(embedding, top_k, threshold, &IndexFilter::default())
            .await
    }

    /// Like [`query`](Self::query), restricted to entries matching `filter`.
    pub async fn query_filtered(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: f32,
        filter: &IndexFilter,
    ) -> Result<Vec<SearchHit>, IndexingError> {
        self.check_dimension(embedding.len())?;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(IndexingError::InvalidQuery(format!(
                "similarity threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self
            .store
            .query(embedding, top_k, threshold, filter)
            .await?;

        hits.retain(|h| h.score >= threshold && filter.matches(&h.metadata));
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);

        metrics::SEARCH_QUERIES
            .with_label_values(&[self.store.backend()])
            .inc();
        metrics::SEARCH_RESULTS.observe(hits.len() as f64);
        debug!(top_k, threshold, hits = hits.len(), "Similarity query");

        Ok(hits)
    }

    /// Number of indexed tickets.
    pub async fn count(&self) -> Result<u64, IndexingError> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{Intent, ProductArea, Sentiment, Urgency};
    use crate::index::InMemoryVectorStore;
    use chrono::Utc;

    fn metadata(id: &str) -> IndexMetadata {
        IndexMetadata {
            ticket_id: id.to_string(),
            subject: None,
            excerpt: String::new(),
            urgency: Urgency::Medium,
            intent: Intent::HowTo,
            product_area: ProductArea::Dashboard,
            sentiment: Sentiment::Neutral,
            keywords: vec![],
            summary: String::new(),
            confidence: 0.7,
            indexed_at: Utc::now(),
        }
    }

    fn indexer() -> SemanticIndexer {
        SemanticIndexer::new(Arc::new(InMemoryVectorStore::new()), 3)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let indexer = indexer();
        indexer.upsert("t-1", vec![1.0, 0.0, 0.0], metadata("t-1")).await.unwrap();
        indexer.upsert("t-1", vec![1.0, 0.0, 0.0], metadata("t-1")).await.unwrap();
        indexer.upsert("t-1", vec![0.0, 1.0, 0.0], metadata("t-1")).await.unwrap();

        assert_eq!(indexer.count().await.unwrap(), 1);
        let hits = indexer.query(&[0.0, 1.0, 0.0], 5, 0.9).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ticket_id, "t-1");
    }

    #[tokio::test]
    async fn test_dimension_validated() {
        let indexer = indexer();
        let err = indexer
            .upsert("t-1", vec![1.0, 0.0], metadata("t-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        assert!(indexer.query(&[1.0], 5, 0.0).await.is_err());
    }

    #[tokio::test]
    async fn test_metadata_must_match_ticket() {
        let err = indexer()
            .upsert("t-1", vec![1.0, 0.0, 0.0], metadata("t-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexingError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_query_contract() {
        let indexer = indexer();
        indexer.upsert("a", vec![1.0, 0.0, 0.0], metadata("a")).await.unwrap();
        indexer.upsert("b", vec![0.7, 0.7, 0.0], metadata("b")).await.unwrap();
        indexer.upsert("c", vec![0.0, 0.0, 1.0], metadata("c")).await.unwrap();

        let hits = indexer.query(&[1.0, 0.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| h.score >= 0.5));

        let hits = indexer.query(&[1.0, 0.0, 0.0], 1, -1.0).await.unwrap();
        assert_eq!(hits.len(), 1);

        assert!(indexer.query(&[1.0, 0.0, 0.0], 0, 0.0).await.unwrap().is_empty());
        assert!(indexer.query(&[1.0, 0.0, 0.0], 5, 1.5).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let hits = indexer().query(&[1.0, 0.0, 0.0], 5, 0.0).await.unwrap();
        assert!(hits.is_empty());
    }
}
