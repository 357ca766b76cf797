//! In-process vector store with brute-force cosine search.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;

use super::{IndexEntry, IndexFilter, IndexingError, SearchHit, VectorStore};

/// Vector store backed by a `HashMap` keyed by ticket id.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entry for a ticket.
    pub async fn get(&self, ticket_id: &str) -> Option<IndexEntry> {
        self.entries.read().await.get(ticket_id).cloned()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexingError> {
        self.entries
            .write()
            .await
            .insert(entry.ticket_id.clone(), entry);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
        filter: &IndexFilter,
    ) -> Result<Vec<SearchHit>, IndexingError> {
        let entries = self.entries.read().await;

        let mut hits: Vec<SearchHit> = entries
            .values()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| SearchHit {
                ticket_id: e.ticket_id.clone(),
                score: cosine_similarity(vector, &e.embedding),
                metadata: e.metadata.clone(),
            })
            .filter(|h| h.score >= threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.ticket_id.cmp(&b.ticket_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64, IndexingError> {
        Ok(self.entries.read().await.len() as u64)
    }
}
