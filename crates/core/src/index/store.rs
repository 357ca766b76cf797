//! Vector store abstraction.

use async_trait::async_trait;

use super::{IndexEntry, IndexFilter, IndexingError, SearchHit};

/// An external keyed-similarity service.
///
/// Implementations must treat `upsert` as insert-or-replace keyed by
/// `entry.ticket_id`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logs and metrics (e.g. "memory", "qdrant").
    fn backend(&self) -> &str;

    /// Insert or replace the entry for a ticket.
    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexingError>;

    /// Entries most similar to `vector`, best first, with score at or above
    /// `threshold`, at most `top_k` of them.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
        filter: &IndexFilter,
    ) -> Result<Vec<SearchHit>, IndexingError>;

    /// Number of indexed tickets.
    async fn count(&self) -> Result<u64, IndexingError>;
}
