//! Semantic index: ticket embeddings stored in an external vector store.

mod config;
mod indexer;
mod memory;
mod qdrant;
mod search;
mod store;
mod types;

pub use config::{build_vector_store, SearchConfig, VectorStoreBackend, VectorStoreConfig};
pub use indexer::SemanticIndexer;
pub use memory::InMemoryVectorStore;
pub use qdrant::{point_id, QdrantVectorStore};
pub use search::{SearchError, SearchRequest, SearchResponse, SemanticSearch};
pub use store::VectorStore;
pub use types::{IndexEntry, IndexFilter, IndexingError, SearchHit};
