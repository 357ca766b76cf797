//! Vector store and search configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{InMemoryVectorStore, QdrantVectorStore, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    #[default]
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorStoreBackend,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "support_tickets".to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::default(),
            url: default_url(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == VectorStoreBackend::Qdrant {
            if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
                return Err(format!("vector_store.url must be an http(s) URL, got {}", self.url));
            }
            if self.collection.trim().is_empty() {
                return Err("vector_store.collection must not be empty".to_string());
            }
        }
        Ok(())
    }
}

/// Build the configured vector store for vectors of `dimension`.
pub fn build_vector_store(config: &VectorStoreConfig, dimension: usize) -> Arc<dyn VectorStore> {
    match config.backend {
        VectorStoreBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        VectorStoreBackend::Qdrant => {
            let mut store =
                QdrantVectorStore::new(config.url.clone(), config.collection.clone(), dimension);
            if let Some(ref api_key) = config.api_key {
                store = store.with_api_key(api_key.clone());
            }
            Arc::new(store)
        }
    }
}

/// Defaults and bounds for semantic search requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.3
}

fn default_max_top_k() -> usize {
    50
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            default_threshold: default_threshold(),
            max_top_k: default_max_top_k(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_top_k == 0 {
            return Err("search.max_top_k must be greater than 0".to_string());
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(format!(
                "search.default_top_k must be between 1 and {}",
                self.max_top_k
            ));
        }
        if !(-1.0..=1.0).contains(&self.default_threshold) {
            return Err("search.default_threshold must be between -1.0 and 1.0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: VectorStoreConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend, VectorStoreBackend::Memory);
        assert_eq!(config.collection, "support_tickets");
        assert_eq!(build_vector_store(&config, 8).backend(), "memory");

        let config: VectorStoreConfig = toml::from_str("backend = \"qdrant\"").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(build_vector_store(&config, 8).backend(), "qdrant");
    }

    #[test]
    fn test_search_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        let bad = SearchConfig {
            default_top_k: 100,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
