//! Embedding configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Embedder, EmbeddingError, HashEmbedder, OpenAiEmbedder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local SimHash embedder.
    #[default]
    Hash,
    /// OpenAI-compatible embeddings API.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_timeout() -> u32 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_model(),
            dimension: default_dimension(),
            api_key: None,
            api_base: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.dimension == 0 {
            return Err("embedding.dimension must be greater than 0".to_string());
        }
        if self.provider == EmbeddingProvider::OpenAi
            && self.api_key.is_none()
            && self.api_base.is_none()
        {
            return Err("embedding provider openai requires api_key or api_base".to_string());
        }
        Ok(())
    }
}

/// Build the configured embedder.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    config.validate().map_err(EmbeddingError::InvalidInput)?;

    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(config.dimension)),
        EmbeddingProvider::OpenAi => {
            let mut embedder = OpenAiEmbedder::new(
                config.api_key.clone().unwrap_or_default(),
                config.model.clone(),
                config.dimension,
            )
            .with_timeout(Duration::from_secs(config.timeout_secs as u64));
            if let Some(ref api_base) = config.api_base {
                embedder = embedder.with_api_base(api_base.clone());
            }
            Arc::new(embedder)
        }
    };

    info!(
        embedder = embedder.name(),
        dimension = embedder.dimension(),
        "Embedder configured"
    );
    Ok(embedder)
}
