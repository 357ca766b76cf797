use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::dispatcher::DispatcherConfig;
use crate::embedding::{EmbeddingConfig, EmbeddingProvider};
use crate::executor::ExecutorConfig;
use crate::index::{SearchConfig, VectorStoreBackend, VectorStoreConfig};
use crate::llm::{LlmConfig, LlmProvider};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration. Tickets, jobs and the audit trail share one file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("triage.db")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: SanitizedLlmConfig,
    pub embedding: SanitizedEmbeddingConfig,
    pub vector_store: SanitizedVectorStoreConfig,
    pub executor: ExecutorConfig,
    pub dispatcher: DispatcherConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub timeout_secs: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedVectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub url: String,
    pub collection: String,
    pub api_key_configured: bool,
}

fn configured(key: &Option<String>) -> bool {
    key.as_deref().is_some_and(|k| !k.is_empty())
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            llm: SanitizedLlmConfig {
                provider: config.llm.provider,
                model: config.llm.model.clone(),
                api_key_configured: configured(&config.llm.api_key),
                api_base: config.llm.api_base.clone(),
                timeout_secs: config.llm.timeout_secs,
                max_tokens: config.llm.max_tokens,
                temperature: config.llm.temperature,
            },
            embedding: SanitizedEmbeddingConfig {
                provider: config.embedding.provider,
                model: config.embedding.model.clone(),
                dimension: config.embedding.dimension,
                api_key_configured: configured(&config.embedding.api_key),
                api_base: config.embedding.api_base.clone(),
            },
            vector_store: SanitizedVectorStoreConfig {
                backend: config.vector_store.backend,
                url: config.vector_store.url.clone(),
                collection: config.vector_store.collection.clone(),
                api_key_configured: configured(&config.vector_store.api_key),
            },
            executor: config.executor.clone(),
            dispatcher: config.dispatcher.clone(),
            search: config.search.clone(),
        }
    }
}
