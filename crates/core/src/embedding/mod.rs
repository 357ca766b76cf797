//! Text embedding for semantic indexing and search.
//!
//! [`Embedder`] turns text into a fixed-dimension vector. Two
//! implementations ship: [`OpenAiEmbedder`] for OpenAI-compatible
//! `/embeddings` endpoints and [`HashEmbedder`], a deterministic local
//! SimHash embedder that needs no network.

mod config;
mod hash;
mod openai;

pub use config::{build_embedder, EmbeddingConfig, EmbeddingProvider};
pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

use async_trait::async_trait;

use crate::executor::{StepError, TerminalStepError, TransientStepError};

/// Errors that can occur during embedding generation.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// The input text could not be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The provider returned a vector of the wrong size.
    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An internal error occurred in the embedder.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EmbeddingError> for StepError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::InvalidInput(msg) => TerminalStepError::MalformedInput(msg).into(),
            EmbeddingError::Http(msg) => TransientStepError::Network(msg).into(),
            EmbeddingError::Api { status: 429, message } => {
                TransientStepError::RateLimited(message).into()
            }
            EmbeddingError::Api { status, message } if status >= 500 || status == 408 => {
                TransientStepError::Unavailable(format!("{}: {}", status, message)).into()
            }
            EmbeddingError::Api { status, message } => {
                TerminalStepError::Rejected(format!("{}: {}", status, message)).into()
            }
            e @ EmbeddingError::DimensionMismatch { .. } => {
                TerminalStepError::Rejected(e.to_string()).into()
            }
            EmbeddingError::Internal(msg) => TransientStepError::Unavailable(msg).into(),
        }
    }
}

/// Trait for generating vector embeddings from text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate a vector embedding for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Batch embed multiple texts.
    ///
    /// Default implementation calls [`embed`](Embedder::embed) for each text sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimensionality of embeddings produced by this embedder.
    fn dimension(&self) -> usize;

    /// Model identifier recorded next to each vector.
    fn name(&self) -> &str;
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
