//! Index entries, hits, filters and errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classification::{IndexMetadata, Intent, ProductArea, Urgency};
use crate::executor::{StepError, TerminalStepError, TransientStepError};

/// One ticket's vector plus its metadata, keyed by ticket id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub ticket_id: String,
    pub embedding: Vec<f32>,
    pub metadata: IndexMetadata,
}

/// A ranked similarity match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub ticket_id: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
    pub metadata: IndexMetadata,
}

/// Restricts a query to entries whose labels match. Unset fields match
/// anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_area: Option<ProductArea>,
}

impl IndexFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_product_area(mut self, product_area: ProductArea) -> Self {
        self.product_area = Some(product_area);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.urgency.is_none() && self.intent.is_none() && self.product_area.is_none()
    }

    pub fn matches(&self, metadata: &IndexMetadata) -> bool {
        self.urgency.map_or(true, |u| u == metadata.urgency)
            && self.intent.map_or(true, |i| i == metadata.intent)
            && self.product_area.map_or(true, |p| p == metadata.product_area)
    }
}

/// Failures writing to or reading from the vector store.
#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The store could not be reached or answered with a server error.
    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request.
    #[error("vector store rejected request: {0}")]
    Rejected(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl From<IndexingError> for StepError {
    fn from(e: IndexingError) -> Self {
        match e {
            IndexingError::Unavailable(msg) => TransientStepError::Unavailable(msg).into(),
            other => TerminalStepError::Rejected(other.to_string()).into(),
        }
    }
}
