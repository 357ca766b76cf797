//! The assembled classification of a ticket and the metadata indexed with it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::{StepOutput, TicketText};
use crate::job::{Job, JobStatus};
use crate::pipeline::StepName;

use super::{Intent, Labeled, ProductArea, Sentiment, Urgency};

const EXCERPT_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ticket {ticket_id} has no {step} output")]
pub struct MissingOutput {
    pub ticket_id: String,
    pub step: StepName,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: Sentiment,
    pub score: f32,
}

/// Everything the pipeline learned about one ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub ticket_id: String,
    pub urgency: Labeled<Urgency>,
    pub intent: Labeled<Intent>,
    pub product_area: Labeled<ProductArea>,
    pub sentiment: SentimentScore,
    pub keywords: Vec<String>,
    pub summary: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    /// Mean of the urgency, intent and product area confidences.
    pub confidence: f32,
}

impl ClassificationResult {
    /// Assemble from the outputs of succeeded steps. Every classification
    /// step must be present; indexing is not required.
    pub fn from_outputs(
        ticket_id: &str,
        outputs: &BTreeMap<StepName, StepOutput>,
    ) -> Result<Self, MissingOutput> {
        let missing = |step| MissingOutput {
            ticket_id: ticket_id.to_string(),
            step,
        };

        let sentiment = match outputs.get(&StepName::SentimentAnalysis) {
            Some(StepOutput::SentimentAnalysis { label, score }) => SentimentScore {
                label: *label,
                score: *score,
            },
            _ => return Err(missing(StepName::SentimentAnalysis)),
        };
        let keywords = match outputs.get(&StepName::KeywordExtraction) {
            Some(StepOutput::KeywordExtraction { keywords }) => keywords.clone(),
            _ => return Err(missing(StepName::KeywordExtraction)),
        };
        let summary = match outputs.get(&StepName::Summarization) {
            Some(StepOutput::Summarization { text }) => text.clone(),
            _ => return Err(missing(StepName::Summarization)),
        };
        let (embedding_model, embedding_dimension) =
            match outputs.get(&StepName::EmbeddingGeneration) {
                Some(StepOutput::EmbeddingGeneration { vector, model }) => {
                    (model.clone(), vector.len())
                }
                _ => return Err(missing(StepName::EmbeddingGeneration)),
            };
        let urgency = match outputs.get(&StepName::UrgencyClassification) {
            Some(StepOutput::UrgencyClassification(l)) => l.clone(),
            _ => return Err(missing(StepName::UrgencyClassification)),
        };
        let intent = match outputs.get(&StepName::IntentClassification) {
            Some(StepOutput::IntentClassification(l)) => l.clone(),
            _ => return Err(missing(StepName::IntentClassification)),
        };
        let product_area = match outputs.get(&StepName::ProductAreaClassification) {
            Some(StepOutput::ProductAreaClassification(l)) => l.clone(),
            _ => return Err(missing(StepName::ProductAreaClassification)),
        };

        let confidence = (urgency.confidence + intent.confidence + product_area.confidence) / 3.0;

        Ok(Self {
            ticket_id: ticket_id.to_string(),
            urgency,
            intent,
            product_area,
            sentiment,
            keywords,
            summary,
            embedding_model,
            embedding_dimension,
            confidence,
        })
    }

    /// The result of a succeeded job. `None` for any other status.
    pub fn from_job(job: &Job) -> Option<Self> {
        if job.status != JobStatus::Succeeded {
            return None;
        }
        Self::from_outputs(&job.ticket_id, &job.outputs()).ok()
    }

    /// Metadata stored next to the ticket's embedding.
    pub fn index_metadata(&self, ticket: &TicketText) -> IndexMetadata {
        IndexMetadata {
            ticket_id: self.ticket_id.clone(),
            subject: ticket.subject.clone(),
            excerpt: excerpt(&ticket.text, EXCERPT_CHARS),
            urgency: self.urgency.label,
            intent: self.intent.label,
            product_area: self.product_area.label,
            sentiment: self.sentiment.label,
            keywords: self.keywords.clone(),
            summary: self.summary.clone(),
            confidence: self.confidence,
            indexed_at: Utc::now(),
        }
    }
}

/// Payload stored with each vector and returned by similarity queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub ticket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub excerpt: String,
    pub urgency: Urgency,
    pub intent: Intent,
    pub product_area: ProductArea,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub summary: String,
    pub confidence: f32,
    pub indexed_at: DateTime<Utc>,
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}
