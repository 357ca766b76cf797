//! Inputs and outputs of a single step attempt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classification::{Intent, Labeled, ProductArea, Sentiment, Urgency};
use crate::pipeline::StepName;

use super::StepError;

/// The slice of a ticket every step is allowed to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketText {
    pub ticket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub text: String,
    pub language: String,
}

impl TicketText {
    /// Subject and body joined the way they are embedded and prompted.
    pub fn full_text(&self) -> String {
        match self.subject.as_deref().map(str::trim) {
            Some(subject) if !subject.is_empty() => format!("{}\n\n{}", subject, self.text),
            _ => self.text.clone(),
        }
    }
}

/// Everything a step attempt reads: the ticket plus the outputs of its
/// declared prerequisites, taken from durably succeeded records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub ticket: TicketText,
    #[serde(default)]
    pub prerequisites: BTreeMap<StepName, StepOutput>,
}

impl StepInput {
    pub fn new(ticket: TicketText) -> Self {
        Self {
            ticket,
            prerequisites: BTreeMap::new(),
        }
    }

    pub fn with_prerequisite(mut self, output: StepOutput) -> Self {
        self.prerequisites.insert(output.step(), output);
        self
    }

    pub fn prerequisite(&self, step: StepName) -> Option<&StepOutput> {
        self.prerequisites.get(&step)
    }

    /// Summary text, if summarization is a prerequisite.
    pub fn summary(&self) -> Option<&str> {
        match self.prerequisite(StepName::Summarization) {
            Some(StepOutput::Summarization { text }) => Some(text),
            _ => None,
        }
    }

    /// Sentiment label and score, if sentiment analysis is a prerequisite.
    pub fn sentiment(&self) -> Option<(Sentiment, f32)> {
        match self.prerequisite(StepName::SentimentAnalysis) {
            Some(StepOutput::SentimentAnalysis { label, score }) => Some((*label, *score)),
            _ => None,
        }
    }
}

/// Typed payload of a succeeded step, tagged by step name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutput {
    SentimentAnalysis {
        label: Sentiment,
        /// -1.0 (very negative) to 1.0 (very positive).
        score: f32,
    },
    KeywordExtraction {
        keywords: Vec<String>,
    },
    UrgencyClassification(Labeled<Urgency>),
    IntentClassification(Labeled<Intent>),
    ProductAreaClassification(Labeled<ProductArea>),
    Summarization {
        text: String,
    },
    EmbeddingGeneration {
        vector: Vec<f32>,
        model: String,
    },
    Indexing {
        ticket_id: String,
        dimension: usize,
        /// Vector store backend the entry was written to.
        backend: String,
    },
}

impl StepOutput {
    /// The step this payload belongs to.
    pub fn step(&self) -> StepName {
        match self {
            StepOutput::SentimentAnalysis { .. } => StepName::SentimentAnalysis,
            StepOutput::KeywordExtraction { .. } => StepName::KeywordExtraction,
            StepOutput::UrgencyClassification(_) => StepName::UrgencyClassification,
            StepOutput::IntentClassification(_) => StepName::IntentClassification,
            StepOutput::ProductAreaClassification(_) => StepName::ProductAreaClassification,
            StepOutput::Summarization { .. } => StepName::Summarization,
            StepOutput::EmbeddingGeneration { .. } => StepName::EmbeddingGeneration,
            StepOutput::Indexing { .. } => StepName::Indexing,
        }
    }
}

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded(StepOutput),
    Failed(StepError),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Succeeded(_) => "succeeded",
            StepOutcome::Failed(e) if e.is_retryable() => "failed_retryable",
            StepOutcome::Failed(_) => "failed_terminal",
        }
    }
}

impl From<Result<StepOutput, StepError>> for StepOutcome {
    fn from(result: Result<StepOutput, StepError>) -> Self {
        match result {
            Ok(output) => StepOutcome::Succeeded(output),
            Err(e) => StepOutcome::Failed(e),
        }
    }
}
