//! Step identifiers for the classification pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of one unit of pipeline work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    SentimentAnalysis,
    KeywordExtraction,
    UrgencyClassification,
    IntentClassification,
    ProductAreaClassification,
    Summarization,
    EmbeddingGeneration,
    Indexing,
}

impl StepName {
    /// Every step, in declaration order.
    pub const ALL: [StepName; 8] = [
        StepName::SentimentAnalysis,
        StepName::KeywordExtraction,
        StepName::UrgencyClassification,
        StepName::IntentClassification,
        StepName::ProductAreaClassification,
        StepName::Summarization,
        StepName::EmbeddingGeneration,
        StepName::Indexing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::SentimentAnalysis => "sentiment_analysis",
            StepName::KeywordExtraction => "keyword_extraction",
            StepName::UrgencyClassification => "urgency_classification",
            StepName::IntentClassification => "intent_classification",
            StepName::ProductAreaClassification => "product_area_classification",
            StepName::Summarization => "summarization",
            StepName::EmbeddingGeneration => "embedding_generation",
            StepName::Indexing => "indexing",
        }
    }

    /// Whether this step calls the language model.
    pub fn uses_llm(&self) -> bool {
        matches!(
            self,
            StepName::SentimentAnalysis
                | StepName::UrgencyClassification
                | StepName::IntentClassification
                | StepName::ProductAreaClassification
                | StepName::Summarization
        )
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown step name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step: {0}")]
pub struct UnknownStep(pub String);

impl FromStr for StepName {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepName::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_display() {
        for step in StepName::ALL {
            assert_eq!(step.to_string().parse::<StepName>().unwrap(), step);
        }
    }

    #[test]
    fn test_parse_unknown() {
        let err = "translation".parse::<StepName>().unwrap_err();
        assert_eq!(err, UnknownStep("translation".to_string()));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&StepName::ProductAreaClassification).unwrap();
        assert_eq!(json, "\"product_area_classification\"");
    }

    #[test]
    fn test_uses_llm() {
        assert!(StepName::Summarization.uses_llm());
        assert!(!StepName::KeywordExtraction.uses_llm());
        assert!(!StepName::EmbeddingGeneration.uses_llm());
        assert!(!StepName::Indexing.uses_llm());
    }
}
