//! Step failure taxonomy.
//!
//! Every failure a step can report is either transient (worth retrying) or
//! terminal (will fail the same way again). The executor classifies, the
//! dispatcher's retry policy decides what to do about it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures expected to go away on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransientStepError {
    #[error("attempt timed out after {0}ms")]
    Timeout(u64),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("attempt interrupted before it settled")]
    Interrupted,
}

/// Failures that will repeat no matter how often the step is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TerminalStepError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// A classified step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "class", content = "error", rename_all = "snake_case")]
pub enum StepError {
    #[error(transparent)]
    Transient(#[from] TransientStepError),

    #[error(transparent)]
    Terminal(#[from] TerminalStepError),
}

impl StepError {
    pub fn timeout(ms: u64) -> Self {
        TransientStepError::Timeout(ms).into()
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        TransientStepError::Unavailable(msg.into()).into()
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        TerminalStepError::MalformedInput(msg.into()).into()
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        TerminalStepError::Rejected(msg.into()).into()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }

    /// Short machine readable kind, stored next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Transient(e) => match e {
                TransientStepError::Timeout(_) => "timeout",
                TransientStepError::RateLimited(_) => "rate_limited",
                TransientStepError::Network(_) => "network",
                TransientStepError::Unavailable(_) => "unavailable",
                TransientStepError::Interrupted => "interrupted",
            },
            StepError::Terminal(e) => match e {
                TerminalStepError::MalformedInput(_) => "malformed_input",
                TerminalStepError::Rejected(_) => "rejected",
                TerminalStepError::UnsupportedLanguage(_) => "unsupported_language",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StepError::timeout(100).is_retryable());
        assert!(StepError::from(TransientStepError::Interrupted).is_retryable());
        assert!(!StepError::malformed("empty").is_retryable());
        assert!(!StepError::from(TerminalStepError::UnsupportedLanguage("fr".into())).is_retryable());
    }

    #[test]
    fn test_kind_and_display() {
        let err = StepError::timeout(250);
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.to_string(), "attempt timed out after 250ms");

        let err = StepError::rejected("policy");
        assert_eq!(err.kind(), "rejected");
        assert_eq!(err.to_string(), "rejected: policy");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(StepError::malformed("no text")).unwrap();
        assert_eq!(json["class"], "terminal");
        assert_eq!(json["error"]["kind"], "malformed_input");
        assert_eq!(json["error"]["detail"], "no text");
    }
}
