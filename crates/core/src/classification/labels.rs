//! Closed label vocabularies produced by the classifier steps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a label string is not part of a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {vocabulary} label: {value}")]
pub struct UnknownLabel {
    pub vocabulary: &'static str,
    pub value: String,
}

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for a label enum.
macro_rules! label_enum {
    ($name:ident, $vocab:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Comma separated vocabulary, for prompts.
            pub fn vocabulary() -> String {
                Self::ALL
                    .iter()
                    .map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
                Self::ALL
                    .iter()
                    .copied()
                    .find(|l| l.as_str() == normalized)
                    .ok_or_else(|| UnknownLabel {
                        vocabulary: $vocab,
                        value: s.to_string(),
                    })
            }
        }
    };
}

/// How quickly a ticket needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

label_enum!(Urgency, "urgency", {
    Critical => "critical",
    High => "high",
    Medium => "medium",
    Low => "low",
});

/// What the customer is trying to achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BugReport,
    FeatureRequest,
    AccountIssue,
    BillingInquiry,
    BillingDispute,
    HowTo,
    Integration,
    Performance,
    Security,
}

label_enum!(Intent, "intent", {
    BugReport => "bug_report",
    FeatureRequest => "feature_request",
    AccountIssue => "account_issue",
    BillingInquiry => "billing_inquiry",
    BillingDispute => "billing_dispute",
    HowTo => "how_to",
    Integration => "integration",
    Performance => "performance",
    Security => "security",
});

/// Part of the product the ticket is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductArea {
    Api,
    Dashboard,
    MobileApp,
    Integrations,
    Billing,
    Authentication,
    Analytics,
    General,
}

label_enum!(ProductArea, "product area", {
    Api => "api",
    Dashboard => "dashboard",
    MobileApp => "mobile_app",
    Integrations => "integrations",
    Billing => "billing",
    Authentication => "authentication",
    Analytics => "analytics",
    General => "general",
});

/// Overall tone of the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

label_enum!(Sentiment, "sentiment", {
    Positive => "positive",
    Neutral => "neutral",
    Negative => "negative",
});

/// A label with the model's confidence and a short justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labeled<T> {
    pub label: T,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

impl<T> Labeled<T> {
    /// Confidence is clamped into `[0, 1]`.
    pub fn new(label: T, confidence: f32, reasoning: impl Into<String>) -> Self {
        Self {
            label,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            reasoning: reasoning.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_spacing_and_case() {
        assert_eq!("Billing Dispute".parse::<Intent>().unwrap(), Intent::BillingDispute);
        assert_eq!("mobile-app".parse::<ProductArea>().unwrap(), ProductArea::MobileApp);
        assert_eq!(" HIGH ".parse::<Urgency>().unwrap(), Urgency::High);
    }

    #[test]
    fn test_parse_unknown_label() {
        let err = "urgent".parse::<Urgency>().unwrap_err();
        assert_eq!(err.vocabulary, "urgency");
        assert_eq!(err.value, "urgent");
    }

    #[test]
    fn test_vocabulary_lists_every_label() {
        let vocab = Intent::vocabulary();
        for intent in Intent::ALL {
            assert!(vocab.contains(intent.as_str()));
        }
    }

    #[test]
    fn test_labeled_clamps_confidence() {
        assert_eq!(Labeled::new(Urgency::Low, 1.7, "").confidence, 1.0);
        assert_eq!(Labeled::new(Urgency::Low, -0.2, "").confidence, 0.0);
        assert_eq!(Labeled::new(Urgency::Low, f32::NAN, "").confidence, 0.0);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Labeled::new(ProductArea::MobileApp, 0.5, "app")).unwrap();
        assert!(json.contains("\"label\":\"mobile_app\""));
    }
}
