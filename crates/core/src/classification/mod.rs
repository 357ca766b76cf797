//! Label vocabularies and the assembled classification result.

mod labels;
mod result;

pub use labels::{Intent, Labeled, ProductArea, Sentiment, UnknownLabel, Urgency};
pub use result::{ClassificationResult, IndexMetadata, MissingOutput, SentimentScore};
