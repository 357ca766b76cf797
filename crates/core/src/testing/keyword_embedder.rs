//! Topic-count embedder for search tests.

use async_trait::async_trait;

use crate::embedding::{Embedder, EmbeddingError};

/// One dimension per topic; the last dimension is a constant bias so that
/// no text embeds to the zero vector.
const TOPICS: &[&[&str]] = &[
    &["billing", "bill", "invoice", "charge", "charged", "refund", "payment", "price", "pricing"],
    &["login", "password", "account", "sign", "signin", "locked", "auth"],
    &["crash", "error", "bug", "broken", "exception", "fails"],
    &["slow", "latency", "timeout", "performance", "lag"],
    &["api", "webhook", "integration", "endpoint", "token"],
    &["dashboard", "report", "chart", "analytics", "export"],
    &["feature", "request", "wish", "suggestion", "add"],
];

/// Deterministic embedder that maps text to topic word counts.
///
/// Texts about the same topic score a high cosine similarity regardless of
/// wording, which the hash embedder cannot promise.
#[derive(Debug, Clone, Default)]
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; TOPICS.len() + 1];
        vector[TOPICS.len()] = 0.1;

        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let stem = match word.strip_suffix('s') {
                Some(stem) if stem.len() > 2 => stem,
                _ => word,
            };
            for (i, topic) in TOPICS.iter().enumerate() {
                if topic.contains(&word) || topic.contains(&stem) {
                    vector[i] += 1.0;
                }
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        vector.iter().map(|x| x / norm).collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::vectorize(text))
    }

    fn dimension(&self) -> usize {
        TOPICS.len() + 1
    }

    fn name(&self) -> &str {
        "keyword-topics"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[tokio::test]
    async fn test_same_topic_scores_high() {
        let embedder = KeywordEmbedder::new();
        let ticket = embedder
            .embed("Wrong invoice charge\n\nMy invoice charge is wrong and I need this fixed today")
            .await
            .unwrap();
        let query = embedder.embed("billing problem").await.unwrap();
        let other = embedder.embed("the app crashes with an error").await.unwrap();

        assert_eq!(ticket.len(), embedder.dimension());
        assert!(cosine_similarity(&ticket, &query) > 0.9);
        assert!(cosine_similarity(&ticket, &other) < 0.2);
    }
}
