//! Embedding generation step.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::executor::{StepError, StepHandler, StepInput, StepOutput};
use crate::metrics;
use crate::pipeline::StepName;

/// Embeds `subject + "\n\n" + text` with the configured embedder.
pub struct EmbeddingStep {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingStep {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl StepHandler for EmbeddingStep {
    fn step(&self) -> StepName {
        StepName::EmbeddingGeneration
    }

    async fn run(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let start = Instant::now();
        let result = self.embedder.embed(&input.ticket.full_text()).await;
        metrics::observe_external_call(
            "embedding",
            self.embedder.name(),
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );

        let vector = result?;
        if vector.len() != self.embedder.dimension() {
            return Err(StepError::rejected(format!(
                "{} returned {} dimensions, expected {}",
                self.embedder.name(),
                vector.len(),
                self.embedder.dimension()
            )));
        }

        Ok(StepOutput::EmbeddingGeneration {
            vector,
            model: self.embedder.name().to_string(),
        })
    }
}
