//! Trailing indexing step: publish the finished classification.

use std::sync::Arc;

use async_trait::async_trait;

use crate::classification::ClassificationResult;
use crate::executor::{StepError, StepHandler, StepInput, StepOutput};
use crate::index::SemanticIndexer;
use crate::pipeline::StepName;

/// Assembles the [`ClassificationResult`] from the seven classification
/// outputs and upserts it with the ticket embedding.
pub struct IndexingStep {
    indexer: Arc<SemanticIndexer>,
}

impl IndexingStep {
    pub fn new(indexer: Arc<SemanticIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl StepHandler for IndexingStep {
    fn step(&self) -> StepName {
        StepName::Indexing
    }

    async fn run(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let ticket_id = &input.ticket.ticket_id;
        let result = ClassificationResult::from_outputs(ticket_id, &input.prerequisites)
            .map_err(|e| StepError::malformed(e.to_string()))?;

        let embedding = match input.prerequisite(StepName::EmbeddingGeneration) {
            Some(StepOutput::EmbeddingGeneration { vector, .. }) => vector.clone(),
            _ => return Err(StepError::malformed("embedding output missing")),
        };
        let dimension = embedding.len();

        self.indexer
            .upsert(ticket_id, embedding, result.index_metadata(&input.ticket))
            .await?;

        Ok(StepOutput::Indexing {
            ticket_id: ticket_id.clone(),
            dimension,
            backend: self.indexer.backend().to_string(),
        })
    }
}
