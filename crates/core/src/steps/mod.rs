//! Concrete handlers for every pipeline step.

mod embedding;
mod indexing;
mod keywords;
mod llm_step;
mod prompts;

pub use embedding::EmbeddingStep;
pub use indexing::IndexingStep;
pub use keywords::{extract_keywords, KeywordStep};
pub use llm_step::LlmStep;

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::executor::{ExecutorConfig, StepExecutor};
use crate::index::SemanticIndexer;
use crate::llm::{LlmClient, LlmConfig};

/// An executor with a handler registered for every step of the
/// classify-ticket pipeline.
pub fn build_executor(
    config: &ExecutorConfig,
    llm: Arc<dyn LlmClient>,
    llm_config: &LlmConfig,
    embedder: Arc<dyn Embedder>,
    indexer: Arc<SemanticIndexer>,
) -> StepExecutor {
    let mut executor = StepExecutor::new(config);
    for step in LlmStep::all(llm, llm_config) {
        executor.register(Arc::new(step));
    }
    executor
        .with_handler(Arc::new(KeywordStep::new(config.max_keywords)))
        .with_handler(Arc::new(EmbeddingStep::new(embedder)))
        .with_handler(Arc::new(IndexingStep::new(indexer)))
}
