//! Support ticket classification and semantic indexing.
//!
//! Tickets are persisted at ingestion, turned into jobs and driven through a
//! fixed DAG of steps (sentiment, keywords, summary, embedding, urgency,
//! intent, product area, indexing). Job state is durable; the semantic index
//! answers similarity queries over classified tickets.

pub mod audit;
pub mod classification;
pub mod config;
pub mod dispatcher;
pub mod embedding;
pub mod executor;
pub mod index;
pub mod job;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod steps;
pub mod testing;
pub mod ticket;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, SqliteAuditStore,
};
pub use classification::{
    ClassificationResult, IndexMetadata, Intent, Labeled, ProductArea, Sentiment, Urgency,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use dispatcher::{
    DispatchError, Dispatcher, DispatcherConfig, DispatcherStatus, RetryConfig, SubmissionOutcome,
};
pub use embedding::{build_embedder, Embedder, EmbeddingConfig, EmbeddingError};
pub use executor::{
    ExecutorConfig, StepError, StepExecutor, StepHandler, StepInput, StepOutcome, StepOutput,
    TicketText,
};
pub use index::{
    build_vector_store, IndexFilter, IndexingError, SearchConfig, SearchError, SearchHit,
    SearchRequest, SearchResponse, SemanticIndexer, SemanticSearch, VectorStore,
};
pub use job::{Job, JobError, JobFilter, JobStatus, JobStore, SqliteJobStore, StepRecord, StepStatus};
pub use llm::{build_llm_client, LlmClient, LlmConfig, LlmError, LlmProvider};
pub use pipeline::{PipelineDefinition, StepName};
pub use steps::build_executor;
pub use ticket::{
    sample_submissions, SqliteTicketStore, Ticket, TicketError, TicketFilter, TicketStore,
    TicketSubmission,
};
