//! Testing utilities and mock implementations.
//!
//! Mocks for the external services a pipeline talks to, plus fixtures for
//! the invoice ticket most tests use.
//!
//! # Example
//!
//! ```rust,ignore
//! use triage_core::testing::{fixtures, KeywordEmbedder, MockLlmClient, ScriptedStep};
//!
//! let llm = Arc::new(MockLlmClient::new());
//! let keywords = ScriptedStep::failing(StepName::KeywordExtraction, StepError::malformed("empty"));
//! let outcome = dispatcher.submit(fixtures::submission("t-1")).await?;
//! let job = testing::wait_for_terminal(&dispatcher, &outcome.job.id).await;
//! ```

mod keyword_embedder;
mod mock_llm;
mod scripted_step;

pub use keyword_embedder::KeywordEmbedder;
pub use mock_llm::MockLlmClient;
pub use scripted_step::ScriptedStep;

use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::job::Job;

/// How long the wait helpers poll before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll a job until `predicate` holds. Panics after [`WAIT_TIMEOUT`].
pub async fn wait_for_job(
    dispatcher: &Dispatcher,
    job_id: &str,
    predicate: impl Fn(&Job) -> bool,
) -> Job {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        let job = dispatcher
            .job_status(job_id)
            .unwrap_or_else(|e| panic!("job {} unreadable: {}", job_id, e));
        if predicate(&job) {
            return job;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting on job {}: {:?}", job_id, job.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll a job until it is terminal.
pub async fn wait_for_terminal(dispatcher: &Dispatcher, job_id: &str) -> Job {
    wait_for_job(dispatcher, job_id, Job::is_terminal).await
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::classification::{Intent, Labeled, ProductArea, Sentiment, Urgency};
    use crate::executor::StepOutput;
    use crate::job::{Job, JobStatus, StepAttempt, StepRecord, StepStatus};
    use crate::pipeline::{PipelineDefinition, StepName};
    use crate::ticket::TicketSubmission;

    pub const INVOICE_SUBJECT: &str = "Wrong invoice charge";
    pub const INVOICE_TEXT: &str = "My invoice charge is wrong and I need this fixed today";

    /// The invoice ticket under the given id.
    pub fn submission(id: &str) -> TicketSubmission {
        TicketSubmission::new(id, INVOICE_TEXT).with_subject(INVOICE_SUBJECT)
    }

    /// A plausible succeeded output for `step`, describing the invoice ticket.
    pub fn output_for(step: StepName) -> StepOutput {
        match step {
            StepName::SentimentAnalysis => StepOutput::SentimentAnalysis {
                label: Sentiment::Negative,
                score: -0.7,
            },
            StepName::KeywordExtraction => StepOutput::KeywordExtraction {
                keywords: vec![
                    "invoice".to_string(),
                    "charge".to_string(),
                    "wrong".to_string(),
                ],
            },
            StepName::UrgencyClassification => StepOutput::UrgencyClassification(Labeled::new(
                Urgency::High,
                0.9,
                "customer needs a fix today",
            )),
            StepName::IntentClassification => StepOutput::IntentClassification(Labeled::new(
                Intent::BillingDispute,
                0.88,
                "disputes an invoice charge",
            )),
            StepName::ProductAreaClassification => StepOutput::ProductAreaClassification(
                Labeled::new(ProductArea::Billing, 0.92, "invoice and charges"),
            ),
            StepName::Summarization => StepOutput::Summarization {
                text: "Customer reports a wrong invoice charge and needs it fixed today."
                    .to_string(),
            },
            StepName::EmbeddingGeneration => StepOutput::EmbeddingGeneration {
                vector: vec![0.6, 0.8, 0.0, 0.0],
                model: "fixture".to_string(),
            },
            StepName::Indexing => StepOutput::Indexing {
                ticket_id: "t-1".to_string(),
                dimension: 4,
                backend: "memory".to_string(),
            },
        }
    }

    /// A running job whose steps have the given statuses; every other step
    /// of `pipeline` is not started. Settled steps carry one attempt.
    pub fn job_with_statuses(
        pipeline: &PipelineDefinition,
        statuses: &[(StepName, StepStatus)],
    ) -> Job {
        let now = Utc::now();
        let steps = pipeline
            .steps()
            .into_iter()
            .map(|step| {
                let status = statuses
                    .iter()
                    .find(|(s, _)| *s == step)
                    .map(|(_, status)| *status)
                    .unwrap_or(StepStatus::NotStarted);
                let history = match status {
                    StepStatus::NotStarted => Vec::new(),
                    status => vec![StepAttempt {
                        attempt: 1,
                        status,
                        error: matches!(
                            status,
                            StepStatus::FailedRetryable | StepStatus::FailedTerminal
                        )
                        .then(|| "scripted failure".to_string()),
                        error_kind: None,
                        output: (status == StepStatus::Succeeded).then(|| output_for(step)),
                        started_at: now,
                        finished_at: (status != StepStatus::InProgress).then_some(now),
                    }],
                };
                StepRecord::from_history(step, history)
            })
            .collect();

        Job {
            id: Uuid::new_v4().to_string(),
            ticket_id: "t-1".to_string(),
            status: JobStatus::Running,
            created_at: now,
            updated_at: now,
            steps,
            cancel_requested: false,
            error: None,
        }
    }
}
