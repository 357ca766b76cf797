//! Types for the dispatcher.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Job, JobError, JobStatus};
use crate::pipeline::PipelineError;
use crate::ticket::{Ticket, TicketError};

/// Errors surfaced by dispatcher operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid submission: {0}")]
    Invalid(String),

    #[error("ticket {ticket_id} already has an active job {job_id}")]
    DuplicateSubmission { ticket_id: String, job_id: String },

    #[error("ticket not found: {0}")]
    TicketNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {job_id} is already {status} and cannot be cancelled")]
    NotCancellable { job_id: String, status: JobStatus },

    #[error("dispatcher is not running")]
    NotRunning,

    #[error("invalid pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("job store error: {0}")]
    Job(JobError),

    #[error("ticket store error: {0}")]
    Ticket(TicketError),
}

impl From<JobError> for DispatchError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => DispatchError::JobNotFound(id),
            JobError::DuplicateSubmission { ticket_id, job_id } => {
                DispatchError::DuplicateSubmission { ticket_id, job_id }
            }
            other => DispatchError::Job(other),
        }
    }
}

impl From<TicketError> for DispatchError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::NotFound(id) => DispatchError::TicketNotFound(id),
            TicketError::Invalid(msg) => DispatchError::Invalid(msg),
            other => DispatchError::Ticket(other),
        }
    }
}

/// Result of accepting one ticket submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub ticket: Ticket,
    /// False when the ticket id was already stored and the stored copy was kept.
    pub new_ticket: bool,
    pub job: Job,
}

/// Dispatcher status snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatcherStatus {
    pub running: bool,
    /// Jobs with a live driver, waiting for a slot or executing.
    pub active_jobs: usize,
    pub max_concurrent_jobs: usize,
    pub available_slots: usize,
    pub pending_count: i64,
    pub running_count: i64,
    pub succeeded_count: i64,
    pub failed_count: i64,
    pub cancelled_count: i64,
}
