//! Job storage trait and types.

use thiserror::Error;

use crate::pipeline::StepName;

use super::{AttemptSettlement, Job, JobStatus};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),

    /// A non-terminal job already exists for the ticket.
    #[error("ticket {ticket_id} already has an active job {job_id}")]
    DuplicateSubmission { ticket_id: String, job_id: String },

    #[error("cannot {operation} job {job_id}: {reason}")]
    InvalidState {
        job_id: String,
        operation: String,
        reason: String,
    },

    #[error("job {job_id} has no step {step}")]
    UnknownStep { job_id: String, step: StepName },

    #[error("database error: {0}")]
    Database(String),
}

impl JobError {
    pub(crate) fn invalid(
        job_id: &str,
        operation: &str,
        reason: impl Into<String>,
    ) -> Self {
        JobError::InvalidState {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub ticket_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            ticket_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_ticket_id(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable job state, the source of truth for progress queries.
///
/// Every mutation is atomic and returns the job snapshot as it stands after
/// the write. Settled attempts are never rewritten.
pub trait JobStore: Send + Sync {
    /// Create a pending job with one not-started record per step.
    ///
    /// Fails with [`JobError::DuplicateSubmission`] while another job for the
    /// same ticket is non-terminal.
    fn create_job(&self, ticket_id: &str, steps: &[StepName]) -> Result<Job, JobError>;

    /// Current snapshot of a job.
    fn get_status(&self, job_id: &str) -> Result<Option<Job>, JobError>;

    /// Most recently created job for a ticket.
    fn latest_for_ticket(&self, ticket_id: &str) -> Result<Option<Job>, JobError>;

    /// List jobs matching the filter, newest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError>;

    /// Count jobs matching the filter.
    fn count(&self, filter: &JobFilter) -> Result<i64, JobError>;

    /// Move a pending job to running. Running jobs are left as they are.
    fn mark_running(&self, job_id: &str) -> Result<Job, JobError>;

    /// Append an in-progress attempt for a step.
    fn begin_attempt(&self, job_id: &str, step: StepName, attempt: u32) -> Result<Job, JobError>;

    /// Settle a previously begun attempt.
    fn record_attempt(
        &self,
        job_id: &str,
        step: StepName,
        attempt: u32,
        settlement: &AttemptSettlement,
    ) -> Result<Job, JobError>;

    /// Flag a non-terminal job for cooperative cancellation.
    fn request_cancel(&self, job_id: &str) -> Result<Job, JobError>;

    /// Move a job to a terminal status. Rejects non-terminal targets and
    /// jobs that are already terminal.
    fn mark_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job, JobError>;
}
