use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Ingress
    /// A ticket was persisted at the ingestion boundary.
    TicketReceived {
        ticket_id: String,
        language: String,
        /// False when the ticket id already existed and the stored ticket was kept.
        new_ticket: bool,
    },
    /// A submission was refused because the ticket already has an active job.
    DuplicateSubmissionRejected {
        ticket_id: String,
        /// The job that is still active.
        active_job_id: String,
    },

    // Job lifecycle
    JobCreated {
        job_id: String,
        ticket_id: String,
        /// "submission", "reclassification"
        trigger: String,
    },
    JobStateChanged {
        job_id: String,
        ticket_id: String,
        from_state: String,
        to_state: String,
        reason: Option<String>,
    },
    JobCancelRequested {
        job_id: String,
        ticket_id: String,
    },
    /// Non-terminal jobs picked up again after a restart.
    JobsRecovered {
        count: u32,
        /// Attempts found in progress and settled as interrupted.
        interrupted_attempts: u32,
    },

    // Steps
    StepAttemptFinished {
        job_id: String,
        ticket_id: String,
        step: String,
        attempt: u32,
        /// "succeeded", "failed_retryable", "failed_terminal"
        outcome: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_ms: u64,
    },
    StepRetryScheduled {
        job_id: String,
        ticket_id: String,
        step: String,
        next_attempt: u32,
        delay_ms: u64,
    },

    // Index
    TicketIndexed {
        job_id: String,
        ticket_id: String,
        backend: String,
        dimension: usize,
    },
    SemanticSearchExecuted {
        query: String,
        top_k: usize,
        threshold: f32,
        results_count: u32,
        duration_ms: u64,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::TicketReceived { .. } => "ticket_received",
            Self::DuplicateSubmissionRejected { .. } => "duplicate_submission_rejected",
            Self::JobCreated { .. } => "job_created",
            Self::JobStateChanged { .. } => "job_state_changed",
            Self::JobCancelRequested { .. } => "job_cancel_requested",
            Self::JobsRecovered { .. } => "jobs_recovered",
            Self::StepAttemptFinished { .. } => "step_attempt_finished",
            Self::StepRetryScheduled { .. } => "step_retry_scheduled",
            Self::TicketIndexed { .. } => "ticket_indexed",
            Self::SemanticSearchExecuted { .. } => "semantic_search_executed",
        }
    }

    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            Self::TicketReceived { ticket_id, .. }
            | Self::DuplicateSubmissionRejected { ticket_id, .. }
            | Self::JobCreated { ticket_id, .. }
            | Self::JobStateChanged { ticket_id, .. }
            | Self::JobCancelRequested { ticket_id, .. }
            | Self::StepAttemptFinished { ticket_id, .. }
            | Self::StepRetryScheduled { ticket_id, .. }
            | Self::TicketIndexed { ticket_id, .. } => Some(ticket_id),
            Self::ServiceStarted { .. }
            | Self::ServiceStopped { .. }
            | Self::JobsRecovered { .. }
            | Self::SemanticSearchExecuted { .. } => None,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateSubmissionRejected { active_job_id, .. } => Some(active_job_id),
            Self::JobCreated { job_id, .. }
            | Self::JobStateChanged { job_id, .. }
            | Self::JobCancelRequested { job_id, .. }
            | Self::StepAttemptFinished { job_id, .. }
            | Self::StepRetryScheduled { job_id, .. }
            | Self::TicketIndexed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

/// A stored audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub ticket_id: Option<String>,
    pub job_id: Option<String>,
    pub data: AuditEvent,
}
