//! Job and step record types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::{StepError, StepOutput};
use crate::pipeline::StepName;

/// Overall state of a job.
///
/// `pending -> running -> {succeeded, failed, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status: {}", s))
    }
}

/// State of one step within a job, derived from its latest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "not_started",
            StepStatus::InProgress => "in_progress",
            StepStatus::Succeeded => "succeeded",
            StepStatus::FailedRetryable => "failed_retryable",
            StepStatus::FailedTerminal => "failed_terminal",
        }
    }

    /// Whether an attempt may settle into this status.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::FailedRetryable | StepStatus::FailedTerminal
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(StepStatus::NotStarted),
            "in_progress" => Ok(StepStatus::InProgress),
            "succeeded" => Ok(StepStatus::Succeeded),
            "failed_retryable" => Ok(StepStatus::FailedRetryable),
            "failed_terminal" => Ok(StepStatus::FailedTerminal),
            other => Err(format!("unknown step status: {}", other)),
        }
    }
}

/// One attempt of one step. Attempts are append-only: once settled they
/// are never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAttempt {
    pub attempt: u32,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// How an in-progress attempt settled.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSettlement {
    pub status: StepStatus,
    pub output: Option<StepOutput>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

impl AttemptSettlement {
    pub fn succeeded(output: StepOutput) -> Self {
        Self {
            status: StepStatus::Succeeded,
            output: Some(output),
            error: None,
            error_kind: None,
        }
    }

    /// A failed attempt. `terminal` picks failed_terminal over
    /// failed_retryable; the message may differ from the error's own text
    /// (e.g. when the retry budget ran out).
    pub fn failed(error: &StepError, terminal: bool, message: impl Into<String>) -> Self {
        Self {
            status: if terminal {
                StepStatus::FailedTerminal
            } else {
                StepStatus::FailedRetryable
            },
            output: None,
            error: Some(message.into()),
            error_kind: Some(error.kind().to_string()),
        }
    }
}

/// Durable history of one (job, step) pair plus its derived current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: StepName,
    pub status: StepStatus,
    /// Number of attempts made so far.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    #[serde(default)]
    pub history: Vec<StepAttempt>,
}

impl StepRecord {
    /// Build the record view from the attempt history (ordered by attempt).
    pub fn from_history(step: StepName, history: Vec<StepAttempt>) -> Self {
        let latest = history.last();
        let status = latest.map(|a| a.status).unwrap_or(StepStatus::NotStarted);
        let last_error = history.iter().rev().find_map(|a| a.error.clone());
        let output = latest.and_then(|a| a.output.clone());

        Self {
            step,
            status,
            attempts: latest.map(|a| a.attempt).unwrap_or(0),
            last_error,
            output,
            history,
        }
    }

    pub fn latest(&self) -> Option<&StepAttempt> {
        self.history.last()
    }
}

/// One ticket's end-to-end classification and indexing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub ticket_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// One record per pipeline step, in pipeline order.
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub cancel_requested: bool,
    /// Why the job failed or was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn step(&self, step: StepName) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Output of a succeeded step.
    pub fn output(&self, step: StepName) -> Option<&StepOutput> {
        self.step(step)
            .filter(|r| r.status == StepStatus::Succeeded)
            .and_then(|r| r.output.as_ref())
    }

    /// Outputs of every succeeded step.
    pub fn outputs(&self) -> BTreeMap<StepName, StepOutput> {
        self.steps
            .iter()
            .filter(|r| r.status == StepStatus::Succeeded)
            .filter_map(|r| r.output.clone().map(|o| (r.step, o)))
            .collect()
    }

    /// (succeeded steps, total steps).
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .steps
            .iter()
            .filter(|r| r.status == StepStatus::Succeeded)
            .count();
        (done, self.steps.len())
    }
}
