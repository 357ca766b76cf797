//! Job state: durable per-ticket classification runs and their step history.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{JobError, JobFilter, JobStore};
pub use types::{AttemptSettlement, Job, JobStatus, StepAttempt, StepRecord, StepStatus};
