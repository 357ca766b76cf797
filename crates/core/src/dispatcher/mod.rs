//! Job dispatcher: accepts tickets, creates jobs and drives them through
//! the pipeline with bounded concurrency, retries and recovery.

mod config;
mod driver;
mod retry;
mod runner;
mod types;

pub use config::{DispatcherConfig, RetryConfig};
pub use retry::{RetryPolicies, RetryPolicy};
pub use runner::Dispatcher;
pub use types::{DispatchError, DispatcherStatus, SubmissionOutcome};
