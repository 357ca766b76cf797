//! Step executor: runs one attempt of one named step.

mod config;
mod error;
mod runner;
mod types;

pub use config::ExecutorConfig;
pub use error::{StepError, TerminalStepError, TransientStepError};
pub use runner::{StepExecutor, StepHandler};
pub use types::{StepInput, StepOutcome, StepOutput, TicketText};
