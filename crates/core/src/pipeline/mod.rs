//! Pipeline definition: which steps exist and what each one reads.

mod definition;
mod step;

pub use definition::{PipelineDefinition, PipelineError, PipelineStep};
pub use step::{StepName, UnknownStep};
