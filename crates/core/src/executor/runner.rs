//! Single-attempt step execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::metrics;
use crate::pipeline::StepName;

use super::{ExecutorConfig, StepError, StepInput, StepOutcome, StepOutput, TerminalStepError};

/// The work behind one pipeline step.
///
/// Handlers must be safe to call more than once with the same input: the
/// dispatcher retries transient failures and re-runs interrupted attempts.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step this handler implements.
    fn step(&self) -> StepName;

    /// Run the step once.
    async fn run(&self, input: &StepInput) -> Result<StepOutput, StepError>;
}

/// Runs one attempt of a named step with timeout and error classification.
///
/// The executor never decides whether to retry. It only reports what
/// happened.
pub struct StepExecutor {
    handlers: HashMap<StepName, Arc<dyn StepHandler>>,
    timeout: Duration,
    supported_languages: Vec<String>,
}

impl StepExecutor {
    /// Create an executor with no handlers registered.
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: Duration::from_millis(config.step_timeout_ms),
            supported_languages: config
                .supported_languages
                .iter()
                .map(|l| l.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Register a handler, replacing any previous one for the same step.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(handler.step(), handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn StepHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn has_handler(&self, step: StepName) -> bool {
        self.handlers.contains_key(&step)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one attempt of `step`.
    pub async fn execute(&self, step: StepName, input: &StepInput, attempt: u32) -> StepOutcome {
        let start = Instant::now();
        let outcome: StepOutcome = self.run_guarded(step, input).await.into();
        let elapsed = start.elapsed();

        metrics::STEP_ATTEMPTS
            .with_label_values(&[step.as_str(), outcome.label()])
            .inc();
        metrics::STEP_DURATION
            .with_label_values(&[step.as_str()])
            .observe(elapsed.as_secs_f64());

        match &outcome {
            StepOutcome::Succeeded(_) => debug!(
                ticket_id = %input.ticket.ticket_id,
                step = %step,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "Step attempt succeeded"
            ),
            StepOutcome::Failed(e) => warn!(
                ticket_id = %input.ticket.ticket_id,
                step = %step,
                attempt,
                error = %e,
                retryable = e.is_retryable(),
                "Step attempt failed"
            ),
        }

        outcome
    }

    async fn run_guarded(&self, step: StepName, input: &StepInput) -> Result<StepOutput, StepError> {
        self.check_input(input)?;

        let handler = self
            .handlers
            .get(&step)
            .ok_or_else(|| StepError::rejected(format!("no handler registered for {}", step)))?;

        let output = match tokio::time::timeout(self.timeout, handler.run(input)).await {
            Ok(result) => result?,
            Err(_) => return Err(StepError::timeout(self.timeout.as_millis() as u64)),
        };

        if output.step() != step {
            return Err(StepError::rejected(format!(
                "handler for {} produced {} output",
                step,
                output.step()
            )));
        }

        Ok(output)
    }

    fn check_input(&self, input: &StepInput) -> Result<(), StepError> {
        if input.ticket.text.trim().is_empty() {
            return Err(StepError::malformed("ticket text is empty"));
        }

        let primary = input
            .ticket
            .language
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if !self.supported_languages.iter().any(|l| *l == primary) {
            return Err(TerminalStepError::UnsupportedLanguage(input.ticket.language.clone()).into());
        }

        Ok(())
    }
}
