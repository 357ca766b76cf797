//! Scripted step handler for dispatcher and executor tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::executor::{StepError, StepHandler, StepInput, StepOutput};
use crate::pipeline::StepName;

use super::fixtures;

/// A step handler with scripted behavior.
///
/// Queued failures are returned first, one per call. After that the handler
/// either always fails (see [`ScriptedStep::failing`]) or returns the
/// fixture output for its step.
///
/// A gate holds every call until the test adds permits to it; each call
/// consumes one permit.
pub struct ScriptedStep {
    step: StepName,
    output: Option<StepOutput>,
    always: Option<StepError>,
    failures: Mutex<VecDeque<StepError>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedStep {
    /// A handler that succeeds with the fixture output for `step`.
    pub fn succeeding(step: StepName) -> Self {
        Self {
            step,
            output: Some(fixtures::output_for(step)),
            always: None,
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A handler that fails every call with `error`.
    pub fn failing(step: StepName, error: StepError) -> Self {
        Self {
            output: None,
            always: Some(error),
            ..Self::succeeding(step)
        }
    }

    /// Succeed with `output` instead of the fixture.
    pub fn with_output(mut self, output: StepOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every call until a permit is available on `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Fail the next call with `error`.
    pub fn push_failure(&self, error: StepError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepHandler for ScriptedStep {
    fn step(&self) -> StepName {
        self.step
    }

    async fn run(&self, _input: &StepInput) -> Result<StepOutput, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(ref gate) = self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(ref error) = self.always {
            return Err(error.clone());
        }
        self.output
            .clone()
            .ok_or_else(|| StepError::rejected("no scripted output"))
    }
}
