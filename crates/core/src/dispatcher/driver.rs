//! Per-job driver.
//!
//! While a driver runs it is the only writer of its job's step records.
//! Independent steps run concurrently; each settled attempt is recorded
//! before the next runnable set is computed, so every step reads its
//! prerequisites from durably succeeded records.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::audit::AuditEvent;
use crate::executor::{StepError, StepInput, StepOutcome, StepOutput, TicketText};
use crate::job::{AttemptSettlement, Job, JobStatus, StepStatus};
use crate::metrics;
use crate::pipeline::StepName;

use super::runner::{Halt, Shared};
use super::types::DispatchError;

/// Error recorded on jobs cancelled on request.
pub(super) const CANCELLED: &str = "cancelled on request";

/// Error recorded when no step can make progress but the job is not done.
const STALLED: &str = "pipeline stalled";

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(super) fn budget_exhausted(attempts: u32, error: &StepError) -> String {
    format!(
        "retry budget exhausted after {} attempts: {}",
        attempts, error
    )
}

enum Event {
    Settled {
        step: StepName,
        attempt: u32,
        outcome: StepOutcome,
        elapsed: Duration,
    },
    RetryDue {
        step: StepName,
        attempt: u32,
    },
}

/// Drive one job until it is terminal or the dispatcher shuts down.
pub(super) async fn drive(shared: Arc<Shared>, job_id: String, halt: watch::Receiver<Halt>) {
    metrics::ACTIVE_JOBS.inc();

    let driver = JobDriver {
        shared: Arc::clone(&shared),
        job_id: job_id.clone(),
    };
    if let Err(e) = driver.run(halt).await {
        error!(job_id = %job_id, error = %e, "Job driver failed");
        driver.abort(&e).await;
    }

    metrics::ACTIVE_JOBS.dec();
    shared.release(&job_id);
}

/// Resolves once the driver is asked to stop. A dropped sender counts as
/// shutdown.
async fn halted(halt: &mut watch::Receiver<Halt>) -> Halt {
    loop {
        let current = *halt.borrow_and_update();
        if current != Halt::Continue {
            return current;
        }
        if halt.changed().await.is_err() {
            return Halt::Shutdown;
        }
    }
}

fn schedule(
    events: &mpsc::UnboundedSender<Event>,
    step: StepName,
    attempt: u32,
    delay: Duration,
) -> JoinHandle<()> {
    let events = events.clone();
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let _ = events.send(Event::RetryDue { step, attempt });
    })
}

fn abandon(retries: &mut HashMap<StepName, JoinHandle<()>>) {
    for (_, handle) in retries.drain() {
        handle.abort();
    }
}

struct JobDriver {
    shared: Arc<Shared>,
    job_id: String,
}

impl JobDriver {
    async fn run(&self, mut halt: watch::Receiver<Halt>) -> Result<(), DispatchError> {
        let mut job = self
            .shared
            .jobs
            .get_status(&self.job_id)?
            .ok_or_else(|| DispatchError::JobNotFound(self.job_id.clone()))?;
        if job.is_terminal() {
            return Ok(());
        }
        if job.cancel_requested {
            return self.complete_cancelled(&job).await;
        }

        let _permit = tokio::select! {
            permit = Arc::clone(&self.shared.slots).acquire_owned() => {
                permit.map_err(|_| DispatchError::NotRunning)?
            }
            reason = halted(&mut halt) => {
                if reason == Halt::Cancel {
                    self.complete_cancelled(&job).await?;
                }
                return Ok(());
            }
        };

        let ticket = match self.shared.tickets.get(&job.ticket_id)? {
            Some(ticket) => ticket.to_text(),
            None => {
                let reason = format!("ticket {} not found", job.ticket_id);
                self.shared
                    .finish(&job, JobStatus::Failed, Some(reason))
                    .await?;
                return Ok(());
            }
        };

        if job.status == JobStatus::Pending {
            job = self.shared.jobs.mark_running(&self.job_id)?;
            info!(job_id = %job.id, ticket_id = %job.ticket_id, "Job started");
            self.shared
                .emit(AuditEvent::JobStateChanged {
                    job_id: job.id.clone(),
                    ticket_id: job.ticket_id.clone(),
                    from_state: JobStatus::Pending.to_string(),
                    to_state: JobStatus::Running.to_string(),
                    reason: None,
                })
                .await;
        }

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut in_flight = 0usize;
        let mut retries: HashMap<StepName, JoinHandle<()>> = HashMap::new();
        let mut stop: Option<Halt> = None;

        // Left failed_retryable by a previous process: retry right away.
        for record in job.steps.iter().filter(|r| r.status == StepStatus::FailedRetryable) {
            retries.insert(
                record.step,
                schedule(&events_tx, record.step, record.attempts + 1, Duration::ZERO),
            );
        }

        loop {
            if stop.is_none() && self.shared.pipeline.terminal_failure(&job).is_none() {
                for step in self.shared.pipeline.next_runnable_steps(&job) {
                    job = self.begin(step, 1, &ticket, &events_tx)?;
                    in_flight += 1;
                }
            }

            if in_flight == 0 && retries.is_empty() {
                break;
            }

            let event = tokio::select! {
                Some(event) = events.recv() => event,
                reason = halted(&mut halt), if stop.is_none() => {
                    info!(
                        job_id = %self.job_id,
                        reason = ?reason,
                        in_flight,
                        "Halting job once in-flight attempts settle"
                    );
                    stop = Some(reason);
                    abandon(&mut retries);
                    continue;
                }
            };

            match event {
                Event::Settled {
                    step,
                    attempt,
                    outcome,
                    elapsed,
                } => {
                    in_flight -= 1;
                    let (settled, retry_delay) =
                        self.settle(&job, step, attempt, outcome, elapsed).await?;
                    job = settled;

                    let failing = self.shared.pipeline.terminal_failure(&job).is_some();
                    if failing {
                        abandon(&mut retries);
                    }

                    if let Some(delay) = retry_delay {
                        if stop.is_none() && !failing {
                            self.schedule_retry(&job, step, attempt + 1, delay).await;
                            retries.insert(step, schedule(&events_tx, step, attempt + 1, delay));
                        }
                    }
                }
                Event::RetryDue { step, attempt } => {
                    // Abandoned retries may still deliver.
                    if retries.remove(&step).is_none() {
                        continue;
                    }
                    job = self.begin(step, attempt, &ticket, &events_tx)?;
                    in_flight += 1;
                }
            }
        }

        match stop {
            Some(Halt::Shutdown) => {
                info!(job_id = %job.id, "Job left for recovery");
                Ok(())
            }
            Some(Halt::Cancel) => self.complete_cancelled(&job).await,
            _ if job.cancel_requested => self.complete_cancelled(&job).await,
            _ => self.complete(&job).await,
        }
    }

    /// Finish a job whose cancellation was requested. A job whose every step
    /// already succeeded, indexing included, finishes as succeeded.
    async fn complete_cancelled(&self, job: &Job) -> Result<(), DispatchError> {
        if self.shared.pipeline.is_complete(job) {
            info!(job_id = %job.id, "Cancellation arrived after the last step succeeded");
            return self.complete(job).await;
        }
        self.shared
            .finish(job, JobStatus::Cancelled, Some(CANCELLED.to_string()))
            .await?;
        Ok(())
    }

    /// Fail a job whose driver hit an error it cannot recover from, so the
    /// ticket is not left blocked by a job nobody drives.
    async fn abort(&self, cause: &DispatchError) {
        let job = match self.shared.jobs.get_status(&self.job_id) {
            Ok(Some(job)) if !job.is_terminal() => job,
            Ok(_) => return,
            Err(e) => {
                error!(job_id = %self.job_id, error = %e, "Job left for recovery");
                return;
            }
        };
        let reason = format!("job driver failed: {}", cause);
        if let Err(e) = self.shared.finish(&job, JobStatus::Failed, Some(reason)).await {
            error!(job_id = %self.job_id, error = %e, "Job left for recovery");
        }
    }

    /// Settle the job once nothing is in flight.
    async fn complete(&self, job: &Job) -> Result<(), DispatchError> {
        let pipeline = &self.shared.pipeline;

        let (status, reason) = if let Some(step) = pipeline.terminal_failure(job) {
            let cause = job
                .step(step)
                .and_then(|r| r.last_error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            (JobStatus::Failed, Some(format!("{} failed: {}", step, cause)))
        } else if pipeline.is_complete(job) {
            (JobStatus::Succeeded, None)
        } else {
            (JobStatus::Failed, Some(STALLED.to_string()))
        };

        self.shared.finish(job, status, reason).await?;
        Ok(())
    }

    /// Record an in-progress attempt and run it in the background.
    fn begin(
        &self,
        step: StepName,
        attempt: u32,
        ticket: &TicketText,
        events: &mpsc::UnboundedSender<Event>,
    ) -> Result<Job, DispatchError> {
        let job = self.shared.jobs.begin_attempt(&self.job_id, step, attempt)?;

        let mut input = StepInput::new(ticket.clone());
        for dependency in self.shared.pipeline.dependencies(step) {
            if let Some(output) = job.output(*dependency) {
                input = input.with_prerequisite(output.clone());
            }
        }

        debug!(job_id = %self.job_id, step = %step, attempt, "Starting step attempt");

        let executor = Arc::clone(&self.shared.executor);
        let events = events.clone();
        let job_id = self.job_id.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let outcome = match AssertUnwindSafe(executor.execute(step, &input, attempt))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        job_id = %job_id,
                        step = %step,
                        attempt,
                        panic = %message,
                        "Step handler panicked"
                    );
                    StepOutcome::Failed(StepError::rejected(format!(
                        "step handler panicked: {}",
                        message
                    )))
                }
            };
            let _ = events.send(Event::Settled {
                step,
                attempt,
                outcome,
                elapsed: start.elapsed(),
            });
        });

        Ok(job)
    }

    /// Record a settled attempt. Returns the updated job and, if the step
    /// should be retried, the backoff before the next attempt.
    async fn settle(
        &self,
        job: &Job,
        step: StepName,
        attempt: u32,
        outcome: StepOutcome,
        elapsed: Duration,
    ) -> Result<(Job, Option<Duration>), DispatchError> {
        let policy = self.shared.policies.for_step(step);

        let (settlement, retry_delay) = match &outcome {
            StepOutcome::Succeeded(output) => (AttemptSettlement::succeeded(output.clone()), None),
            StepOutcome::Failed(error) if policy.should_retry(error, attempt) => (
                AttemptSettlement::failed(error, false, error.to_string()),
                Some(policy.delay_for(attempt)),
            ),
            StepOutcome::Failed(error) if policy.is_retryable(error) => (
                AttemptSettlement::failed(error, true, budget_exhausted(attempt, error)),
                None,
            ),
            StepOutcome::Failed(error) => {
                (AttemptSettlement::failed(error, true, error.to_string()), None)
            }
        };

        let updated = self
            .shared
            .jobs
            .record_attempt(&self.job_id, step, attempt, &settlement)?;

        self.shared
            .emit(AuditEvent::StepAttemptFinished {
                job_id: job.id.clone(),
                ticket_id: job.ticket_id.clone(),
                step: step.to_string(),
                attempt,
                outcome: settlement.status.to_string(),
                error: settlement.error.clone(),
                duration_ms: elapsed.as_millis() as u64,
            })
            .await;

        if let StepOutcome::Succeeded(StepOutput::Indexing {
            dimension, backend, ..
        }) = &outcome
        {
            self.shared
                .emit(AuditEvent::TicketIndexed {
                    job_id: job.id.clone(),
                    ticket_id: job.ticket_id.clone(),
                    backend: backend.clone(),
                    dimension: *dimension,
                })
                .await;
        }

        Ok((updated, retry_delay))
    }

    async fn schedule_retry(&self, job: &Job, step: StepName, next_attempt: u32, delay: Duration) {
        metrics::STEP_RETRIES
            .with_label_values(&[step.as_str()])
            .inc();
        debug!(
            job_id = %job.id,
            step = %step,
            next_attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduled retry"
        );
        self.shared
            .emit(AuditEvent::StepRetryScheduled {
                job_id: job.id.clone(),
                ticket_id: job.ticket_id.clone(),
                step: step.to_string(),
                next_attempt,
                delay_ms: delay.as_millis() as u64,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TransientStepError;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(format!("index {}", 3));
        assert_eq!(panic_message(payload.as_ref()), "index 3");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_budget_exhausted_message() {
        let error = StepError::from(TransientStepError::Timeout(100));
        assert_eq!(
            budget_exhausted(3, &error),
            "retry budget exhausted after 3 attempts: attempt timed out after 100ms"
        );
    }

    #[tokio::test]
    async fn test_halted_reports_first_signal() {
        let (tx, mut rx) = watch::channel(Halt::Continue);
        tx.send(Halt::Cancel).unwrap();
        assert_eq!(halted(&mut rx).await, Halt::Cancel);

        let (tx, mut rx) = watch::channel(Halt::Continue);
        drop(tx);
        assert_eq!(halted(&mut rx).await, Halt::Shutdown);
    }

    #[tokio::test]
    async fn test_abandoned_retry_is_not_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut retries = HashMap::new();
        retries.insert(
            StepName::Summarization,
            schedule(&tx, StepName::Summarization, 2, Duration::from_secs(60)),
        );
        abandon(&mut retries);
        assert!(retries.is_empty());

        drop(tx);
        tokio::task::yield_now().await;
        assert!(rx.recv().await.is_none());
    }
}
