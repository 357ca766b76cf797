//! Job dispatcher implementation.
//!
//! Owns job creation and drives every job to a terminal state:
//! - Ingress: submissions, reclassifications and cancellations arrive as
//!   commands on a bounded channel drained by a single loop
//! - Jobs: one driver task per job, `max_concurrent_jobs` of them running
//! - Recovery: attempts left in progress by a previous process are settled
//!   as interrupted and their jobs resumed

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::executor::{StepError, StepExecutor, TransientStepError};
use crate::job::{AttemptSettlement, Job, JobError, JobFilter, JobStatus, JobStore, StepStatus};
use crate::metrics;
use crate::pipeline::PipelineDefinition;
use crate::ticket::{TicketStore, TicketSubmission};

use super::config::DispatcherConfig;
use super::driver::{self, budget_exhausted};
use super::retry::RetryPolicies;
use super::types::{DispatchError, DispatcherStatus, SubmissionOutcome};

/// Why a driver is asked to stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Halt {
    Continue,
    /// Cancellation requested: finish as cancelled once attempts settle.
    Cancel,
    /// Dispatcher shutdown: leave the job for recovery.
    Shutdown,
}

type Reply<T> = oneshot::Sender<Result<T, DispatchError>>;

enum Command {
    Submit {
        submission: TicketSubmission,
        reply: Reply<SubmissionOutcome>,
    },
    Reclassify {
        ticket_id: String,
        reply: Reply<Job>,
    },
    Cancel {
        job_id: String,
        reply: Reply<Job>,
    },
}

struct ActiveDriver {
    halt: watch::Sender<Halt>,
    handle: JoinHandle<()>,
}

/// State shared between the dispatcher, its command loop and job drivers.
pub(super) struct Shared {
    pub(super) config: DispatcherConfig,
    pub(super) pipeline: PipelineDefinition,
    pub(super) executor: Arc<StepExecutor>,
    pub(super) jobs: Arc<dyn JobStore>,
    pub(super) tickets: Arc<dyn TicketStore>,
    pub(super) policies: RetryPolicies,
    pub(super) slots: Arc<Semaphore>,
    audit: Option<AuditHandle>,
    active: Mutex<HashMap<String, ActiveDriver>>,
}

impl Shared {
    pub(super) async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }

    fn spawn_driver(self: &Arc<Self>, job_id: String) {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(&job_id) {
            return;
        }

        let (halt, halt_rx) = watch::channel(Halt::Continue);
        let handle = tokio::spawn(driver::drive(Arc::clone(self), job_id.clone(), halt_rx));
        active.insert(job_id, ActiveDriver { halt, handle });
    }

    /// Called by a driver when it is done with its job.
    pub(super) fn release(&self, job_id: &str) {
        self.active.lock().unwrap().remove(job_id);
    }

    /// Move a job to a terminal status and report it.
    pub(super) async fn finish(
        &self,
        job: &Job,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job, DispatchError> {
        let finished = self.jobs.mark_terminal(&job.id, status, error.clone())?;

        let elapsed = (finished.updated_at - finished.created_at)
            .to_std()
            .unwrap_or_default();
        metrics::JOBS_COMPLETED
            .with_label_values(&[status.as_str()])
            .inc();
        metrics::JOB_DURATION
            .with_label_values(&[status.as_str()])
            .observe(elapsed.as_secs_f64());

        if status == JobStatus::Succeeded {
            info!(
                job_id = %job.id,
                ticket_id = %job.ticket_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job succeeded"
            );
        } else {
            warn!(
                job_id = %job.id,
                ticket_id = %job.ticket_id,
                status = %status,
                error = error.as_deref().unwrap_or(""),
                "Job finished without success"
            );
        }

        self.emit(AuditEvent::JobStateChanged {
            job_id: job.id.clone(),
            ticket_id: job.ticket_id.clone(),
            from_state: job.status.to_string(),
            to_state: status.to_string(),
            reason: error,
        })
        .await;

        Ok(finished)
    }

    async fn submit(
        self: &Arc<Self>,
        submission: TicketSubmission,
    ) -> Result<SubmissionOutcome, DispatchError> {
        submission.validate().map_err(DispatchError::Invalid)?;

        let (ticket, new_ticket) = self.tickets.insert(submission)?;
        debug!(ticket_id = %ticket.id, new_ticket, "Ticket received");
        self.emit(AuditEvent::TicketReceived {
            ticket_id: ticket.id.clone(),
            language: ticket.language.clone(),
            new_ticket,
        })
        .await;

        let job = self.create_job(&ticket.id, "submission").await?;
        Ok(SubmissionOutcome {
            ticket,
            new_ticket,
            job,
        })
    }

    async fn reclassify(self: &Arc<Self>, ticket_id: &str) -> Result<Job, DispatchError> {
        if self.tickets.get(ticket_id)?.is_none() {
            return Err(DispatchError::TicketNotFound(ticket_id.to_string()));
        }
        self.create_job(ticket_id, "reclassification").await
    }

    async fn create_job(self: &Arc<Self>, ticket_id: &str, trigger: &str) -> Result<Job, DispatchError> {
        let job = match self.jobs.create_job(ticket_id, &self.pipeline.steps()) {
            Ok(job) => job,
            Err(JobError::DuplicateSubmission { ticket_id, job_id }) => {
                metrics::DUPLICATE_SUBMISSIONS.inc();
                info!(
                    ticket_id = %ticket_id,
                    active_job_id = %job_id,
                    "Rejected submission for ticket with an active job"
                );
                self.emit(AuditEvent::DuplicateSubmissionRejected {
                    ticket_id: ticket_id.clone(),
                    active_job_id: job_id.clone(),
                })
                .await;
                return Err(DispatchError::DuplicateSubmission { ticket_id, job_id });
            }
            Err(e) => return Err(e.into()),
        };

        metrics::JOBS_CREATED.inc();
        info!(job_id = %job.id, ticket_id = %ticket_id, trigger, "Created job");
        self.emit(AuditEvent::JobCreated {
            job_id: job.id.clone(),
            ticket_id: ticket_id.to_string(),
            trigger: trigger.to_string(),
        })
        .await;

        self.spawn_driver(job.id.clone());
        Ok(job)
    }

    async fn cancel(self: &Arc<Self>, job_id: &str) -> Result<Job, DispatchError> {
        let job = self
            .jobs
            .get_status(job_id)?
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))?;
        if !job.status.can_cancel() {
            return Err(DispatchError::NotCancellable {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }

        let job = self.jobs.request_cancel(job_id)?;
        info!(job_id = %job.id, ticket_id = %job.ticket_id, "Cancellation requested");
        self.emit(AuditEvent::JobCancelRequested {
            job_id: job.id.clone(),
            ticket_id: job.ticket_id.clone(),
        })
        .await;

        let signalled = self
            .active
            .lock()
            .unwrap()
            .get(job_id)
            .map(|d| d.halt.send(Halt::Cancel).is_ok())
            .unwrap_or(false);
        if signalled {
            return Ok(job);
        }

        // Nothing is driving the job, so nothing is in flight.
        self.finish(&job, JobStatus::Cancelled, Some(driver::CANCELLED.to_string()))
            .await
    }
}

async fn command_loop(shared: Arc<Shared>, mut commands: mpsc::Receiver<Command>) {
    debug!("Command loop started");

    while let Some(command) = commands.recv().await {
        match command {
            Command::Submit { submission, reply } => {
                let _ = reply.send(shared.submit(submission).await);
            }
            Command::Reclassify { ticket_id, reply } => {
                let _ = reply.send(shared.reclassify(&ticket_id).await);
            }
            Command::Cancel { job_id, reply } => {
                let _ = reply.send(shared.cancel(&job_id).await);
            }
        }
    }

    debug!("Command loop stopped");
}

/// The job dispatcher: accepts tickets and drives their jobs through the pipeline.
pub struct Dispatcher {
    shared: Arc<Shared>,

    // Runtime state
    running: Arc<AtomicBool>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    command_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a new dispatcher. Nothing runs until [`Dispatcher::start`].
    pub fn new(
        config: DispatcherConfig,
        pipeline: PipelineDefinition,
        executor: Arc<StepExecutor>,
        jobs: Arc<dyn JobStore>,
        tickets: Arc<dyn TicketStore>,
        audit: Option<AuditHandle>,
    ) -> Result<Self, DispatchError> {
        pipeline.validate()?;
        for step in pipeline.steps() {
            if !executor.has_handler(step) {
                warn!(step = %step, "No handler registered; attempts will fail");
            }
        }

        let policies = RetryPolicies::from_config(&config);
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                pipeline,
                executor,
                jobs,
                tickets,
                policies,
                slots,
                audit,
                active: Mutex::new(HashMap::new()),
            }),
            running: Arc::new(AtomicBool::new(false)),
            commands: Mutex::new(None),
            command_loop: Mutex::new(None),
        })
    }

    /// Start the dispatcher: recover unfinished jobs, then accept commands.
    ///
    /// Returns the number of recovered jobs.
    pub async fn start(&self) -> Result<usize, DispatchError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Dispatcher already running");
            return Ok(0);
        }

        info!("Starting dispatcher");

        let recovered = match self.recover().await {
            Ok(count) => count,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.shared.config.command_buffer.max(1));
        *self.commands.lock().unwrap() = Some(tx);
        let handle = tokio::spawn(command_loop(Arc::clone(&self.shared), rx));
        *self.command_loop.lock().unwrap() = Some(handle);

        info!(
            recovered,
            max_concurrent_jobs = self.shared.config.max_concurrent_jobs,
            "Dispatcher started"
        );
        Ok(recovered)
    }

    /// Stop the dispatcher gracefully.
    ///
    /// Queued commands are still answered. In-flight attempts settle and are
    /// recorded; scheduled retries are dropped and picked up again by the
    /// next start.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Dispatcher not running");
            return;
        }

        info!("Stopping dispatcher");

        drop(self.commands.lock().unwrap().take());
        let command_loop = self.command_loop.lock().unwrap().take();
        if let Some(handle) = command_loop {
            let _ = handle.await;
        }

        let drivers: Vec<ActiveDriver> = self
            .shared
            .active
            .lock()
            .unwrap()
            .drain()
            .map(|(_, driver)| driver)
            .collect();
        for driver in &drivers {
            let _ = driver.halt.send(Halt::Shutdown);
        }
        let in_flight = drivers.len();
        join_all(drivers.into_iter().map(|driver| driver.handle)).await;

        info!(drained_jobs = in_flight, "Dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.shared.pipeline
    }

    /// Persist a ticket and create its job.
    pub async fn submit(
        &self,
        submission: TicketSubmission,
    ) -> Result<SubmissionOutcome, DispatchError> {
        self.send(|reply| Command::Submit { submission, reply })
            .await
    }

    /// Submit several tickets in order. Each submission succeeds or fails
    /// on its own.
    pub async fn submit_batch(
        &self,
        submissions: Vec<TicketSubmission>,
    ) -> Vec<Result<SubmissionOutcome, DispatchError>> {
        let mut results = Vec::with_capacity(submissions.len());
        for submission in submissions {
            results.push(self.submit(submission).await);
        }
        results
    }

    /// Create a fresh job for an already stored ticket whose previous job
    /// is terminal.
    pub async fn reclassify(&self, ticket_id: &str) -> Result<Job, DispatchError> {
        let ticket_id = ticket_id.to_string();
        self.send(|reply| Command::Reclassify { ticket_id, reply })
            .await
    }

    /// Request cooperative cancellation of a non-terminal job.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, DispatchError> {
        let job_id = job_id.to_string();
        self.send(|reply| Command::Cancel { job_id, reply }).await
    }

    /// Current snapshot of a job.
    pub fn job_status(&self, job_id: &str) -> Result<Job, DispatchError> {
        self.shared
            .jobs
            .get_status(job_id)?
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))
    }

    /// Snapshot of the most recent job for a ticket.
    pub fn ticket_status(&self, ticket_id: &str) -> Result<Job, DispatchError> {
        self.shared
            .jobs
            .latest_for_ticket(ticket_id)?
            .ok_or_else(|| DispatchError::TicketNotFound(ticket_id.to_string()))
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, DispatchError> {
        Ok(self.shared.jobs.list(filter)?)
    }

    pub fn count_jobs(&self, filter: &JobFilter) -> Result<i64, DispatchError> {
        Ok(self.shared.jobs.count(filter)?)
    }

    /// Get current dispatcher status.
    pub fn status(&self) -> DispatcherStatus {
        let count = |status: JobStatus| {
            self.shared
                .jobs
                .count(&JobFilter::new().with_status(status))
                .unwrap_or(0)
        };

        DispatcherStatus {
            running: self.is_running(),
            active_jobs: self.shared.active.lock().unwrap().len(),
            max_concurrent_jobs: self.shared.config.max_concurrent_jobs,
            available_slots: self.shared.slots.available_permits(),
            pending_count: count(JobStatus::Pending),
            running_count: count(JobStatus::Running),
            succeeded_count: count(JobStatus::Succeeded),
            failed_count: count(JobStatus::Failed),
            cancelled_count: count(JobStatus::Cancelled),
        }
    }

    async fn send<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, DispatchError> {
        let sender = self
            .commands
            .lock()
            .unwrap()
            .clone()
            .ok_or(DispatchError::NotRunning)?;

        let (reply, response) = oneshot::channel();
        sender
            .send(command(reply))
            .await
            .map_err(|_| DispatchError::NotRunning)?;
        response.await.map_err(|_| DispatchError::NotRunning)?
    }

    /// Settle attempts interrupted by the previous shutdown and resume every
    /// non-terminal job, oldest first.
    async fn recover(&self) -> Result<usize, DispatchError> {
        let mut jobs = Vec::new();
        for status in [JobStatus::Pending, JobStatus::Running] {
            let mut offset = 0;
            loop {
                let filter = JobFilter::new().with_status(status).with_offset(offset);
                let page = self.shared.jobs.list(&filter)?;
                let fetched = page.len() as i64;
                jobs.extend(page);
                if fetched < filter.limit {
                    break;
                }
                offset += fetched;
            }
        }

        let mut interrupted = 0u32;
        for job in &jobs {
            for record in job.steps.iter().filter(|r| r.status == StepStatus::InProgress) {
                let error = StepError::from(TransientStepError::Interrupted);
                let policy = self.shared.policies.for_step(record.step);
                let settlement = if policy.should_retry(&error, record.attempts) {
                    AttemptSettlement::failed(&error, false, error.to_string())
                } else {
                    AttemptSettlement::failed(&error, true, budget_exhausted(record.attempts, &error))
                };
                self.shared
                    .jobs
                    .record_attempt(&job.id, record.step, record.attempts, &settlement)?;
                interrupted += 1;
                debug!(
                    job_id = %job.id,
                    step = %record.step,
                    attempt = record.attempts,
                    "Settled interrupted attempt"
                );
            }
        }

        jobs.sort_by_key(|job| job.created_at);
        for job in &jobs {
            self.shared.spawn_driver(job.id.clone());
        }

        if !jobs.is_empty() {
            metrics::JOBS_RECOVERED.inc_by(jobs.len() as u64);
            info!(count = jobs.len(), interrupted, "Recovered unfinished jobs");
            self.shared
                .emit(AuditEvent::JobsRecovered {
                    count: jobs.len() as u32,
                    interrupted_attempts: interrupted,
                })
                .await;
        }

        Ok(jobs.len())
    }
}
