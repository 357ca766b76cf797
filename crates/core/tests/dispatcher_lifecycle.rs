//! Dispatcher lifecycle integration tests.
//!
//! These tests drive real SQLite stores through the dispatcher:
//! submission -> pending -> running -> {succeeded, failed, cancelled}

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use triage_core::{
    build_executor,
    executor::{StepInput, StepOutput, TransientStepError},
    job::AttemptSettlement,
    testing::{fixtures, wait_for_job, wait_for_terminal, KeywordEmbedder, MockLlmClient, ScriptedStep},
    ClassificationResult, DispatchError, Dispatcher, DispatcherConfig, Embedder, ExecutorConfig,
    IndexingError, Intent, Job, JobError, JobFilter, JobStatus, JobStore, LlmConfig, LlmProvider, PipelineDefinition, ProductArea,
    RetryConfig, SearchConfig, SearchRequest, SemanticIndexer, SemanticSearch, Sentiment,
    SqliteJobStore, SqliteTicketStore, StepError, StepExecutor, StepHandler, StepName,
    StepStatus, TicketFilter, TicketStore, Urgency,
};
use triage_core::index::InMemoryVectorStore;

/// Test helper holding the stores shared by every dispatcher in a test.
struct TestHarness {
    jobs: Arc<SqliteJobStore>,
    tickets: Arc<SqliteTicketStore>,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let jobs = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let tickets =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));

        Self {
            jobs,
            tickets,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    fn config() -> DispatcherConfig {
        let fast = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 5,
            max_delay_ms: 20,
            backoff_multiplier: 2.0,
        };
        DispatcherConfig {
            retry: fast.clone(),
            indexing_retry: fast,
            ..Default::default()
        }
    }

    fn executor_config(timeout_ms: u64) -> ExecutorConfig {
        ExecutorConfig {
            step_timeout_ms: timeout_ms,
            ..Default::default()
        }
    }

    /// Every step succeeds with its fixture output, except the overrides.
    fn scripted_executor(overrides: Vec<Arc<ScriptedStep>>, timeout_ms: u64) -> StepExecutor {
        let mut executor = StepExecutor::new(&Self::executor_config(timeout_ms));
        for step in StepName::ALL {
            executor.register(Arc::new(ScriptedStep::succeeding(step)));
        }
        for handler in overrides {
            executor.register(handler as Arc<dyn StepHandler>);
        }
        executor
    }

    fn dispatcher_with(&self, config: DispatcherConfig, executor: StepExecutor) -> Dispatcher {
        Dispatcher::new(
            config,
            PipelineDefinition::classify_ticket(),
            Arc::new(executor),
            self.jobs.clone(),
            self.tickets.clone(),
            None,
        )
        .expect("Failed to create dispatcher")
    }

    fn dispatcher(&self, executor: StepExecutor) -> Dispatcher {
        self.dispatcher_with(Self::config(), executor)
    }
}

fn status_of(job: &triage_core::Job, step: StepName) -> StepStatus {
    job.step(step).map(|r| r.status).unwrap()
}

#[tokio::test]
async fn test_invoice_ticket_classified_and_searchable() {
    let harness = TestHarness::new();
    let embedder = Arc::new(KeywordEmbedder::new());
    let indexer = Arc::new(SemanticIndexer::new(
        Arc::new(InMemoryVectorStore::new()),
        embedder.dimension(),
    ));
    let executor = build_executor(
        &TestHarness::executor_config(2_000),
        Arc::new(MockLlmClient::new()),
        &LlmConfig::new(LlmProvider::Ollama, "llama3"),
        embedder.clone(),
        indexer.clone(),
    );
    let dispatcher = harness.dispatcher(executor);
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    assert!(outcome.new_ticket);
    assert_eq!(outcome.job.status, JobStatus::Pending);

    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;
    assert_eq!(job.status, JobStatus::Succeeded, "job error: {:?}", job.error);
    for record in &job.steps {
        assert_eq!(record.status, StepStatus::Succeeded, "step {}", record.step);
    }

    let result = ClassificationResult::from_job(&job).unwrap();
    assert_eq!(result.sentiment.label, Sentiment::Negative);
    assert_eq!(result.urgency.label, Urgency::High);
    assert_eq!(result.intent.label, Intent::BillingDispute);
    assert_eq!(result.product_area.label, ProductArea::Billing);

    let search = SemanticSearch::new(embedder, indexer, SearchConfig::default());
    let response = search
        .search(SearchRequest::new("billing problem"))
        .await
        .unwrap();
    assert_eq!(response.hits.len(), 1);
    assert_eq!(response.hits[0].ticket_id, "t-1");
    assert!(response.hits[0].score > 0.5);

    let by_ticket = dispatcher.ticket_status("t-1").unwrap();
    assert_eq!(by_ticket.id, job.id);

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_duplicate_submission_rejected_while_active() {
    let harness = TestHarness::new();
    let gate = Arc::new(Semaphore::new(0));
    let summary = Arc::new(ScriptedStep::succeeding(StepName::Summarization).with_gate(gate.clone()));
    let dispatcher = harness.dispatcher(TestHarness::scripted_executor(vec![summary], 2_000));
    dispatcher.start().await.unwrap();

    let first = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let err = dispatcher.submit(fixtures::submission("t-1")).await.unwrap_err();
    match err {
        DispatchError::DuplicateSubmission { ticket_id, job_id } => {
            assert_eq!(ticket_id, "t-1");
            assert_eq!(job_id, first.job.id);
        }
        other => panic!("expected duplicate submission, got {:?}", other),
    }
    assert!(matches!(
        dispatcher.reclassify("t-1").await,
        Err(DispatchError::DuplicateSubmission { .. })
    ));

    gate.add_permits(1);
    let job = wait_for_terminal(&dispatcher, &first.job.id).await;
    assert_eq!(job.status, JobStatus::Succeeded);

    // Once terminal, the ticket may be classified again.
    gate.add_permits(1);
    let second = dispatcher.reclassify("t-1").await.unwrap();
    assert_ne!(second.id, first.job.id);
    let job = wait_for_terminal(&dispatcher, &second.id).await;
    assert_eq!(job.status, JobStatus::Succeeded);

    let all = harness
        .jobs
        .count(&JobFilter::new().with_ticket_id("t-1"))
        .unwrap();
    assert_eq!(all, 2);
    assert_eq!(harness.tickets.count(&TicketFilter::new()).unwrap(), 1);

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let harness = TestHarness::new();
    let urgency = Arc::new(ScriptedStep::succeeding(StepName::UrgencyClassification));
    urgency.push_failure(StepError::timeout(100));
    urgency.push_failure(StepError::timeout(100));
    let dispatcher =
        harness.dispatcher(TestHarness::scripted_executor(vec![urgency.clone()], 2_000));
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    let record = job.step(StepName::UrgencyClassification).unwrap();
    assert_eq!(record.attempts, 3);
    let statuses: Vec<_> = record.history.iter().map(|a| a.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::FailedRetryable,
            StepStatus::FailedRetryable,
            StepStatus::Succeeded
        ]
    );
    assert_eq!(urgency.calls(), 3);

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let harness = TestHarness::new();
    let urgency = Arc::new(ScriptedStep::failing(
        StepName::UrgencyClassification,
        StepError::unavailable("model overloaded"),
    ));
    let dispatcher =
        harness.dispatcher(TestHarness::scripted_executor(vec![urgency.clone()], 2_000));
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let record = job.step(StepName::UrgencyClassification).unwrap();
    assert_eq!(record.status, StepStatus::FailedTerminal);
    assert_eq!(record.attempts, 3);
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("retry budget exhausted after 3 attempts"));
    assert_eq!(urgency.calls(), 3);
    assert_eq!(status_of(&job, StepName::Indexing), StepStatus::NotStarted);

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_terminal_failure_fails_job() {
    let harness = TestHarness::new();
    let keywords = Arc::new(ScriptedStep::failing(
        StepName::KeywordExtraction,
        StepError::malformed("no usable words"),
    ));
    let dispatcher =
        harness.dispatcher(TestHarness::scripted_executor(vec![keywords.clone()], 2_000));
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("keyword_extraction"));
    assert_eq!(keywords.calls(), 1);

    let record = job.step(StepName::KeywordExtraction).unwrap();
    assert_eq!(record.status, StepStatus::FailedTerminal);
    assert_eq!(record.attempts, 1);
    assert_eq!(status_of(&job, StepName::SentimentAnalysis), StepStatus::Succeeded);
    assert_eq!(status_of(&job, StepName::Indexing), StepStatus::NotStarted);
    assert!(ClassificationResult::from_job(&job).is_none());

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_cancel_keeps_succeeded_records() {
    let harness = TestHarness::new();
    let gate = Arc::new(Semaphore::new(0));
    let summary = Arc::new(ScriptedStep::succeeding(StepName::Summarization).with_gate(gate.clone()));
    let embedding =
        Arc::new(ScriptedStep::succeeding(StepName::EmbeddingGeneration).with_gate(gate.clone()));
    let dispatcher =
        harness.dispatcher(TestHarness::scripted_executor(vec![summary, embedding], 5_000));
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    wait_for_job(&dispatcher, &outcome.job.id, |job| {
        status_of(job, StepName::SentimentAnalysis) == StepStatus::Succeeded
            && status_of(job, StepName::KeywordExtraction) == StepStatus::Succeeded
    })
    .await;

    let snapshot = dispatcher.cancel(&outcome.job.id).await.unwrap();
    assert!(snapshot.cancel_requested);

    // In-flight attempts run to completion.
    gate.add_permits(2);
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(status_of(&job, StepName::SentimentAnalysis), StepStatus::Succeeded);
    assert_eq!(status_of(&job, StepName::KeywordExtraction), StepStatus::Succeeded);
    for step in [
        StepName::UrgencyClassification,
        StepName::IntentClassification,
        StepName::ProductAreaClassification,
        StepName::Indexing,
    ] {
        assert_eq!(status_of(&job, step), StepStatus::NotStarted, "step {}", step);
    }

    assert!(matches!(
        dispatcher.cancel(&outcome.job.id).await,
        Err(DispatchError::NotCancellable { .. })
    ));

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_concurrency_limit() {
    let harness = TestHarness::new();
    let gate = Arc::new(Semaphore::new(0));
    let summary = Arc::new(ScriptedStep::succeeding(StepName::Summarization).with_gate(gate.clone()));
    let config = DispatcherConfig {
        max_concurrent_jobs: 1,
        ..TestHarness::config()
    };
    let dispatcher =
        harness.dispatcher_with(config, TestHarness::scripted_executor(vec![summary], 5_000));
    dispatcher.start().await.unwrap();

    let first = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let second = dispatcher.submit(fixtures::submission("t-2")).await.unwrap();

    wait_for_job(&dispatcher, &first.job.id, |job| job.status == JobStatus::Running).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        dispatcher.job_status(&second.job.id).unwrap().status,
        JobStatus::Pending
    );

    let status = dispatcher.status();
    assert!(status.running);
    assert_eq!(status.active_jobs, 2);
    assert_eq!(status.available_slots, 0);
    assert_eq!(status.running_count, 1);
    assert_eq!(status.pending_count, 1);

    gate.add_permits(2);
    assert_eq!(
        wait_for_terminal(&dispatcher, &first.job.id).await.status,
        JobStatus::Succeeded
    );
    assert_eq!(
        wait_for_terminal(&dispatcher, &second.job.id).await.status,
        JobStatus::Succeeded
    );

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_recovery_settles_interrupted_attempts() {
    let harness = TestHarness::new();

    // State left behind by a process that died mid-attempt.
    let (ticket, _) = harness.tickets.insert(fixtures::submission("t-1")).unwrap();
    let job = harness
        .jobs
        .create_job(&ticket.id, &PipelineDefinition::classify_ticket().steps())
        .unwrap();
    harness.jobs.mark_running(&job.id).unwrap();
    harness
        .jobs
        .begin_attempt(&job.id, StepName::SentimentAnalysis, 1)
        .unwrap();

    let dispatcher = harness.dispatcher(TestHarness::scripted_executor(vec![], 2_000));
    assert_eq!(dispatcher.start().await.unwrap(), 1);

    let job = wait_for_terminal(&dispatcher, &job.id).await;
    assert_eq!(job.status, JobStatus::Succeeded);

    let record = job.step(StepName::SentimentAnalysis).unwrap();
    assert_eq!(record.attempts, 2);
    assert_eq!(record.history[0].status, StepStatus::FailedRetryable);
    assert_eq!(record.history[0].error_kind.as_deref(), Some("interrupted"));

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_stop_then_restart_resumes_job() {
    let harness = TestHarness::new();
    let gate = Arc::new(Semaphore::new(0));
    let summary = Arc::new(ScriptedStep::succeeding(StepName::Summarization).with_gate(gate));

    let dispatcher = harness.dispatcher(TestHarness::scripted_executor(vec![summary.clone()], 200));
    dispatcher.start().await.unwrap();
    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    wait_for_job(&dispatcher, &outcome.job.id, |job| {
        status_of(job, StepName::Summarization) == StepStatus::InProgress
    })
    .await;

    // The held attempt times out while stopping; its retry is left for the
    // next start.
    dispatcher.stop().await;
    assert!(!dispatcher.is_running());
    let job = harness.jobs.get_status(&outcome.job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(status_of(&job, StepName::Summarization), StepStatus::FailedRetryable);

    assert!(matches!(
        dispatcher.submit(fixtures::submission("t-2")).await,
        Err(DispatchError::NotRunning)
    ));

    let restarted = harness.dispatcher(TestHarness::scripted_executor(vec![], 2_000));
    assert_eq!(restarted.start().await.unwrap(), 1);
    let job = wait_for_terminal(&restarted, &outcome.job.id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.step(StepName::Summarization).unwrap().attempts, 2);
    assert_eq!(summary.calls(), 1);

    restarted.stop().await;
}

#[tokio::test]
async fn test_invalid_submission_rejected() {
    let harness = TestHarness::new();
    let dispatcher = harness.dispatcher(TestHarness::scripted_executor(vec![], 2_000));
    dispatcher.start().await.unwrap();

    let err = dispatcher
        .submit(triage_core::TicketSubmission::new("t-1", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Invalid(_)));
    assert!(harness.tickets.get("t-1").unwrap().is_none());

    assert!(matches!(
        dispatcher.reclassify("missing").await,
        Err(DispatchError::TicketNotFound(_))
    ));
    assert!(matches!(
        dispatcher.job_status("missing"),
        Err(DispatchError::JobNotFound(_))
    ));

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_batch_submission_reports_each_ticket() {
    let harness = TestHarness::new();
    let dispatcher = harness.dispatcher(TestHarness::scripted_executor(vec![], 2_000));
    dispatcher.start().await.unwrap();

    let results = dispatcher
        .submit_batch(vec![
            fixtures::submission("t-1"),
            fixtures::submission("t-2"),
            fixtures::submission("t-1"),
        ])
        .await;

    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(matches!(
        results[2],
        Err(DispatchError::DuplicateSubmission { .. })
    ));

    for result in results.into_iter().flatten() {
        let job = wait_for_terminal(&dispatcher, &result.job.id).await;
        assert_eq!(job.status, JobStatus::Succeeded);
    }

    dispatcher.stop().await;
}

#[test]
fn test_settlement_kinds_recorded() {
    let harness = TestHarness::new();
    let (ticket, _) = harness.tickets.insert(fixtures::submission("t-1")).unwrap();
    let job = harness
        .jobs
        .create_job(&ticket.id, &[StepName::Summarization])
        .unwrap();
    harness
        .jobs
        .begin_attempt(&job.id, StepName::Summarization, 1)
        .unwrap();

    let error = StepError::from(TransientStepError::Interrupted);
    let job = harness
        .jobs
        .record_attempt(
            &job.id,
            StepName::Summarization,
            1,
            &AttemptSettlement::failed(&error, false, error.to_string()),
        )
        .unwrap();

    let record = job.step(StepName::Summarization).unwrap();
    assert_eq!(record.status, StepStatus::FailedRetryable);
    assert_eq!(record.history[0].error_kind.as_deref(), Some("interrupted"));
    assert!(harness.db_path.exists());
}

/// A handler that panics on every call.
struct PanickingStep(StepName);

#[async_trait]
impl StepHandler for PanickingStep {
    fn step(&self) -> StepName {
        self.0
    }

    async fn run(&self, _input: &StepInput) -> Result<StepOutput, StepError> {
        panic!("keyword table corrupted");
    }
}

/// Job store whose next `begin_attempt` for one step fails with a
/// database error.
struct FailingBeginStore {
    inner: Arc<SqliteJobStore>,
    step: StepName,
    armed: AtomicBool,
}

impl JobStore for FailingBeginStore {
    fn create_job(&self, ticket_id: &str, steps: &[StepName]) -> Result<Job, JobError> {
        self.inner.create_job(ticket_id, steps)
    }

    fn get_status(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        self.inner.get_status(job_id)
    }

    fn latest_for_ticket(&self, ticket_id: &str) -> Result<Option<Job>, JobError> {
        self.inner.latest_for_ticket(ticket_id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        self.inner.list(filter)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        self.inner.count(filter)
    }

    fn mark_running(&self, job_id: &str) -> Result<Job, JobError> {
        self.inner.mark_running(job_id)
    }

    fn begin_attempt(&self, job_id: &str, step: StepName, attempt: u32) -> Result<Job, JobError> {
        if step == self.step && self.armed.swap(false, Ordering::SeqCst) {
            return Err(JobError::Database("disk I/O error".to_string()));
        }
        self.inner.begin_attempt(job_id, step, attempt)
    }

    fn record_attempt(
        &self,
        job_id: &str,
        step: StepName,
        attempt: u32,
        settlement: &AttemptSettlement,
    ) -> Result<Job, JobError> {
        self.inner.record_attempt(job_id, step, attempt, settlement)
    }

    fn request_cancel(&self, job_id: &str) -> Result<Job, JobError> {
        self.inner.request_cancel(job_id)
    }

    fn mark_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job, JobError> {
        self.inner.mark_terminal(job_id, status, error)
    }
}

#[tokio::test]
async fn test_panicking_handler_fails_job_and_frees_slot() {
    let harness = TestHarness::new();
    let mut executor = TestHarness::scripted_executor(vec![], 500);
    executor.register(Arc::new(PanickingStep(StepName::KeywordExtraction)));
    let config = DispatcherConfig {
        max_concurrent_jobs: 1,
        ..TestHarness::config()
    };
    let dispatcher = harness.dispatcher_with(config, executor);
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let record = job.step(StepName::KeywordExtraction).unwrap();
    assert_eq!(record.status, StepStatus::FailedTerminal);
    assert_eq!(record.attempts, 1);
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .contains("keyword table corrupted"));
    assert_eq!(status_of(&job, StepName::Indexing), StepStatus::NotStarted);

    // The slot and the ticket are free again.
    wait_for_job(&dispatcher, &outcome.job.id, |_| dispatcher.status().available_slots == 1).await;
    let second = dispatcher.reclassify("t-1").await.unwrap();
    assert_eq!(
        wait_for_terminal(&dispatcher, &second.id).await.status,
        JobStatus::Failed
    );

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_store_error_fails_job() {
    let harness = TestHarness::new();
    let store = Arc::new(FailingBeginStore {
        inner: harness.jobs.clone(),
        step: StepName::UrgencyClassification,
        armed: AtomicBool::new(true),
    });
    let dispatcher = Dispatcher::new(
        TestHarness::config(),
        PipelineDefinition::classify_ticket(),
        Arc::new(TestHarness::scripted_executor(vec![], 2_000)),
        store,
        harness.tickets.clone(),
        None,
    )
    .unwrap();
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("disk I/O error"));

    // The ticket is not left blocked by the failed job.
    let retry = dispatcher.reclassify("t-1").await.unwrap();
    assert_eq!(
        wait_for_terminal(&dispatcher, &retry.id).await.status,
        JobStatus::Succeeded
    );

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_cancel_during_indexing_reports_success() {
    let harness = TestHarness::new();
    let gate = Arc::new(Semaphore::new(0));
    let indexing = Arc::new(ScriptedStep::succeeding(StepName::Indexing).with_gate(gate.clone()));
    let dispatcher = harness.dispatcher(TestHarness::scripted_executor(vec![indexing], 5_000));
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    wait_for_job(&dispatcher, &outcome.job.id, |job| {
        status_of(job, StepName::Indexing) == StepStatus::InProgress
    })
    .await;

    let snapshot = dispatcher.cancel(&outcome.job.id).await.unwrap();
    assert!(snapshot.cancel_requested);
    gate.add_permits(1);

    // Indexing was acknowledged, so nothing was skipped.
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.steps.iter().all(|r| r.status == StepStatus::Succeeded));
    assert!(ClassificationResult::from_job(&job).is_some());

    dispatcher.stop().await;
}

fn indexing_budget_config() -> DispatcherConfig {
    let retry = |max_attempts| RetryConfig {
        max_attempts,
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_multiplier: 2.0,
    };
    DispatcherConfig {
        retry: retry(2),
        indexing_retry: retry(4),
        ..Default::default()
    }
}

fn assert_classified(job: &Job) {
    for step in StepName::ALL.into_iter().filter(|s| *s != StepName::Indexing) {
        assert_eq!(status_of(job, step), StepStatus::Succeeded, "step {}", step);
        assert_eq!(job.step(step).unwrap().attempts, 1, "step {}", step);
    }
}

#[tokio::test]
async fn test_indexing_retried_on_its_own_budget() {
    let harness = TestHarness::new();
    let indexing = Arc::new(ScriptedStep::succeeding(StepName::Indexing));
    for _ in 0..3 {
        indexing.push_failure(IndexingError::Unavailable("qdrant restarting".to_string()).into());
    }
    let dispatcher = harness.dispatcher_with(
        indexing_budget_config(),
        TestHarness::scripted_executor(vec![indexing.clone()], 2_000),
    );
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    // Three failures exceed the classification budget of two, not the
    // indexing budget of four.
    assert_eq!(job.status, JobStatus::Succeeded);
    let record = job.step(StepName::Indexing).unwrap();
    assert_eq!(record.attempts, 4);
    assert_eq!(record.history[0].status, StepStatus::FailedRetryable);
    assert_eq!(record.history[3].status, StepStatus::Succeeded);
    assert_eq!(indexing.calls(), 4);
    assert_classified(&job);

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_indexing_budget_exhausted() {
    let harness = TestHarness::new();
    let indexing = Arc::new(ScriptedStep::failing(
        StepName::Indexing,
        IndexingError::Unavailable("qdrant down".to_string()).into(),
    ));
    let dispatcher = harness.dispatcher_with(
        indexing_budget_config(),
        TestHarness::scripted_executor(vec![indexing.clone()], 2_000),
    );
    dispatcher.start().await.unwrap();

    let outcome = dispatcher.submit(fixtures::submission("t-1")).await.unwrap();
    let job = wait_for_terminal(&dispatcher, &outcome.job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let record = job.step(StepName::Indexing).unwrap();
    assert_eq!(record.status, StepStatus::FailedTerminal);
    assert_eq!(record.attempts, 4);
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("retry budget exhausted after 4 attempts"));
    assert_eq!(indexing.calls(), 4);
    assert_classified(&job);
    assert!(ClassificationResult::from_job(&job).is_none());

    dispatcher.stop().await;
}
