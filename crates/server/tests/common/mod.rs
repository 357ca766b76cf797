//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! backed by real SQLite stores and a running dispatcher, with the LLM and
//! the embedder replaced by deterministic mocks.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use triage_core::index::InMemoryVectorStore;
use triage_core::testing::{KeywordEmbedder, MockLlmClient, ScriptedStep};
use triage_core::{
    build_executor, create_audit_system, load_config_from_str, AuditStore, Dispatcher,
    DispatcherConfig, Embedder, Job, PipelineDefinition, RetryConfig, SemanticIndexer,
    SemanticSearch, SqliteAuditStore, SqliteJobStore, SqliteTicketStore, StepName, TicketStore,
};
use triage_server::{create_router, AppState};

/// Re-export fixtures for test convenience
pub use triage_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process server with:
/// - A started dispatcher over SQLite job and ticket stores
/// - The scripted LLM (`MockLlmClient`)
/// - A topic embedder and an in-memory vector store
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ticket_submission() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/tickets", json!({
///         "id": "t-1",
///         "text": "My invoice is wrong"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// The running dispatcher behind the router
    pub dispatcher: Arc<Dispatcher>,
    /// Scripted LLM answering the classifier and summary prompts
    pub llm: Arc<MockLlmClient>,
    /// Audit store, shared with the writer task
    pub audit_store: Arc<dyn AuditStore>,
    /// Holds summarization until permits are added (gated fixtures only)
    pub gate: Option<Arc<Semaphore>>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture where every job runs to completion.
    pub async fn new() -> Self {
        Self::build(false).await
    }

    /// Create a test fixture whose jobs stop at summarization until
    /// [`TestFixture::release`] is called.
    pub async fn gated() -> Self {
        Self::build(true).await
    }

    async fn build(gated: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = load_config_from_str(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[llm]
provider = "ollama"
model = "llama3"
"#,
        )
        .expect("Failed to parse test config");
        config.database.path = db_path.clone();
        config.executor.step_timeout_ms = 2_000;
        config.dispatcher = fast_dispatcher_config();

        // Create stores
        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let ticket_store: Arc<dyn TicketStore> = Arc::new(
            SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"),
        );
        let job_store =
            Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));

        // Create audit system
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        // Mocked external services
        let llm = Arc::new(MockLlmClient::new());
        let embedder = Arc::new(KeywordEmbedder::new());
        let indexer = Arc::new(SemanticIndexer::new(
            Arc::new(InMemoryVectorStore::new()),
            embedder.dimension(),
        ));

        let mut executor = build_executor(
            &config.executor,
            llm.clone(),
            &config.llm,
            embedder.clone(),
            indexer.clone(),
        );

        let gate = gated.then(|| Arc::new(Semaphore::new(0)));
        if let Some(ref gate) = gate {
            executor.register(Arc::new(
                ScriptedStep::succeeding(StepName::Summarization).with_gate(gate.clone()),
            ));
        }

        let dispatcher = Arc::new(
            Dispatcher::new(
                config.dispatcher.clone(),
                PipelineDefinition::classify_ticket(),
                Arc::new(executor),
                job_store,
                Arc::clone(&ticket_store),
                Some(audit_handle.clone()),
            )
            .expect("Failed to create dispatcher"),
        );
        dispatcher.start().await.expect("Failed to start dispatcher");

        let search = Arc::new(SemanticSearch::new(
            embedder,
            indexer,
            config.search.clone(),
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&dispatcher),
            ticket_store,
            search,
            audit_handle,
            Arc::clone(&audit_store),
        ));

        let router = create_router(state);

        Self {
            router,
            dispatcher,
            llm,
            audit_store,
            gate,
            temp_dir,
        }
    }

    /// Let `n` gated summarization attempts through.
    pub fn release(&self, n: usize) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until the job is succeeded, failed or cancelled.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Job {
        triage_core::testing::wait_for_terminal(&self.dispatcher, job_id).await
    }

    /// Submit a ticket and wait for its job to finish.
    pub async fn classify(&self, body: Value) -> Job {
        let response = self.post("/api/v1/tickets", body).await;
        assert_eq!(
            response.status,
            StatusCode::ACCEPTED,
            "submission failed: {}",
            response.body
        );
        let job_id = response.body["job"]["id"]
            .as_str()
            .expect("job id missing")
            .to_string();
        self.wait_for_terminal(&job_id).await
    }

    /// Poll the audit endpoint until at least one event of `event_type`
    /// shows up. Returns the response body.
    pub async fn wait_for_audit(&self, query: &str, event_type: &str) -> Value {
        let path = format!("/api/v1/audit?event_type={}&{}", event_type, query);
        for _ in 0..100 {
            let response = self.get(&path).await;
            if response.status == StatusCode::OK
                && response.body["total"].as_i64().unwrap_or(0) > 0
            {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no {} audit event for {}", event_type, path);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch a path and return the raw body text (for non-JSON endpoints).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Dispatcher settings with millisecond backoff so retries finish quickly.
fn fast_dispatcher_config() -> DispatcherConfig {
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

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
