//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Step execution (attempts, durations, retries)
//! - Jobs (outcomes, end-to-end duration, recovery)
//! - Semantic index (upserts, searches)
//! - External services (LLM, embeddings, vector store)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Step Metrics
// =============================================================================

/// Step attempts total by step and outcome.
pub static STEP_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_step_attempts_total", "Total step attempts"),
        &["step", "outcome"], // "succeeded", "failed_retryable", "failed_terminal"
    )
    .unwrap()
});

/// Step attempt duration in seconds.
pub static STEP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "triage_step_duration_seconds",
            "Duration of single step attempts",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["step"],
    )
    .unwrap()
});

/// Retries scheduled total by step.
pub static STEP_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_step_retries_total", "Total step retries scheduled"),
        &["step"],
    )
    .unwrap()
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs created total.
pub static JOBS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("triage_jobs_created_total", "Total jobs created").unwrap()
});

/// Jobs reaching a terminal state, by status.
pub static JOBS_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_jobs_completed_total", "Total jobs reaching a terminal state"),
        &["status"], // "succeeded", "failed", "cancelled"
    )
    .unwrap()
});

/// End-to-end job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("triage_job_duration_seconds", "Duration of jobs")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["status"],
    )
    .unwrap()
});

/// Duplicate submissions rejected.
pub static DUPLICATE_SUBMISSIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_duplicate_submissions_total",
        "Total submissions rejected because the ticket already had an active job",
    )
    .unwrap()
});

/// Jobs re-driven after a restart.
pub static JOBS_RECOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_jobs_recovered_total",
        "Total jobs resumed from a previous process",
    )
    .unwrap()
});

/// Jobs currently driven by the dispatcher.
pub static ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("triage_active_jobs", "Jobs currently driven by the dispatcher").unwrap()
});

// =============================================================================
// Index Metrics
// =============================================================================

/// Index upserts total by backend.
pub static INDEX_UPSERTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_index_upserts_total", "Total index upserts"),
        &["backend"],
    )
    .unwrap()
});

/// Similarity queries total by backend.
pub static SEARCH_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_search_queries_total", "Total similarity queries"),
        &["backend"],
    )
    .unwrap()
});

/// Hits returned per similarity query.
pub static SEARCH_RESULTS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "triage_search_results",
            "Number of hits returned per similarity query",
        )
        .buckets(vec![0.0, 1.0, 3.0, 5.0, 10.0, 25.0, 50.0]),
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "triage_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// LLM tokens used.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record one external call.
pub fn observe_external_call(service: &str, operation: &str, success: bool, elapsed_secs: f64) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(elapsed_secs);
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, if success { "success" } else { "error" }])
        .inc();
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Steps
        Box::new(STEP_ATTEMPTS.clone()),
        Box::new(STEP_DURATION.clone()),
        Box::new(STEP_RETRIES.clone()),
        // Jobs
        Box::new(JOBS_CREATED.clone()),
        Box::new(JOBS_COMPLETED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(DUPLICATE_SUBMISSIONS.clone()),
        Box::new(JOBS_RECOVERED.clone()),
        Box::new(ACTIVE_JOBS.clone()),
        // Index
        Box::new(INDEX_UPSERTS.clone()),
        Box::new(SEARCH_QUERIES.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
    }

    #[test]
    fn test_observe_external_call() {
        let before = EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["test_service", "op", "error"])
            .get();
        observe_external_call("test_service", "op", false, 0.2);
        let after = EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["test_service", "op", "error"])
            .get();
        assert_eq!(after, before + 1);
    }
}
