//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use triage_core::{ClassificationResult, Job, JobFilter, JobStatus};

use super::error::ApiError;
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status ("pending", "running", "succeeded", "failed", "cancelled")
    pub status: Option<String>,
    /// Filter by ticket
    pub ticket_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List jobs, newest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut base_filter = JobFilter::new();

    if let Some(ref status) = params.status {
        let status: JobStatus = status.parse().map_err(ApiError::bad_request)?;
        base_filter = base_filter.with_status(status);
    }

    if let Some(ref ticket_id) = params.ticket_id {
        base_filter = base_filter.with_ticket_id(ticket_id);
    }

    let query_filter = base_filter.clone().with_limit(limit).with_offset(offset);

    let jobs = state.dispatcher().list_jobs(&query_filter)?;
    let total = state.dispatcher().count_jobs(&base_filter)?;

    Ok(Json(ListJobsResponse {
        jobs,
        total,
        limit,
        offset,
    }))
}

/// Current snapshot of a job
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.dispatcher().job_status(&id)?))
}

/// Classification of a succeeded job
pub async fn get_job_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ClassificationResult>, ApiError> {
    let job = state.dispatcher().job_status(&id)?;
    if job.status != JobStatus::Succeeded {
        return Err(ApiError::conflict(format!(
            "job {} is {}, results are available once it succeeds",
            job.id, job.status
        )));
    }

    ClassificationResult::from_job(&job)
        .map(Json)
        .ok_or_else(|| ApiError::internal(format!("job {} is missing step outputs", job.id)))
}

/// Request cancellation of a job (DELETE endpoint)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.dispatcher().cancel(&id).await?))
}
