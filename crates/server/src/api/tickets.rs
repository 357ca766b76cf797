//! Ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use triage_core::{
    sample_submissions, DispatchError, Job, SubmissionOutcome, Ticket, TicketFilter,
    TicketSubmission,
};

use super::error::ApiError;
use crate::state::AppState;

/// Maximum allowed limit for ticket queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for ticket queries
const DEFAULT_LIMIT: i64 = 100;

/// Maximum number of submissions in one batch request
const MAX_BATCH: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting many tickets at once
#[derive(Debug, Deserialize)]
pub struct BatchSubmitBody {
    pub tickets: Vec<TicketSubmission>,
}

/// Outcome of one submission in a batch
#[derive(Debug, Serialize)]
pub struct BatchItemResult {
    pub ticket_id: String,
    /// HTTP status the submission would have had on its own
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for batch submission
#[derive(Debug, Serialize)]
pub struct BatchSubmitResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<BatchItemResult>,
}

/// Query parameters for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    /// Filter by language tag
    pub language: Option<String>,
    /// Maximum number of tickets to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<Ticket>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a ticket and queue it for classification
pub async fn submit_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketSubmission>,
) -> Result<(StatusCode, Json<SubmissionOutcome>), ApiError> {
    let outcome = state.dispatcher().submit(body).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// Accept many tickets; each one succeeds or fails on its own
pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchSubmitBody>,
) -> Result<Json<BatchSubmitResponse>, ApiError> {
    if body.tickets.is_empty() {
        return Err(ApiError::bad_request("batch must contain at least one ticket"));
    }
    if body.tickets.len() > MAX_BATCH {
        return Err(ApiError::bad_request(format!(
            "batch holds {} tickets, at most {} allowed",
            body.tickets.len(),
            MAX_BATCH
        )));
    }

    Ok(Json(submit_all(&state, body.tickets).await))
}

/// List the built-in sample tickets
pub async fn list_samples() -> Json<Vec<TicketSubmission>> {
    Json(sample_submissions())
}

/// Submit every built-in sample ticket as one batch
pub async fn submit_samples(State(state): State<Arc<AppState>>) -> Json<BatchSubmitResponse> {
    Json(submit_all(&state, sample_submissions()).await)
}

async fn submit_all(state: &AppState, tickets: Vec<TicketSubmission>) -> BatchSubmitResponse {
    let ids: Vec<String> = tickets.iter().map(|t| t.id.clone()).collect();
    let outcomes = state.dispatcher().submit_batch(tickets).await;
    batch_response(ids, outcomes)
}

fn batch_response(
    ids: Vec<String>,
    outcomes: Vec<Result<SubmissionOutcome, DispatchError>>,
) -> BatchSubmitResponse {
    let results: Vec<BatchItemResult> = ids
        .into_iter()
        .zip(outcomes)
        .map(|(ticket_id, outcome)| match outcome {
            Ok(outcome) => BatchItemResult {
                ticket_id,
                status: StatusCode::ACCEPTED.as_u16(),
                job: Some(outcome.job),
                error: None,
            },
            Err(e) => {
                let e = ApiError::from(e);
                BatchItemResult {
                    ticket_id,
                    status: e.status.as_u16(),
                    job: None,
                    error: Some(e.message),
                }
            }
        })
        .collect();

    let accepted = results.iter().filter(|r| r.job.is_some()).count();
    BatchSubmitResponse {
        accepted,
        rejected: results.len() - accepted,
        results,
    }
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    match state.ticket_store().get(&id) {
        Ok(Some(ticket)) => Ok(Json(ticket)),
        Ok(None) => Err(ApiError::not_found(format!("Ticket not found: {}", id))),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}

/// Latest job for a ticket
pub async fn get_ticket_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.dispatcher().ticket_status(&id)?))
}

/// Run the pipeline again for a stored ticket
pub async fn reclassify_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let job = state.dispatcher().reclassify(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// List tickets with optional filters
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTicketsParams>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = TicketFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref language) = params.language {
        filter = filter.with_language(language);
    }

    let tickets = state
        .ticket_store()
        .list(&filter)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    // Get total count (without pagination)
    let count_filter = TicketFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };
    let total = state
        .ticket_store()
        .count(&count_filter)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ListTicketsResponse {
        tickets,
        total,
        limit,
        offset,
    }))
}
