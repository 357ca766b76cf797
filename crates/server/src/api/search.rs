//! Semantic search API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use triage_core::{AuditEvent, SearchRequest, SearchResponse};

use super::error::ApiError;
use crate::state::AppState;

/// Index statistics
#[derive(Debug, Serialize)]
pub struct SearchStatsResponse {
    pub backend: String,
    pub dimension: usize,
    pub indexed_tickets: u64,
}

/// Find indexed tickets similar to a free-text query
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let response = state.search().search(request).await?;

    state.audit().try_emit(AuditEvent::SemanticSearchExecuted {
        query: response.query.clone(),
        top_k: response.top_k,
        threshold: response.threshold,
        results_count: response.hits.len() as u32,
        duration_ms: start.elapsed().as_millis() as u64,
    });

    Ok(Json(response))
}

/// Index backend and size
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SearchStatsResponse>, ApiError> {
    let indexer = state.search().indexer();
    let indexed_tickets = indexer
        .count()
        .await
        .map_err(|e| ApiError::new(axum::http::StatusCode::BAD_GATEWAY, e.to_string()))?;

    Ok(Json(SearchStatsResponse {
        backend: indexer.backend().to_string(),
        dimension: indexer.dimension(),
        indexed_tickets,
    }))
}
