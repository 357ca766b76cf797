//! Dispatcher API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use triage_core::DispatcherStatus;

use crate::state::AppState;

/// Dispatcher status response
#[derive(Debug, Serialize)]
pub struct DispatcherStatusResponse {
    /// Name of the pipeline jobs run through
    pub pipeline: String,
    /// Steps in declaration order
    pub steps: Vec<String>,
    #[serde(flatten)]
    pub status: DispatcherStatus,
}

/// Get dispatcher status and job counts
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<DispatcherStatusResponse> {
    let dispatcher = state.dispatcher();
    let pipeline = dispatcher.pipeline();

    Json(DispatcherStatusResponse {
        pipeline: pipeline.name().to_string(),
        steps: pipeline.steps().iter().map(|s| s.to_string()).collect(),
        status: dispatcher.status(),
    })
}
