use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{audit, dispatcher, handlers, jobs, middleware::metrics_middleware, search, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Tickets
        .route("/tickets", post(tickets::submit_ticket).get(tickets::list_tickets))
        .route("/tickets/batch", post(tickets::submit_batch))
        .route("/tickets/{id}", get(tickets::get_ticket))
        .route("/tickets/{id}/job", get(tickets::get_ticket_job))
        .route("/tickets/{id}/reclassify", post(tickets::reclassify_ticket))
        // Sample tickets
        .route("/samples", get(tickets::list_samples))
        .route("/samples/submit", post(tickets::submit_samples))
        // Jobs
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::cancel_job))
        .route("/jobs/{id}/result", get(jobs::get_job_result))
        // Semantic search
        .route("/search", post(search::search))
        .route("/search/stats", get(search::get_stats))
        // Dispatcher
        .route("/dispatcher/status", get(dispatcher::get_status))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
