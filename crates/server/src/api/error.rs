//! JSON error responses shared by the API handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use triage_core::{DispatchError, IndexingError, SearchError};

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A status code plus the message sent as `{ "error": ... }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "Request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        let status = match &e {
            DispatchError::Invalid(_) => StatusCode::BAD_REQUEST,
            DispatchError::DuplicateSubmission { .. } | DispatchError::NotCancellable { .. } => {
                StatusCode::CONFLICT
            }
            DispatchError::TicketNotFound(_) | DispatchError::JobNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Pipeline(_) | DispatchError::Job(_) | DispatchError::Ticket(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        let status = match &e {
            SearchError::EmptyQuery
            | SearchError::InvalidTopK { .. }
            | SearchError::InvalidThreshold(_)
            | SearchError::Index(IndexingError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            SearchError::Embedding(_) | SearchError::Index(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, e.to_string())
    }
}
