//! Error responses of the task API.

use crate::store::TaskStoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
}

/// Reasons a task API request fails.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body or query is invalid.
    #[error("{0}")]
    Validation(String),

    /// No task with this id.
    #[error("Task not found")]
    NotFound(u64),

    /// The task store failed.
    #[error("{action}")]
    Store {
        /// What the handler was doing, e.g. "Failed to create task".
        action: &'static str,
        /// The underlying failure.
        #[source]
        source: TaskStoreError,
    },

    /// Deliberate failure from `/api/simulate-error`.
    #[error("This is a simulated error")]
    Simulated,
}

impl ApiError {
    /// Wraps a store failure with what the handler was doing.
    pub fn store(action: &'static str) -> impl FnOnce(TaskStoreError) -> Self {
        move |source| Self::Store { action, source }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store { .. } | Self::Simulated => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}
