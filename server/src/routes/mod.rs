//! HTTP handlers.
//!
//! Handlers are organized by concern:
//! - `jobs`: submit, poll and cancel
//! - `health`: liveness
//! - `debug`: single-stage calls outside any job
//! - `events`: server-sent job events

pub mod debug;
pub mod events;
pub mod health;
pub mod jobs;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use schemalyze::{JobError, SubmitError};

/// Error body returned by every failing request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// A request that could not be served, with the status it maps to.
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
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        let status = match e {
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::InvalidTransition { .. } => StatusCode::CONFLICT,
            JobError::ProgressRegression { .. } | JobError::InvalidProgress(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::MissingField(_) => Self::bad_request(e.to_string()),
            SubmitError::Job(inner) => inner.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("Request failed: {}", self.message);
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use schemalyze::JobStatus;

    #[test]
    fn test_job_error_status() {
        let not_found: ApiError = JobError::NotFound("x".to_string()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let conflict: ApiError = JobError::InvalidTransition {
            id: "x".to_string(),
            from: JobStatus::Completed,
            to: JobStatus::Cancelled,
        }
        .into();
        assert_eq!(conflict.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_missing_field_is_bad_request() {
        let err: ApiError = SubmitError::MissingField("schematicId").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("schematicId"));
    }
}
