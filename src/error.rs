//! Error types.
//!
//! `AttemptError`, `SubmitError` and `StoreError` are raised by the core;
//! `AppError` is what HTTP handlers return and maps each case onto a status
//! code and a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Lifecycle and state-machine violations for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("unknown test: {0}")]
    UnknownTest(String),

    #[error("test {0} has no questions")]
    EmptyTest(String),

    #[error("unknown attempt: {0}")]
    UnknownAttempt(String),

    #[error("attempt belongs to another user")]
    NotOwner,

    #[error("instructions have not been accepted yet")]
    NotStarted,

    #[error("time is up; answers can no longer change")]
    TimeUp,

    #[error("attempt was already submitted")]
    AlreadySubmitted,

    #[error("a submission is in flight")]
    SubmissionInFlight,

    #[error("question index {0} is out of range")]
    OutOfRange(usize),

    #[error("section {section} has no question {index}")]
    SectionOutOfRange { section: usize, index: usize },
}

/// Failures of the submission pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a submission is already in flight")]
    InFlight,

    #[error("attempt was already submitted")]
    AlreadySubmitted,

    #[error("instructions have not been accepted yet")]
    NotStarted,

    #[error("scoring service unavailable: {0}")]
    Unavailable(String),

    #[error("scoring service rejected the submission: {0}")]
    Rejected(String),

    #[error("could not store report: {0}")]
    Storage(String),
}

impl SubmitError {
    /// True when re-submitting later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitError::Unavailable(_) | SubmitError::Rejected(_) | SubmitError::Storage(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for SubmitError {
    fn from(err: StoreError) -> Self {
        SubmitError::Storage(err.to_string())
    }
}

/// HTTP-facing error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub retryable: bool,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Internal(msg) => {
                error!(target: "testprep_backend", error = %msg, "Internal error");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error: message,
            code: status.as_u16(),
            retryable: matches!(self, AppError::Upstream(_)),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AttemptError> for AppError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::UnknownTest(_) | AttemptError::UnknownAttempt(_) => {
                AppError::NotFound(err.to_string())
            }
            AttemptError::EmptyTest(_) => AppError::Unprocessable(err.to_string()),
            // Do not reveal whether the attempt exists for someone else.
            AttemptError::NotOwner => AppError::Forbidden("Not allowed".into()),
            AttemptError::NotStarted
            | AttemptError::TimeUp
            | AttemptError::AlreadySubmitted
            | AttemptError::SubmissionInFlight => AppError::Conflict(err.to_string()),
            AttemptError::OutOfRange(_) | AttemptError::SectionOutOfRange { .. } => {
                AppError::BadRequest(err.to_string())
            }
        }
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::InFlight | SubmitError::AlreadySubmitted | SubmitError::NotStarted => {
                AppError::Conflict(err.to_string())
            }
            SubmitError::Unavailable(_) | SubmitError::Rejected(_) | SubmitError::Storage(_) => {
                AppError::Upstream(err.to_string())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_errors_map_to_status_codes() {
        let cases = [
            (AttemptError::UnknownTest("x".into()), StatusCode::NOT_FOUND),
            (AttemptError::EmptyTest("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AttemptError::NotOwner, StatusCode::FORBIDDEN),
            (AttemptError::TimeUp, StatusCode::CONFLICT),
            (AttemptError::OutOfRange(9), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn collaborator_failures_are_retryable() {
        let err = SubmitError::Unavailable("timeout".into());
        assert!(err.is_retryable());
        assert_eq!(AppError::from(err).status_code(), StatusCode::BAD_GATEWAY);
        assert!(!SubmitError::InFlight.is_retryable());
    }
}
