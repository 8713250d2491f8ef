use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::errors::ExamError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ExamError> for ApiError {
    fn from(err: ExamError) -> Self {
        tracing::debug!(kind = err.kind(), error = %err, "Exam operation rejected");
        match err {
            ExamError::NotFound(message) => ApiError::NotFound(message),
            ExamError::Forbidden(message) => ApiError::Forbidden(message),
            ExamError::Store(source) => ApiError::internal(source, "Exam storage failure"),
            ExamError::NotOpen
            | ExamError::OutsideWindow(_)
            | ExamError::AlreadySubmitted
            | ExamError::InvalidDefinition(_)
            | ExamError::Invalid(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) | ApiError::Forbidden(message) => message.to_string(),
            ApiError::BadRequest(message) | ApiError::NotFound(message) => message,
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}
