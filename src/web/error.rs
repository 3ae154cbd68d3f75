use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::domain::error::DomainError;

/// Handler-level error: either a domain outcome with a defined HTTP mapping
/// or an internal failure that must not leak detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Domain(DomainError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Domain(DomainError::BadContent(_)) => StatusCode::BAD_REQUEST,
            ApiError::Domain(DomainError::Forbidden) => StatusCode::FORBIDDEN,
            ApiError::Domain(DomainError::Conflict) => StatusCode::CONFLICT,
            ApiError::Domain(DomainError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::Domain(DomainError::NotFound) => "not_found",
            ApiError::Domain(DomainError::BadContent(_)) => "bad_content",
            ApiError::Domain(DomainError::Forbidden) => "forbidden",
            ApiError::Domain(DomainError::Conflict) => "conflict",
            ApiError::Domain(DomainError::Validation(_)) => "validation_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let message = match &self {
            // Internals are logged, not echoed.
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.error_code(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}
