use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::session::{AdmitError, SubmitError},
};

/// Errors that can occur in service layer operations.
///
/// Every rejection is terminal for the request that caused it and leaves the
/// session state untouched; none of these crash the owning session.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend failed while servicing a read the request depends on.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No session exists under the requested code.
    #[error("session not found: {0}")]
    NotFound(String),
    /// All predictor slots are taken and spectator admission is disabled.
    #[error("session is full")]
    SessionFull,
    /// Handle is unknown, was removed, or belongs to a spectator.
    #[error("handle is not an active predictor")]
    NotAPredictor,
    /// The handle already submitted a prediction.
    #[error("prediction already submitted")]
    AlreadySubmitted,
    /// Prediction content trims to the empty string.
    #[error("prediction content is empty")]
    EmptyContent,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Code generation kept colliding; retried internally before surfacing.
    #[error("could not allocate a unique session code")]
    CodeAllocation,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<AdmitError> for ServiceError {
    fn from(err: AdmitError) -> Self {
        match err {
            AdmitError::SessionFull => ServiceError::SessionFull,
        }
    }
}

impl From<SubmitError> for ServiceError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::NotAPredictor => ServiceError::NotAPredictor,
            SubmitError::AlreadySubmitted => ServiceError::AlreadySubmitted,
            SubmitError::EmptyContent => ServiceError::EmptyContent,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The caller is not entitled to the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::SessionFull => AppError::Conflict("session is full".into()),
            ServiceError::NotAPredictor => {
                AppError::Forbidden("handle is not an active predictor".into())
            }
            ServiceError::AlreadySubmitted => {
                AppError::Conflict("prediction already submitted".into())
            }
            ServiceError::EmptyContent => {
                AppError::BadRequest("prediction content is empty".into())
            }
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::CodeAllocation => {
                AppError::Internal("could not allocate a unique session code".into())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_expected_statuses() {
        let cases = [
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::SessionFull, StatusCode::CONFLICT),
            (ServiceError::NotAPredictor, StatusCode::FORBIDDEN),
            (ServiceError::AlreadySubmitted, StatusCode::CONFLICT),
            (ServiceError::EmptyContent, StatusCode::BAD_REQUEST),
            (
                ServiceError::InvalidInput("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::CodeAllocation,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let app: AppError = err.into();
            let response = app.into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
