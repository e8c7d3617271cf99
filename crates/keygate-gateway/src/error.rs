//! API error types and responses.
//!
//! Every admin error is rendered as `{"error": {"code", "message"}}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use keygate_auth::AuthError;
use keygate_control::ControlError;
use keygate_core::ValidationError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials or session.
    #[error("{0}")]
    Unauthorized(String),

    /// Admin login is not available.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The credential store did not answer in time. Safe to retry.
    #[error("store unavailable")]
    StoreUnavailable,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Generic rejection used at the API-key boundary.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized("unauthorized".to_string())
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::StoreUnavailable => "store_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::LoginDisabled => Self::Forbidden(err.to_string()),
            AuthError::MissingCredentials
            | AuthError::InvalidCredentials
            | AuthError::SessionInvalid
            | AuthError::SessionExpired => Self::Unauthorized(err.to_string()),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::KeyNotFound(fp) => Self::NotFound(format!("api key {fp}")),
            ControlError::TokenNotFound(masked) => Self::NotFound(format!("token {masked}")),
            ControlError::Validation(e) => Self::BadRequest(e.to_string()),
            ControlError::StoreUnavailable(msg) => {
                tracing::warn!(error = %msg, "Credential store unavailable");
                Self::StoreUnavailable
            }
            ControlError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                Self::Internal(msg)
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
