//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the admin API.

use axum::extract::FromRequest;
use chrono::{DateTime, Utc};
use keygate_core::ValidationError;

use crate::error::ApiError;

pub mod api_keys;
pub mod health;
pub mod session;
pub mod settings;
pub mod tokens;

/// JSON body extractor whose rejections use the API error format.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Convert wire Unix seconds to a timestamp.
pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp(secs, 0).ok_or(ValidationError::Expiry(secs))
}
