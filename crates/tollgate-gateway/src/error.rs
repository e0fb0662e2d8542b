//! Error handling for the gateway.
//!
//! Core errors keep their full detail for logging; responses only carry a
//! short `detail` string that does not reveal which check failed inside a
//! status class.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tollgate_core::AuthError;

/// Application error type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Access control failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Resource does not exist or is not visible to the caller.
    #[error("not found")]
    NotFound,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human readable reason.
    pub detail: String,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(err) => auth_status(err),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Auth(err) => auth_detail(err).to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::NotFound => "not found".to_string(),
        }
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials
        | AuthError::NotAuthenticated
        | AuthError::TokenMalformed(_)
        | AuthError::SignatureMismatch
        | AuthError::TokenExpired
        | AuthError::ApiKeyInvalid => StatusCode::UNAUTHORIZED,
        AuthError::InsufficientScope { .. } | AuthError::RoleNotAllowed => StatusCode::FORBIDDEN,
        AuthError::DuplicateUsername => StatusCode::CONFLICT,
        AuthError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::UserNotFound(_) | AuthError::ApiKeyNotFound(_) => StatusCode::NOT_FOUND,
        AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn auth_detail(err: &AuthError) -> &str {
    match err {
        AuthError::InvalidCredentials => "invalid credentials",
        AuthError::NotAuthenticated => "not authenticated",
        AuthError::TokenMalformed(_)
        | AuthError::SignatureMismatch
        | AuthError::TokenExpired
        | AuthError::ApiKeyInvalid => "could not validate credentials",
        AuthError::InsufficientScope { .. } | AuthError::RoleNotAllowed => {
            "not enough permissions"
        }
        AuthError::DuplicateUsername => "username already registered",
        AuthError::RateLimitExceeded { .. } => "rate limit exceeded",
        AuthError::Busy => "service busy, retry later",
        AuthError::UserNotFound(_) | AuthError::ApiKeyNotFound(_) => "not found",
        AuthError::InvalidInput(msg) => msg.as_str(),
        AuthError::Internal(_) => "internal error",
    }
}

/// Whole seconds to wait, rounded up and at least one.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Auth(AuthError::Internal(detail)) = &self {
            tracing::error!(detail = %detail, "internal error");
        }

        let body = ErrorResponse {
            detail: self.detail(),
        };
        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match &self {
            _ if status == StatusCode::UNAUTHORIZED => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            ApiError::Auth(AuthError::RateLimitExceeded { retry_after, .. }) => {
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs(*retry_after)),
                );
            }
            ApiError::Auth(AuthError::Busy) => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(1u64));
            }
            _ => {}
        }

        response
    }
}
