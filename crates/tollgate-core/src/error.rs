//! Access control error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the access control components.
///
/// Variants keep the full internal detail; the HTTP layer collapses them into
/// a small set of opaque responses.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user, wrong password or disabled account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Username already registered.
    #[error("username already exists")]
    DuplicateUsername,

    /// Token could not be decoded structurally.
    #[error("malformed token: {0}")]
    TokenMalformed(String),

    /// Token signature does not verify against any accepted key.
    #[error("token signature mismatch")]
    SignatureMismatch,

    /// Token signature verified but the token is past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// API key is unknown or revoked.
    #[error("invalid API key")]
    ApiKeyInvalid,

    /// Required scope is missing from the identity.
    #[error("insufficient scope: {required} is required")]
    InsufficientScope {
        /// The scope the endpoint requires.
        required: String,
    },

    /// Identity holds none of the roles the endpoint allows.
    #[error("role not allowed")]
    RoleNotAllowed,

    /// Request budget for the current window is exhausted.
    #[error("rate limit exceeded for {resource_class}, retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Resource class whose budget was exhausted.
        resource_class: String,
        /// Time until the budget is replenished.
        retry_after: Duration,
    },

    /// No bearer token or API key was presented.
    #[error("not authenticated")]
    NotAuthenticated,

    /// User id does not exist.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// API key id does not exist.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// Request input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The credential worker pool is saturated; the caller may retry.
    #[error("credential workers busy")]
    Busy,

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::DuplicateUsername => "duplicate_username",
            AuthError::TokenMalformed(_) => "token_malformed",
            AuthError::SignatureMismatch => "signature_mismatch",
            AuthError::TokenExpired => "token_expired",
            AuthError::ApiKeyInvalid => "api_key_invalid",
            AuthError::InsufficientScope { .. } => "insufficient_scope",
            AuthError::RoleNotAllowed => "role_not_allowed",
            AuthError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::UserNotFound(_) => "user_not_found",
            AuthError::ApiKeyNotFound(_) => "api_key_not_found",
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::Busy => "busy",
            AuthError::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::RateLimitExceeded { .. } | AuthError::Busy
        )
    }
}

/// Result type for access control operations.
pub type AuthResult<T> = Result<T, AuthError>;
