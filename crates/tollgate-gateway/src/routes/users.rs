//! Endpoints about the calling identity.

use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use tollgate_core::EndpointPolicy;

use super::authorize;
use crate::error::ApiError;
use crate::json::IdentityResponse;
use crate::AppState;

/// Caller routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/users/me", get(current_identity))
}

/// Describe the authenticated caller.
async fn current_identity(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IdentityResponse>, ApiError> {
    let identity = authorize(&state, &headers, &EndpointPolicy::authenticated())?;
    let username = state
        .gateway
        .store()
        .get_user(&identity.subject)
        .map(|user| user.username);
    Ok(Json(IdentityResponse::new(identity, username)))
}
