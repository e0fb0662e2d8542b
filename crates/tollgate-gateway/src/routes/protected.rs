//! Example resource guarded by scopes.

use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use serde_json::json;
use tollgate_core::EndpointPolicy;

use super::authorize;
use crate::error::ApiError;
use crate::json::ProtectedResponse;
use crate::AppState;

/// Rate limit class of the protected resource.
pub const ITEMS_RESOURCE_CLASS: &str = "items";

/// Protected resource routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/protected", get(read_items).post(write_item))
}

/// Requires `items:read`.
async fn read_items(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProtectedResponse>, ApiError> {
    let policy = EndpointPolicy::scope("items:read").with_resource_class(ITEMS_RESOURCE_CLASS);
    let identity = authorize(&state, &headers, &policy)?;

    Ok(Json(ProtectedResponse {
        message: "protected data".to_string(),
        subject: identity.subject,
        data: json!({
            "items": [
                {"id": 1, "name": "alpha"},
                {"id": 2, "name": "beta"},
            ]
        }),
    }))
}

/// Requires `items:write`.
async fn write_item(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProtectedResponse>, ApiError> {
    let policy = EndpointPolicy::scope("items:write").with_resource_class(ITEMS_RESOURCE_CLASS);
    let identity = authorize(&state, &headers, &policy)?;

    Ok(Json(ProtectedResponse {
        message: "action completed".to_string(),
        subject: identity.subject,
        data: json!({ "status": "completed" }),
    }))
}
