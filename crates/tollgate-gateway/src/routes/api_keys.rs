//! API key management for the calling user.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use tollgate_core::{EndpointPolicy, Role, ScopeSet};

use super::authorize;
use crate::error::ApiError;
use crate::json::{ApiKeyInfo, CreateApiKeyRequest, CreatedApiKey};
use crate::AppState;

/// Scope required to manage API keys.
pub const KEYS_SCOPE: &str = "keys:manage";

/// API key routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api-keys", post(create_key).get(list_keys))
        .route("/api-keys/:id", delete(revoke_key))
}

/// Provision a key owned by the caller.
///
/// The key's scopes never exceed the scopes of the calling credential.
async fn create_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKey>), ApiError> {
    let identity = authorize(&state, &headers, &EndpointPolicy::scope(KEYS_SCOPE))?;

    let requested: ScopeSet = if request.scopes.is_empty() {
        identity.scopes.clone()
    } else {
        request.scopes.into_iter().collect()
    };
    let scopes: ScopeSet = requested.intersection(&identity.scopes).cloned().collect();

    let (raw_key, record) = state
        .gateway
        .store()
        .provision_api_key(&identity.subject, &scopes)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKey {
            api_key: raw_key,
            info: ApiKeyInfo::from(record),
        }),
    ))
}

/// List keys owned by the caller.
async fn list_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ApiKeyInfo>>, ApiError> {
    let identity = authorize(&state, &headers, &EndpointPolicy::scope(KEYS_SCOPE))?;
    let keys = state
        .gateway
        .store()
        .list_api_keys(&identity.subject)
        .into_iter()
        .map(ApiKeyInfo::from)
        .collect();
    Ok(Json(keys))
}

/// Revoke a key. Only the owner or an admin may revoke; other callers see
/// the key as missing.
async fn revoke_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let identity = authorize(&state, &headers, &EndpointPolicy::scope(KEYS_SCOPE))?;
    let store = state.gateway.store();

    let record = store.get_api_key(&id).ok_or(ApiError::NotFound)?;
    let is_admin = state
        .gateway
        .authz()
        .effective_roles(&identity.roles)
        .contains(&Role::Admin);
    if record.owner_id != identity.subject && !is_admin {
        return Err(ApiError::NotFound);
    }

    store.revoke_api_key(&id)?;
    tracing::info!(key_id = %id, by = %identity.subject, "API key revoked via API");
    Ok(StatusCode::NO_CONTENT)
}
