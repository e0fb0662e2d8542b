//! Administrative user management.
//!
//! Every route requires the `admin` scope and the `admin` role.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use tollgate_core::{EndpointPolicy, Identity, Role, RoleSet, ScopeSet};

use super::authorize;
use crate::error::ApiError;
use crate::json::{AdminStats, GrantRequest, UserProfile};
use crate::AppState;

/// Rate limit class of admin routes.
pub const ADMIN_RESOURCE_CLASS: &str = "admin";

/// Admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/disable", post(disable_user))
        .route("/admin/users/:id/enable", post(enable_user))
        .route("/admin/users/:id/grants", post(grant))
}

fn admin_policy() -> EndpointPolicy {
    EndpointPolicy::scope("admin")
        .with_roles([Role::Admin])
        .with_resource_class(ADMIN_RESOURCE_CLASS)
}

fn authorize_admin(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    authorize(state, headers, &admin_policy())
}

fn profile(state: &AppState, id: &str) -> Result<Json<UserProfile>, ApiError> {
    let user = state.gateway.store().get_user(id).ok_or(ApiError::NotFound)?;
    Ok(Json(UserProfile::from(user)))
}

/// Account totals and per-role counts.
async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminStats>, ApiError> {
    let caller = authorize_admin(&state, &headers)?;
    let store = state.gateway.store();
    let requested_by = store
        .get_user(&caller.subject)
        .map(|user| user.username)
        .unwrap_or(caller.subject);
    Ok(Json(AdminStats::new(store.stats(), requested_by)))
}

/// List every user.
async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    authorize_admin(&state, &headers)?;
    let users = state
        .gateway
        .store()
        .list_users()
        .into_iter()
        .map(UserProfile::from)
        .collect();
    Ok(Json(users))
}

/// Soft-disable a user.
async fn disable_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = authorize_admin(&state, &headers)?;
    if caller.subject == id {
        return Err(ApiError::BadRequest("cannot disable the calling account".into()));
    }

    state.gateway.store().set_disabled(&id, true)?;
    tracing::info!(admin = %caller.subject, user_id = %id, "user disabled");
    profile(&state, &id)
}

/// Re-enable a user.
async fn enable_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = authorize_admin(&state, &headers)?;
    state.gateway.store().set_disabled(&id, false)?;
    tracing::info!(admin = %caller.subject, user_id = %id, "user enabled");
    profile(&state, &id)
}

/// Add roles and scopes to a user.
async fn grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = authorize_admin(&state, &headers)?;
    let store = state.gateway.store();

    let roles: RoleSet = request.roles.into_iter().collect();
    let scopes: ScopeSet = request
        .scopes
        .into_iter()
        .map(|scope| scope.trim().to_string())
        .filter(|scope| !scope.is_empty())
        .collect();

    store.grant_roles(&id, &roles)?;
    let user = store.grant_scopes(&id, &scopes)?;
    tracing::info!(
        admin = %caller.subject,
        user_id = %id,
        roles = roles.len(),
        scopes = scopes.len(),
        "grants added"
    );
    Ok(Json(UserProfile::from(user)))
}
