//! Registration and token issuance.
//!
//! Both routes are charged per client address before any hashing happens.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Form, Json, Router,
};
use tollgate_core::{parse_scopes, LOGIN_RESOURCE_CLASS, REGISTER_RESOURCE_CLASS};

use super::client_address;
use crate::error::ApiError;
use crate::json::{RegisterRequest, RegisteredUser, TokenForm, TokenResponse};
use crate::AppState;

/// Registration and login routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(issue_token))
}

/// Register a new user with the default roles and scopes.
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let client = client_address(&headers, peer.as_ref());
    state
        .gateway
        .throttle_client(&client, REGISTER_RESOURCE_CLASS)?;

    let user = state
        .gateway
        .register(&request.username, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(RegisteredUser::from(&user))))
}

/// OAuth2 password grant.
///
/// Granted scopes are the requested scopes the user actually holds.
async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let client = client_address(&headers, peer.as_ref());
    state.gateway.throttle_client(&client, LOGIN_RESOURCE_CLASS)?;

    let issued = state
        .gateway
        .login(&form.username, &form.password, &parse_scopes(&form.scope))
        .await?;
    Ok(Json(TokenResponse::from(issued)))
}
