//! Tollgate HTTP gateway.
//!
//! This crate exposes the access control core over HTTP: registration,
//! password login for bearer tokens, API key management, admin operations,
//! and example protected endpoints guarded by scope, role and rate limit.

pub mod config;
pub mod error;
pub mod json;
pub mod routes;

pub use config::{AdminBootstrap, Args, GatewayConfig};
pub use error::ApiError;

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::Router;
use tollgate_core::{
    parse_scopes, AccessControlGateway, AuthError, AuthResult, Role, SharedClock, User,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Scopes granted to the startup administrator in addition to the defaults.
pub const ADMIN_SCOPES: &str = "admin items:read items:write keys:manage";

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Access control entry point.
    pub gateway: Arc<AccessControlGateway>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: GatewayConfig) -> AuthResult<Self> {
        let gateway = AccessControlGateway::new(&config.access)?;
        Ok(Self {
            gateway: Arc::new(gateway),
            config,
        })
    }

    /// Create application state with an explicit clock.
    pub fn with_clock(config: GatewayConfig, clock: SharedClock) -> AuthResult<Self> {
        let gateway = AccessControlGateway::with_clock(&config.access, clock)?;
        Ok(Self {
            gateway: Arc::new(gateway),
            config,
        })
    }

    /// Create the configured administrator, if any.
    ///
    /// An existing account with the same name is left untouched.
    pub async fn bootstrap_admin(&self) -> AuthResult<Option<User>> {
        let Some(admin) = &self.config.admin else {
            return Ok(None);
        };

        let roles = [Role::Admin, Role::User].into_iter().collect();
        let mut scopes = self.config.access.default_scopes.clone();
        scopes.extend(parse_scopes(ADMIN_SCOPES));

        match self
            .gateway
            .register_with(&admin.username, &admin.password, roles, scopes)
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = %user.id, username = %user.username, "administrator created");
                Ok(Some(user))
            }
            Err(AuthError::DuplicateUsername) => {
                tracing::warn!(username = %admin.username, "administrator already exists");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let hardening = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ));

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::token::routes())
        .merge(routes::users::routes())
        .merge(routes::protected::routes())
        .merge(routes::admin::routes())
        .merge(routes::api_keys::routes())
        .layer(hardening)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
