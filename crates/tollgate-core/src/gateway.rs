//! Per-request access control orchestration.
//!
//! [`AccessControlGateway`] is the single entry point used by the HTTP
//! layer. For a protected request it:
//!
//! 1. authenticates the bearer token, or the API key when no token is given
//! 2. checks the endpoint policy against the identity
//! 3. charges the identity's rate limit bucket for the endpoint's class
//!
//! The first failing step ends the request.

use std::sync::Arc;

use crate::apikey::ApiKeyValidator;
use crate::authenticator::Authenticator;
use crate::authz::{AuthorizationEngine, EndpointPolicy};
use crate::clock::{system_clock, SharedClock};
use crate::config::{AccessConfig, LOGIN_RESOURCE_CLASS};
use crate::credential::{normalize_username, CredentialStore, User};
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, RoleSet, ScopeSet};
use crate::metrics::AuthMetrics;
use crate::pool::BlockingPool;
use crate::ratelimit::RateLimiter;
use crate::token::{IssuedToken, TokenService};

/// Credentials presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token without the scheme prefix.
    pub bearer: Option<String>,
    /// Raw API key.
    pub api_key: Option<String>,
}

impl Credentials {
    /// No credentials.
    pub fn none() -> Self {
        Self::default()
    }

    /// A bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            api_key: None,
        }
    }

    /// An API key.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            bearer: None,
            api_key: Some(key.into()),
        }
    }

    /// Build from raw `Authorization` and `X-API-Key` header values.
    ///
    /// Only the `Bearer` scheme is recognized; other schemes and empty values
    /// are treated as absent.
    pub fn from_headers(authorization: Option<&str>, api_key: Option<&str>) -> Self {
        let bearer = authorization.and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            let token = token.trim();
            (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
        });
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        Self { bearer, api_key }
    }

    /// Whether neither credential is present.
    pub fn is_empty(&self) -> bool {
        self.bearer.is_none() && self.api_key.is_none()
    }
}

/// Composes credential verification, authorization and rate limiting.
pub struct AccessControlGateway {
    store: Arc<CredentialStore>,
    tokens: Arc<TokenService>,
    api_keys: ApiKeyValidator,
    authz: AuthorizationEngine,
    limiter: Arc<RateLimiter>,
    pool: BlockingPool,
    metrics: Arc<AuthMetrics>,
}

impl AccessControlGateway {
    /// Build every component from configuration.
    pub fn new(config: &AccessConfig) -> AuthResult<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Build every component from configuration with a shared clock.
    pub fn with_clock(config: &AccessConfig, clock: SharedClock) -> AuthResult<Self> {
        config.validate()?;

        let store = Arc::new(CredentialStore::from_config(config)?.with_clock(clock.clone()));
        let tokens = Arc::new(TokenService::new(&config.token)?.with_clock(clock.clone()));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone())?.with_clock(clock));

        tracing::info!(
            token_lifetime_secs = tokens.lifetime_secs(),
            rate_window_secs = config.rate_limit.window.as_secs(),
            workers = config.pool.workers,
            queue_depth = config.pool.queue_depth,
            role_hierarchy = config.role_hierarchy,
            "access control initialized"
        );

        Ok(Self {
            api_keys: ApiKeyValidator::new(Arc::clone(&store)),
            authz: AuthorizationEngine::new().with_role_hierarchy(config.role_hierarchy),
            pool: BlockingPool::new(config.pool.clone()),
            metrics: Arc::new(AuthMetrics::new()),
            store,
            tokens,
            limiter,
        })
    }

    /// Credential store.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Token service.
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Authorization engine.
    pub fn authz(&self) -> &AuthorizationEngine {
        &self.authz
    }

    /// Credential worker pool.
    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }

    /// Access control counters.
    pub fn metrics(&self) -> &Arc<AuthMetrics> {
        &self.metrics
    }

    /// Resolve credentials to an identity. A bearer token takes precedence
    /// over an API key.
    pub fn authenticate(&self, credentials: &Credentials) -> AuthResult<Identity> {
        match (&credentials.bearer, &credentials.api_key) {
            (Some(token), _) => self.tokens.authenticate(token),
            (None, Some(key)) => self.api_keys.authenticate(key),
            (None, None) => Err(AuthError::NotAuthenticated),
        }
    }

    /// Authenticate, authorize and rate limit a request.
    pub fn authorize(&self, credentials: &Credentials, policy: &EndpointPolicy) -> AuthResult<Identity> {
        let result = self.authenticate(credentials).and_then(|identity| {
            self.authz.check(&identity, policy)?;
            self.limiter
                .allow(&identity.rate_key(), &policy.resource_class)?;
            Ok(identity)
        });

        match &result {
            Ok(identity) => {
                self.metrics.record_allowed();
                tracing::debug!(
                    subject = %identity.subject,
                    resource_class = %policy.resource_class,
                    "request admitted"
                );
            }
            Err(err) => {
                self.metrics.record_denied(err);
                log_denial(err, policy);
            }
        }

        result
    }

    /// Charge an unauthenticated client against a resource class.
    ///
    /// Clients are keyed as `client:<address>`, separately from identities.
    pub fn throttle_client(&self, client: &str, resource_class: &str) -> AuthResult<()> {
        let result = self
            .limiter
            .allow(&format!("client:{}", client), resource_class);
        if let Err(err) = &result {
            self.metrics.record_failure(err);
            tracing::info!(
                kind = err.kind(),
                client = %client,
                resource_class = %resource_class,
                "client throttled"
            );
        }
        result
    }

    /// Verify a password and issue a token.
    ///
    /// Attempts are charged to the `login` class keyed by the normalized
    /// username before any hashing happens.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        requested_scopes: &ScopeSet,
    ) -> AuthResult<IssuedToken> {
        let result = self.login_inner(username, password, requested_scopes).await;
        match &result {
            Ok(issued) => {
                self.metrics.record_login();
                tracing::info!(user_id = %issued.claims.sub, "login succeeded");
            }
            Err(err) => {
                self.metrics.record_login_failure(err);
                tracing::info!(kind = err.kind(), "login failed");
            }
        }
        result
    }

    async fn login_inner(
        &self,
        username: &str,
        password: &str,
        requested_scopes: &ScopeSet,
    ) -> AuthResult<IssuedToken> {
        let normalized = normalize_username(username);
        self.limiter
            .allow(&format!("login:{}", normalized), LOGIN_RESOURCE_CLASS)?;

        let store = Arc::clone(&self.store);
        let password = password.to_string();
        let user = self
            .pool
            .run(move || store.verify(&normalized, &password))
            .await?;

        self.tokens.issue(&user, requested_scopes)
    }

    /// Register a user with the default roles and scopes.
    pub async fn register(&self, username: &str, password: &str) -> AuthResult<User> {
        let store = Arc::clone(&self.store);
        let (username, password) = (username.to_string(), password.to_string());
        let result = self
            .pool
            .run(move || store.register(&username, &password))
            .await;
        self.record_registration(&result);
        result
    }

    /// Register a user with explicit roles and scopes.
    pub async fn register_with(
        &self,
        username: &str,
        password: &str,
        roles: RoleSet,
        scopes: ScopeSet,
    ) -> AuthResult<User> {
        let store = Arc::clone(&self.store);
        let (username, password) = (username.to_string(), password.to_string());
        let result = self
            .pool
            .run(move || store.register_with(&username, &password, roles, scopes))
            .await;
        self.record_registration(&result);
        result
    }

    /// Replace a user's password.
    pub async fn change_password(&self, user_id: &str, new_password: &str) -> AuthResult<()> {
        let store = Arc::clone(&self.store);
        let (user_id, new_password) = (user_id.to_string(), new_password.to_string());
        self.pool
            .run(move || store.change_password(&user_id, &new_password))
            .await
    }

    fn record_registration(&self, result: &AuthResult<User>) {
        match result {
            Ok(_) => self.metrics.record_registration(),
            Err(err) => {
                self.metrics.record_failure(err);
                tracing::info!(kind = err.kind(), "registration rejected");
            }
        }
    }
}

fn log_denial(err: &AuthError, policy: &EndpointPolicy) {
    match err {
        AuthError::Internal(detail) => {
            tracing::error!(
                kind = err.kind(),
                resource_class = %policy.resource_class,
                detail = %detail,
                "request failed"
            );
        }
        AuthError::RateLimitExceeded { retry_after, .. } => {
            tracing::info!(
                kind = err.kind(),
                resource_class = %policy.resource_class,
                retry_after_ms = retry_after.as_millis() as u64,
                "request denied"
            );
        }
        _ => {
            tracing::info!(
                kind = err.kind(),
                resource_class = %policy.resource_class,
                error = %err,
                "request denied"
            );
        }
    }
}
