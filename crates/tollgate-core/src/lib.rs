//! Tollgate access control core.
//!
//! This crate provides credential storage and password verification, signed
//! bearer tokens with key rotation, API key validation, scope and role
//! authorization, per-identity rate limiting, and the
//! [`AccessControlGateway`] that composes them for each request.

pub mod apikey;
pub mod authenticator;
pub mod authz;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod metrics;
pub mod pool;
pub mod ratelimit;
pub mod token;

pub use apikey::{hash_api_key, ApiKeyValidator};
pub use authenticator::Authenticator;
pub use authz::{AuthorizationEngine, EndpointPolicy, DEFAULT_RESOURCE_CLASS};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AccessConfig, PasswordPolicy, PoolConfig, RateLimitAlgorithm, RateLimitConfig, TokenConfig,
    LOGIN_RESOURCE_CLASS, REGISTER_RESOURCE_CLASS,
};
pub use credential::{
    normalize_username, ApiKeyRecord, CredentialStore, User, UserStats, API_KEY_PREFIX,
};
pub use error::{AuthError, AuthResult};
pub use gateway::{AccessControlGateway, Credentials};
pub use identity::{parse_roles, parse_scopes, Identity, IdentityKind, Role, RoleSet, ScopeSet};
pub use metrics::AuthMetrics;
pub use pool::BlockingPool;
pub use ratelimit::RateLimiter;
pub use token::{Claims, IssuedToken, TokenService};
