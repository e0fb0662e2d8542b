//! JSON request and response types for the HTTP gateway.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tollgate_core::{ApiKeyRecord, Identity, IdentityKind, IssuedToken, Role, User, UserStats};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status.
    pub status: String,
    /// Gateway version.
    pub version: String,
    /// Number of registered users.
    pub users: usize,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Requested username.
    pub username: String,
    /// Plaintext password.
    pub password: String,
}

/// Registration response.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    /// New user id.
    pub id: String,
    /// Normalized username.
    pub username: String,
}

impl From<&User> for RegisteredUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

/// OAuth2 password grant form.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    /// Username.
    pub username: String,
    /// Plaintext password.
    pub password: String,
    /// Space-delimited requested scopes.
    #[serde(default)]
    pub scope: String,
}

/// Token response.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Encoded bearer token.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: &'static str,
    /// Seconds until the token expires.
    pub expires_in: u64,
    /// Space-delimited granted scopes.
    pub scope: String,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            scope: join_scopes(issued.claims.scopes.iter()),
            access_token: issued.raw,
            token_type: "bearer",
            expires_in: issued.expires_in,
        }
    }
}

/// Public view of a user.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    /// User id.
    pub id: String,
    /// Username.
    pub username: String,
    /// Granted roles.
    pub roles: Vec<Role>,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Whether the account is disabled.
    pub disabled: bool,
    /// Registration time (Unix seconds).
    pub created_at: u64,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            roles: user.roles.into_iter().collect(),
            scopes: user.scopes.into_iter().collect(),
            disabled: user.disabled,
            created_at: user.created_at,
        }
    }
}

/// Administrative account totals.
#[derive(Debug, Serialize)]
pub struct AdminStats {
    /// Registered users.
    pub total_users: usize,
    /// Soft-disabled users.
    pub disabled_users: usize,
    /// Users holding each role.
    pub roles_count: BTreeMap<Role, usize>,
    /// Provisioned API keys, revoked included.
    pub total_api_keys: usize,
    /// API keys not revoked.
    pub active_api_keys: usize,
    /// Username of the calling administrator.
    pub requested_by: String,
}

impl AdminStats {
    /// Build from store totals.
    pub fn new(stats: UserStats, requested_by: String) -> Self {
        Self {
            total_users: stats.total_users,
            disabled_users: stats.disabled_users,
            roles_count: stats.roles,
            total_api_keys: stats.total_api_keys,
            active_api_keys: stats.active_api_keys,
            requested_by,
        }
    }
}

/// The caller as seen by access control.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    /// User id (the key owner for API keys).
    pub subject: String,
    /// Username of the subject, if it still exists.
    pub username: Option<String>,
    /// `user` or `api_key`.
    pub kind: &'static str,
    /// API key id for key identities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Roles carried by the credential.
    pub roles: Vec<Role>,
    /// Scopes carried by the credential.
    pub scopes: Vec<String>,
}

impl IdentityResponse {
    /// Build from a verified identity and the subject's username.
    pub fn new(identity: Identity, username: Option<String>) -> Self {
        let (kind, key_id) = match identity.kind {
            IdentityKind::User => ("user", None),
            IdentityKind::ApiKey { key_id } => ("api_key", Some(key_id)),
        };
        Self {
            subject: identity.subject,
            username,
            kind,
            key_id,
            roles: identity.roles.into_iter().collect(),
            scopes: identity.scopes.into_iter().collect(),
        }
    }
}

/// Role and scope grant request.
#[derive(Debug, Default, Deserialize)]
pub struct GrantRequest {
    /// Roles to add.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Scopes to add.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// API key provisioning request.
#[derive(Debug, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    /// Requested scopes; narrowed to the caller's scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// API key metadata.
#[derive(Debug, Serialize)]
pub struct ApiKeyInfo {
    /// Key id.
    pub id: String,
    /// Owner user id.
    pub owner_id: String,
    /// Scopes carried by the key.
    pub scopes: Vec<String>,
    /// Whether the key is revoked.
    pub revoked: bool,
    /// Provisioning time (Unix seconds).
    pub created_at: u64,
}

impl From<ApiKeyRecord> for ApiKeyInfo {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            scopes: record.scopes.into_iter().collect(),
            revoked: record.revoked,
            created_at: record.created_at,
        }
    }
}

/// Newly provisioned API key. The raw key is only returned here.
#[derive(Debug, Serialize)]
pub struct CreatedApiKey {
    /// Raw key to present in `X-API-Key`.
    pub api_key: String,
    /// Key metadata.
    #[serde(flatten)]
    pub info: ApiKeyInfo,
}

/// Response from a protected endpoint.
#[derive(Debug, Serialize)]
pub struct ProtectedResponse {
    /// Outcome message.
    pub message: String,
    /// Caller subject.
    pub subject: String,
    /// Result payload.
    pub data: serde_json::Value,
}

fn join_scopes<'a>(scopes: impl Iterator<Item = &'a String>) -> String {
    scopes.map(String::as_str).collect::<Vec<_>>().join(" ")
}
