//! Roles, scopes and resolved identities.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Coarse-grained identity classification used for endpoint restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrative access.
    Admin,
    /// Regular user.
    User,
    /// Read-only user.
    Viewer,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Viewer];

    /// String form used in tokens and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "viewer" => Ok(Role::Viewer),
            other => Err(AuthError::InvalidInput(format!("unknown role: {}", other))),
        }
    }
}

/// Ordered set of roles.
pub type RoleSet = BTreeSet<Role>;

/// Ordered set of scope names.
pub type ScopeSet = BTreeSet<String>;

/// Parse a space-delimited scope string (`"items:read items:write"`).
pub fn parse_scopes(raw: &str) -> ScopeSet {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Parse a comma-separated role list (`"admin,user"`).
pub fn parse_roles(raw: &str) -> Result<RoleSet, AuthError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Role::from_str)
        .collect()
}

/// How an identity proved itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKind {
    /// Bearer token issued to a user.
    User,
    /// Service-to-service API key.
    ApiKey {
        /// Id of the key record.
        key_id: String,
    },
}

/// A verified caller, ready for authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User id of the caller (the key owner for API keys).
    pub subject: String,
    /// Granted roles.
    pub roles: RoleSet,
    /// Granted scopes.
    pub scopes: ScopeSet,
    /// Credential type.
    pub kind: IdentityKind,
}

impl Identity {
    /// Identity for a token-authenticated user.
    pub fn user(subject: impl Into<String>, roles: RoleSet, scopes: ScopeSet) -> Self {
        Self {
            subject: subject.into(),
            roles,
            scopes,
            kind: IdentityKind::User,
        }
    }

    /// Identity for an API key. Keys carry scopes only.
    pub fn api_key(
        key_id: impl Into<String>,
        owner_id: impl Into<String>,
        scopes: ScopeSet,
    ) -> Self {
        Self {
            subject: owner_id.into(),
            roles: RoleSet::new(),
            scopes,
            kind: IdentityKind::ApiKey {
                key_id: key_id.into(),
            },
        }
    }

    /// Key used to bucket this identity in the rate limiter.
    pub fn rate_key(&self) -> String {
        match &self.kind {
            IdentityKind::User => format!("user:{}", self.subject),
            IdentityKind::ApiKey { key_id } => format!("key:{}", key_id),
        }
    }

    /// Check whether the scope was granted.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Check whether the role was granted.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
