//! Scope and role authorization.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, Role, RoleSet};

/// Resource class used by endpoints that do not name one.
pub const DEFAULT_RESOURCE_CLASS: &str = "default";

/// Access requirements of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    /// Scope the identity must hold.
    pub required_scope: Option<String>,
    /// Roles admitted; `None` admits any role.
    pub allowed_roles: Option<RoleSet>,
    /// Rate limit class of the endpoint.
    pub resource_class: String,
}

impl EndpointPolicy {
    /// Policy that only requires authentication.
    pub fn authenticated() -> Self {
        Self {
            required_scope: None,
            allowed_roles: None,
            resource_class: DEFAULT_RESOURCE_CLASS.to_string(),
        }
    }

    /// Policy that requires a scope.
    pub fn scope(scope: impl Into<String>) -> Self {
        Self::authenticated().with_scope(scope)
    }

    /// Require a scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scope = Some(scope.into());
        self
    }

    /// Restrict to the given roles.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = Some(roles.into_iter().collect());
        self
    }

    /// Set the rate limit class.
    pub fn with_resource_class(mut self, class: impl Into<String>) -> Self {
        self.resource_class = class.into();
        self
    }
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self::authenticated()
    }
}

/// Decides whether an identity may perform an operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationEngine {
    role_hierarchy: bool,
}

impl AuthorizationEngine {
    /// Engine with flat roles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine where admin implies user and user implies viewer.
    pub fn with_role_hierarchy(mut self, enabled: bool) -> Self {
        self.role_hierarchy = enabled;
        self
    }

    /// Whether the role hierarchy is applied.
    pub fn role_hierarchy(&self) -> bool {
        self.role_hierarchy
    }

    /// Roles an identity effectively holds.
    pub fn effective_roles(&self, roles: &RoleSet) -> RoleSet {
        if !self.role_hierarchy {
            return roles.clone();
        }

        let mut effective = RoleSet::new();
        for role in roles {
            match role {
                Role::Admin => effective.extend([Role::Admin, Role::User, Role::Viewer]),
                Role::User => effective.extend([Role::User, Role::Viewer]),
                Role::Viewer => {
                    effective.insert(Role::Viewer);
                }
            }
        }
        effective
    }

    /// Check a scope requirement and an optional role restriction.
    ///
    /// Both checks run; when both fail the scope failure is reported.
    pub fn authorize(
        &self,
        identity: &Identity,
        required_scope: Option<&str>,
        allowed_roles: Option<&RoleSet>,
    ) -> AuthResult<()> {
        let scope_ok = required_scope.map_or(true, |scope| identity.has_scope(scope));
        let role_ok = allowed_roles.map_or(true, |allowed| {
            !self.effective_roles(&identity.roles).is_disjoint(allowed)
        });

        match (scope_ok, role_ok) {
            (true, true) => Ok(()),
            (false, _) => Err(AuthError::InsufficientScope {
                required: required_scope.unwrap_or_default().to_string(),
            }),
            (true, false) => Err(AuthError::RoleNotAllowed),
        }
    }

    /// Apply an endpoint policy.
    pub fn check(&self, identity: &Identity, policy: &EndpointPolicy) -> AuthResult<()> {
        self.authorize(
            identity,
            policy.required_scope.as_deref(),
            policy.allowed_roles.as_ref(),
        )
    }
}
