//! Credential-to-identity authentication seam.

use crate::error::AuthResult;
use crate::identity::Identity;

/// Trait for turning a presented credential into a verified identity.
///
/// Implemented by [`TokenService`](crate::TokenService) for bearer tokens
/// and [`ApiKeyValidator`](crate::ApiKeyValidator) for API keys.
pub trait Authenticator: Send + Sync {
    /// Verify the credential and return the identity it proves.
    fn authenticate(&self, credential: &str) -> AuthResult<Identity>;
}
