//! API key validation.
//!
//! Raw keys are hashed with BLAKE3 and looked up by hash. Equality on
//! [`blake3::Hash`] is constant-time, so lookups do not leak how much of a
//! stored hash matched.

use std::sync::Arc;

use crate::authenticator::Authenticator;
use crate::credential::{ApiKeyRecord, CredentialStore};
use crate::error::{AuthError, AuthResult};
use crate::identity::Identity;

/// Hash a raw API key for storage and lookup.
pub fn hash_api_key(raw_key: &str) -> blake3::Hash {
    blake3::hash(raw_key.as_bytes())
}

/// Validates service API keys against the credential store.
///
/// Every call reads the store directly; revocation is visible on the next
/// call.
#[derive(Clone)]
pub struct ApiKeyValidator {
    store: Arc<CredentialStore>,
}

impl ApiKeyValidator {
    /// Create a validator over a credential store.
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Validate a raw API key.
    ///
    /// Unknown keys, revoked keys and keys whose owner is disabled all fail
    /// with [`AuthError::ApiKeyInvalid`].
    pub fn validate(&self, raw_key: &str) -> AuthResult<ApiKeyRecord> {
        let raw_key = raw_key.trim();
        if raw_key.is_empty() {
            return Err(AuthError::ApiKeyInvalid);
        }

        let key_hash = hash_api_key(raw_key);
        let record = self
            .store
            .find_api_key(&key_hash)
            .filter(|record| record.key_hash == key_hash && !record.revoked)
            .ok_or(AuthError::ApiKeyInvalid)?;

        let owner_active = self
            .store
            .get_user(&record.owner_id)
            .is_some_and(|owner| !owner.disabled);
        if !owner_active {
            return Err(AuthError::ApiKeyInvalid);
        }

        Ok(record)
    }
}

impl Authenticator for ApiKeyValidator {
    fn authenticate(&self, credential: &str) -> AuthResult<Identity> {
        let record = self.validate(credential)?;
        Ok(Identity::api_key(record.id, record.owner_id, record.scopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PasswordPolicy;
    use crate::identity::{IdentityKind, Role, ScopeSet};

    fn setup() -> (Arc<CredentialStore>, ApiKeyValidator, String) {
        let store = Arc::new(
            CredentialStore::new(
                PasswordPolicy::default().with_cost(4),
                [Role::User].into_iter().collect(),
                ["items:read".to_string()].into_iter().collect(),
            )
            .unwrap(),
        );
        let owner = store.register("svc-owner", "pw").unwrap();
        (store.clone(), ApiKeyValidator::new(store), owner.id)
    }

    fn read_scope() -> ScopeSet {
        ["items:read".to_string()].into_iter().collect()
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_api_key("tg_abc"), hash_api_key("tg_abc"));
        assert_ne!(hash_api_key("tg_abc"), hash_api_key("tg_abd"));
    }

    #[test]
    fn test_validate_provisioned_key() {
        let (store, validator, owner_id) = setup();
        let (raw, record) = store.provision_api_key(&owner_id, &read_scope()).unwrap();

        let validated = validator.validate(&raw).unwrap();
        assert_eq!(validated.id, record.id);

        let identity = validator.authenticate(&raw).unwrap();
        assert_eq!(identity.subject, owner_id);
        assert!(identity.has_scope("items:read"));
        assert!(identity.roles.is_empty());
        assert_eq!(
            identity.kind,
            IdentityKind::ApiKey {
                key_id: record.id.clone()
            }
        );
    }

    #[test]
    fn test_unknown_key() {
        let (_, validator, _) = setup();
        assert!(matches!(
            validator.validate("tg_0000"),
            Err(AuthError::ApiKeyInvalid)
        ));
        assert!(matches!(validator.validate(""), Err(AuthError::ApiKeyInvalid)));
    }

    #[test]
    fn test_revocation_is_immediate() {
        let (store, validator, owner_id) = setup();
        let (raw, record) = store.provision_api_key(&owner_id, &read_scope()).unwrap();
        assert!(validator.validate(&raw).is_ok());

        store.revoke_api_key(&record.id).unwrap();
        assert!(matches!(
            validator.validate(&raw),
            Err(AuthError::ApiKeyInvalid)
        ));
    }

    #[test]
    fn test_disabled_owner_invalidates_key() {
        let (store, validator, owner_id) = setup();
        let (raw, _) = store.provision_api_key(&owner_id, &read_scope()).unwrap();

        store.set_disabled(&owner_id, true).unwrap();
        assert!(matches!(
            validator.validate(&raw),
            Err(AuthError::ApiKeyInvalid)
        ));
    }
}
