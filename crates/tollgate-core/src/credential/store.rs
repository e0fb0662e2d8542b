//! In-memory credential store.
//!
//! Users are indexed by id and by normalized username; API keys by the
//! BLAKE3 hash of the raw key. Records are never removed: users are
//! soft-disabled and keys are revoked in place.

use std::collections::BTreeMap;
use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::password::{hash_cost, hash_password, verify_password};
use crate::apikey::hash_api_key;
use crate::clock::{system_clock, SharedClock};
use crate::config::{AccessConfig, PasswordPolicy};
use crate::error::{AuthError, AuthResult};
use crate::identity::{Role, RoleSet, ScopeSet};

/// Prefix of every provisioned API key.
pub const API_KEY_PREFIX: &str = "tg_";

/// Normalize a username for storage and lookup.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// A registered user.
#[derive(Clone)]
pub struct User {
    /// Unique user id.
    pub id: String,
    /// Normalized, unique username.
    pub username: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// Granted roles.
    pub roles: RoleSet,
    /// Granted scopes.
    pub scopes: ScopeSet,
    /// Soft-disable flag.
    pub disabled: bool,
    /// Registration time (Unix seconds).
    pub created_at: u64,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("roles", &self.roles)
            .field("scopes", &self.scopes)
            .field("disabled", &self.disabled)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A provisioned API key. The raw key itself is never stored.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    /// Unique key id.
    pub id: String,
    /// BLAKE3 hash of the raw key.
    pub key_hash: blake3::Hash,
    /// User id of the owner.
    pub owner_id: String,
    /// Scopes carried by the key.
    pub scopes: ScopeSet,
    /// Revocation flag.
    pub revoked: bool,
    /// Provisioning time (Unix seconds).
    pub created_at: u64,
}

impl ApiKeyRecord {
    /// Hex form of the key hash.
    pub fn key_hash_hex(&self) -> String {
        self.key_hash.to_hex().to_string()
    }
}

/// Account totals for administration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStats {
    /// Registered users.
    pub total_users: usize,
    /// Soft-disabled users.
    pub disabled_users: usize,
    /// Users holding each role. Every role is present.
    pub roles: BTreeMap<Role, usize>,
    /// Provisioned API keys, revoked included.
    pub total_api_keys: usize,
    /// API keys not revoked.
    pub active_api_keys: usize,
}

/// Store of users and API keys.
pub struct CredentialStore {
    users: DashMap<String, User>,
    usernames: DashMap<String, String>,
    api_keys: DashMap<blake3::Hash, ApiKeyRecord>,
    api_key_ids: DashMap<String, blake3::Hash>,
    policy: PasswordPolicy,
    default_roles: RoleSet,
    default_scopes: ScopeSet,
    dummy_hash: String,
    clock: SharedClock,
}

impl CredentialStore {
    /// Create a store with the given password policy and registration defaults.
    pub fn new(
        policy: PasswordPolicy,
        default_roles: RoleSet,
        default_scopes: ScopeSet,
    ) -> AuthResult<Self> {
        policy.validate()?;
        let filler: [u8; 16] = rand::random();
        let dummy_hash = hash_password(&hex::encode(filler), policy.cost)?;

        Ok(Self {
            users: DashMap::new(),
            usernames: DashMap::new(),
            api_keys: DashMap::new(),
            api_key_ids: DashMap::new(),
            policy,
            default_roles,
            default_scopes,
            dummy_hash,
            clock: system_clock(),
        })
    }

    /// Create a store from the access configuration.
    pub fn from_config(config: &AccessConfig) -> AuthResult<Self> {
        Self::new(
            config.password.clone(),
            config.default_roles.clone(),
            config.default_scopes.clone(),
        )
    }

    /// Replace the clock used for record timestamps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Register a user with the default roles and scopes.
    pub fn register(&self, username: &str, password: &str) -> AuthResult<User> {
        self.register_with(
            username,
            password,
            self.default_roles.clone(),
            self.default_scopes.clone(),
        )
    }

    /// Register a user with explicit roles and scopes.
    pub fn register_with(
        &self,
        username: &str,
        password: &str,
        roles: RoleSet,
        scopes: ScopeSet,
    ) -> AuthResult<User> {
        let username = normalize_username(username);
        self.validate_new_credentials(&username, password)?;

        // Skip the expensive hash for obvious duplicates; the entry below
        // remains the authoritative check.
        if self.usernames.contains_key(&username) {
            return Err(AuthError::DuplicateUsername);
        }

        let password_hash = hash_password(password, self.policy.cost)?;

        match self.usernames.entry(username.clone()) {
            Entry::Occupied(_) => Err(AuthError::DuplicateUsername),
            Entry::Vacant(slot) => {
                let user = User {
                    id: uuid::Uuid::new_v4().to_string(),
                    username,
                    password_hash,
                    roles,
                    scopes,
                    disabled: false,
                    created_at: self.clock.now_secs(),
                };
                self.users.insert(user.id.clone(), user.clone());
                slot.insert(user.id.clone());
                tracing::info!(user_id = %user.id, username = %user.username, "user registered");
                Ok(user)
            }
        }
    }

    /// Verify a username and password.
    ///
    /// Unknown users, wrong passwords and disabled accounts all fail with
    /// [`AuthError::InvalidCredentials`].
    ///
    /// A hash stored under a different cost than the policy's is replaced
    /// after a successful verification.
    pub fn verify(&self, username: &str, password: &str) -> AuthResult<User> {
        let Some(mut user) = self.find_by_username(username) else {
            verify_password(password, &self.dummy_hash);
            return Err(AuthError::InvalidCredentials);
        };

        let matched = verify_password(password, &user.password_hash);
        if !matched || user.disabled {
            tracing::debug!(
                user_id = %user.id,
                disabled = user.disabled,
                "password verification rejected"
            );
            return Err(AuthError::InvalidCredentials);
        }

        if hash_cost(&user.password_hash) != Some(self.policy.cost) {
            self.upgrade_hash(&mut user, password);
        }
        Ok(user)
    }

    fn upgrade_hash(&self, user: &mut User, password: &str) {
        let password_hash = match hash_password(password, self.policy.cost) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "password rehash failed");
                return;
            }
        };

        let Some(mut stored) = self.users.get_mut(&user.id) else {
            return;
        };
        // A concurrent password change wins.
        if stored.password_hash == user.password_hash {
            stored.password_hash = password_hash.clone();
            user.password_hash = password_hash;
            tracing::debug!(user_id = %user.id, cost = self.policy.cost, "password hash upgraded");
        }
    }

    /// Look up a user by id.
    pub fn get_user(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|entry| entry.value().clone())
    }

    /// Look up a user by username (case-insensitive).
    pub fn find_by_username(&self, username: &str) -> Option<User> {
        let id = self
            .usernames
            .get(&normalize_username(username))
            .map(|entry| entry.value().clone())?;
        self.get_user(&id)
    }

    /// All users, ordered by username.
    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Get the number of registered users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Totals by status and role, plus API key counts.
    pub fn stats(&self) -> UserStats {
        let mut stats = UserStats {
            roles: Role::ALL.iter().map(|role| (*role, 0)).collect(),
            ..UserStats::default()
        };
        for entry in self.users.iter() {
            let user = entry.value();
            stats.total_users += 1;
            if user.disabled {
                stats.disabled_users += 1;
            }
            for role in &user.roles {
                *stats.roles.entry(*role).or_default() += 1;
            }
        }
        for entry in self.api_keys.iter() {
            stats.total_api_keys += 1;
            if !entry.value().revoked {
                stats.active_api_keys += 1;
            }
        }
        stats
    }

    /// Replace a user's password.
    pub fn change_password(&self, id: &str, new_password: &str) -> AuthResult<()> {
        self.validate_password(new_password)?;
        let password_hash = hash_password(new_password, self.policy.cost)?;
        self.update_user(id, |user| user.password_hash = password_hash)
    }

    /// Add roles to a user.
    pub fn grant_roles(&self, id: &str, roles: &RoleSet) -> AuthResult<User> {
        self.update_user(id, |user| user.roles.extend(roles.iter().copied()))?;
        self.get_user(id).ok_or_else(|| AuthError::UserNotFound(id.to_string()))
    }

    /// Add scopes to a user.
    pub fn grant_scopes(&self, id: &str, scopes: &ScopeSet) -> AuthResult<User> {
        self.update_user(id, |user| user.scopes.extend(scopes.iter().cloned()))?;
        self.get_user(id).ok_or_else(|| AuthError::UserNotFound(id.to_string()))
    }

    /// Disable or re-enable a user.
    pub fn set_disabled(&self, id: &str, disabled: bool) -> AuthResult<()> {
        self.update_user(id, |user| user.disabled = disabled)?;
        tracing::info!(user_id = %id, disabled, "user status changed");
        Ok(())
    }

    fn update_user(&self, id: &str, apply: impl FnOnce(&mut User)) -> AuthResult<()> {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| AuthError::UserNotFound(id.to_string()))?;
        apply(user.value_mut());
        Ok(())
    }

    /// Provision an API key for a user.
    ///
    /// Requested scopes are narrowed to the owner's scopes. Returns the raw
    /// key, which is not retrievable afterwards.
    pub fn provision_api_key(
        &self,
        owner_id: &str,
        requested_scopes: &ScopeSet,
    ) -> AuthResult<(String, ApiKeyRecord)> {
        let owner = self
            .get_user(owner_id)
            .ok_or_else(|| AuthError::UserNotFound(owner_id.to_string()))?;
        if owner.disabled {
            return Err(AuthError::InvalidInput("owner account is disabled".into()));
        }

        let secret: [u8; 32] = rand::random();
        let raw_key = format!("{}{}", API_KEY_PREFIX, hex::encode(secret));
        let record = ApiKeyRecord {
            id: uuid::Uuid::new_v4().to_string(),
            key_hash: hash_api_key(&raw_key),
            owner_id: owner.id.clone(),
            scopes: requested_scopes
                .intersection(&owner.scopes)
                .cloned()
                .collect(),
            revoked: false,
            created_at: self.clock.now_secs(),
        };

        self.api_key_ids.insert(record.id.clone(), record.key_hash);
        self.api_keys.insert(record.key_hash, record.clone());
        tracing::info!(key_id = %record.id, owner_id = %record.owner_id, "API key provisioned");

        Ok((raw_key, record))
    }

    /// Mark an API key as revoked. Subsequent lookups see the flag at once.
    pub fn revoke_api_key(&self, id: &str) -> AuthResult<ApiKeyRecord> {
        let key_hash = self
            .api_key_ids
            .get(id)
            .map(|entry| *entry.value())
            .ok_or_else(|| AuthError::ApiKeyNotFound(id.to_string()))?;

        let mut record = self
            .api_keys
            .get_mut(&key_hash)
            .ok_or_else(|| AuthError::ApiKeyNotFound(id.to_string()))?;
        record.revoked = true;
        tracing::info!(key_id = %id, "API key revoked");
        Ok(record.clone())
    }

    /// Look up an API key record by key hash.
    pub fn find_api_key(&self, key_hash: &blake3::Hash) -> Option<ApiKeyRecord> {
        self.api_keys
            .get(key_hash)
            .map(|entry| entry.value().clone())
    }

    /// Look up an API key record by id.
    pub fn get_api_key(&self, id: &str) -> Option<ApiKeyRecord> {
        let key_hash = self.api_key_ids.get(id).map(|entry| *entry.value())?;
        self.find_api_key(&key_hash)
    }

    /// API keys owned by a user.
    pub fn list_api_keys(&self, owner_id: &str) -> Vec<ApiKeyRecord> {
        let mut keys: Vec<ApiKeyRecord> = self
            .api_keys
            .iter()
            .filter(|entry| entry.value().owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        keys.sort_by_key(|record| record.created_at);
        keys
    }

    fn validate_new_credentials(&self, username: &str, password: &str) -> AuthResult<()> {
        if username.is_empty() {
            return Err(AuthError::InvalidInput("username must not be empty".into()));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(AuthError::InvalidInput("username must not contain whitespace".into()));
        }
        self.validate_password(password)
    }

    fn validate_password(&self, password: &str) -> AuthResult<()> {
        if password.chars().count() < self.policy.min_length.max(1) {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                self.policy.min_length.max(1)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use std::sync::Arc;

    fn test_store() -> CredentialStore {
        CredentialStore::new(
            PasswordPolicy::default().with_cost(4),
            [Role::User].into_iter().collect(),
            ["items:read".to_string()].into_iter().collect(),
        )
        .unwrap()
    }

    fn scopes(names: &[&str]) -> ScopeSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_and_verify() {
        let store = test_store();
        let user = store.register("Alice", "pw123").unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.roles.contains(&Role::User));
        assert!(user.scopes.contains("items:read"));

        let verified = store.verify("alice", "pw123").unwrap();
        assert_eq!(verified.id, user.id);

        // Lookup is case-normalized.
        assert!(store.verify("  ALICE ", "pw123").is_ok());
    }

    #[test]
    fn test_wrong_password_and_unknown_user() {
        let store = test_store();
        store.register("alice", "pw123").unwrap();

        assert!(matches!(
            store.verify("alice", "pw124"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            store.verify("bob", "pw123"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_disabled_user_fails_as_invalid_credentials() {
        let store = test_store();
        let user = store.register("alice", "pw123").unwrap();
        store.set_disabled(&user.id, true).unwrap();

        assert!(matches!(
            store.verify("alice", "pw123"),
            Err(AuthError::InvalidCredentials)
        ));

        store.set_disabled(&user.id, false).unwrap();
        assert!(store.verify("alice", "pw123").is_ok());
    }

    #[test]
    fn test_duplicate_username_is_case_insensitive() {
        let store = test_store();
        store.register("alice", "pw123").unwrap();
        assert!(matches!(
            store.register("ALICE", "other"),
            Err(AuthError::DuplicateUsername)
        ));
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_concurrent_registration_admits_one() {
        let store = Arc::new(test_store());
        let results: Vec<AuthResult<User>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    s.spawn(move || store.register("racer", "pw"))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let created = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(AuthError::DuplicateUsername)))
            .count();
        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_invalid_registration_input() {
        let store = test_store();
        assert!(matches!(store.register("  ", "pw"), Err(AuthError::InvalidInput(_))));
        assert!(matches!(store.register("a b", "pw"), Err(AuthError::InvalidInput(_))));
        assert!(matches!(store.register("alice", ""), Err(AuthError::InvalidInput(_))));
    }

    #[test]
    fn test_verify_upgrades_hash_cost() {
        let store = test_store();
        let user = store.register("alice", "pw123").unwrap();
        store.users.get_mut(&user.id).unwrap().password_hash =
            hash_password("pw123", 5).unwrap();

        let verified = store.verify("alice", "pw123").unwrap();
        assert_eq!(hash_cost(&verified.password_hash), Some(4));
        let stored = store.get_user(&user.id).unwrap();
        assert_eq!(hash_cost(&stored.password_hash), Some(4));
        assert!(store.verify("alice", "pw123").is_ok());

        // A failed attempt leaves the hash alone.
        store.users.get_mut(&user.id).unwrap().password_hash =
            hash_password("pw123", 5).unwrap();
        assert!(store.verify("alice", "wrong").is_err());
        assert_eq!(hash_cost(&store.get_user(&user.id).unwrap().password_hash), Some(5));
    }

    #[test]
    fn test_stats() {
        let store = test_store();
        let alice = store.register("alice", "pw").unwrap();
        let bob = store.register("bob", "pw").unwrap();
        store
            .grant_roles(&alice.id, &[Role::Admin].into_iter().collect())
            .unwrap();
        store.set_disabled(&bob.id, true).unwrap();
        let (_, first) = store.provision_api_key(&alice.id, &scopes(&["items:read"])).unwrap();
        store.provision_api_key(&alice.id, &scopes(&["items:read"])).unwrap();
        store.revoke_api_key(&first.id).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.disabled_users, 1);
        assert_eq!(stats.roles[&Role::Admin], 1);
        assert_eq!(stats.roles[&Role::User], 2);
        assert_eq!(stats.roles[&Role::Viewer], 0);
        assert_eq!(stats.total_api_keys, 2);
        assert_eq!(stats.active_api_keys, 1);
    }

    #[test]
    fn test_change_password() {
        let store = test_store();
        let user = store.register("alice", "old").unwrap();
        store.change_password(&user.id, "new").unwrap();

        assert!(store.verify("alice", "old").is_err());
        assert!(store.verify("alice", "new").is_ok());
        assert!(matches!(
            store.change_password("missing", "x"),
            Err(AuthError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_grants() {
        let store = test_store();
        let user = store.register("alice", "pw").unwrap();

        let updated = store
            .grant_scopes(&user.id, &scopes(&["items:write"]))
            .unwrap();
        assert!(updated.scopes.contains("items:write"));
        assert!(updated.scopes.contains("items:read"));

        let updated = store
            .grant_roles(&user.id, &[Role::Admin].into_iter().collect())
            .unwrap();
        assert!(updated.roles.contains(&Role::Admin));
        assert!(updated.roles.contains(&Role::User));
    }

    #[test]
    fn test_provision_narrows_scopes_and_hides_raw_key() {
        let store = test_store();
        let user = store.register("alice", "pw").unwrap();

        let (raw, record) = store
            .provision_api_key(&user.id, &scopes(&["items:read", "admin"]))
            .unwrap();
        assert!(raw.starts_with(API_KEY_PREFIX));
        assert_eq!(record.scopes, scopes(&["items:read"]));
        assert_ne!(record.key_hash_hex(), raw);
        assert_eq!(record.key_hash, hash_api_key(&raw));

        let found = store.find_api_key(&hash_api_key(&raw)).unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(store.list_api_keys(&user.id).len(), 1);
    }

    #[test]
    fn test_revoke_api_key() {
        let store = test_store();
        let user = store.register("alice", "pw").unwrap();
        let (_, record) = store
            .provision_api_key(&user.id, &scopes(&["items:read"]))
            .unwrap();

        let revoked = store.revoke_api_key(&record.id).unwrap();
        assert!(revoked.revoked);
        assert!(store.get_api_key(&record.id).unwrap().revoked);
        assert!(matches!(
            store.revoke_api_key("missing"),
            Err(AuthError::ApiKeyNotFound(_))
        ));
    }

    #[test]
    fn test_provision_for_unknown_or_disabled_owner() {
        let store = test_store();
        assert!(matches!(
            store.provision_api_key("nobody", &ScopeSet::new()),
            Err(AuthError::UserNotFound(_))
        ));

        let user = store.register("alice", "pw").unwrap();
        store.set_disabled(&user.id, true).unwrap();
        assert!(store.provision_api_key(&user.id, &ScopeSet::new()).is_err());
    }

    #[test]
    fn test_debug_hides_password_hash() {
        let store = test_store();
        let user = store.register("alice", "pw").unwrap();
        let printed = format!("{:?}", user);
        assert!(!printed.contains(&user.password_hash));
    }
}
