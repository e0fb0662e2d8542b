//! Access control configuration.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};
use crate::identity::{Role, RoleSet, ScopeSet};

/// Default access token lifetime in seconds (30 minutes).
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 30 * 60;

/// Default rate limit window in seconds.
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

/// Default requests per window for classes without an explicit limit.
pub const DEFAULT_RATE_LIMIT: u32 = 60;

/// Resource class used for login attempts.
pub const LOGIN_RESOURCE_CLASS: &str = "login";

/// Default login attempts per window.
pub const DEFAULT_LOGIN_LIMIT: u32 = 10;

/// Resource class used for account registration.
pub const REGISTER_RESOURCE_CLASS: &str = "register";

/// Default registrations per client and window.
pub const DEFAULT_REGISTER_LIMIT: u32 = 10;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Number of previous signing keys kept after rotation.
pub const DEFAULT_MAX_PREVIOUS_KEYS: usize = 3;

fn default_hash_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
        .max(1)
}

/// Token signing and lifetime settings.
#[derive(Clone)]
pub struct TokenConfig {
    /// Secret used for issuing and verifying tokens.
    pub active_secret: String,
    /// Previously active secrets, accepted for verification only.
    pub previous_secrets: Vec<String>,
    /// Lifetime of issued tokens.
    pub lifetime: Duration,
    /// Maximum number of previous secrets retained on rotation.
    pub max_previous_keys: usize,
}

impl TokenConfig {
    /// Create a token configuration with the given active secret.
    pub fn new(active_secret: impl Into<String>) -> Self {
        Self {
            active_secret: active_secret.into(),
            previous_secrets: Vec::new(),
            lifetime: Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS),
            max_previous_keys: DEFAULT_MAX_PREVIOUS_KEYS,
        }
    }

    /// Create a configuration with a random 256-bit secret.
    pub fn with_random_secret() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self::new(hex::encode(bytes))
    }

    /// Add a previously active secret accepted for verification.
    pub fn with_previous_secret(mut self, secret: impl Into<String>) -> Self {
        self.previous_secrets.push(secret.into());
        self
    }

    /// Set the token lifetime.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set how many previous secrets survive rotation.
    pub fn with_max_previous_keys(mut self, max: usize) -> Self {
        self.max_previous_keys = max;
        self
    }

    /// Check the configuration for unusable values.
    pub fn validate(&self) -> AuthResult<()> {
        if self.active_secret.is_empty() {
            return Err(AuthError::InvalidInput("signing secret must not be empty".into()));
        }
        if self.previous_secrets.iter().any(String::is_empty) {
            return Err(AuthError::InvalidInput("previous secrets must not be empty".into()));
        }
        if self.lifetime.as_secs() == 0 {
            return Err(AuthError::InvalidInput("token lifetime must be at least one second".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("active_secret", &"<redacted>")
            .field("previous_secrets", &self.previous_secrets.len())
            .field("lifetime", &self.lifetime)
            .field("max_previous_keys", &self.max_previous_keys)
            .finish()
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::with_random_secret()
    }
}

/// Rate limiting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitAlgorithm {
    /// Counter per discrete window; limit is inclusive.
    #[default]
    FixedWindow,
    /// Continuous refill of `limit` tokens per window, bursting up to `limit`.
    TokenBucket,
}

impl std::str::FromStr for RateLimitAlgorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed-window" | "fixed_window" => Ok(RateLimitAlgorithm::FixedWindow),
            "token-bucket" | "token_bucket" => Ok(RateLimitAlgorithm::TokenBucket),
            other => Err(AuthError::InvalidInput(format!(
                "unknown rate limit algorithm: {}",
                other
            ))),
        }
    }
}

/// Rate limiting settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window size.
    pub window: Duration,
    /// Limit for classes without an explicit entry.
    pub default_limit: u32,
    /// Per resource class limits.
    pub class_limits: HashMap<String, u32>,
    /// Algorithm used for every bucket.
    pub algorithm: RateLimitAlgorithm,
}

impl RateLimitConfig {
    /// Create a configuration with a window and default limit.
    pub fn new(window: Duration, default_limit: u32) -> Self {
        Self {
            window,
            default_limit,
            class_limits: HashMap::new(),
            algorithm: RateLimitAlgorithm::FixedWindow,
        }
    }

    /// Set the limit for a resource class.
    pub fn with_class_limit(mut self, class: impl Into<String>, limit: u32) -> Self {
        self.class_limits.insert(class.into(), limit);
        self
    }

    /// Select the algorithm.
    pub fn with_algorithm(mut self, algorithm: RateLimitAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Limit that applies to a resource class.
    pub fn limit_for(&self, class: &str) -> u32 {
        self.class_limits
            .get(class)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Parse a `class=limit` pair.
    pub fn parse_class_limit(spec: &str) -> AuthResult<(String, u32)> {
        let (class, limit) = spec
            .split_once('=')
            .ok_or_else(|| AuthError::InvalidInput(format!("expected class=limit, got {}", spec)))?;
        let class = class.trim();
        if class.is_empty() {
            return Err(AuthError::InvalidInput("rate limit class must not be empty".into()));
        }
        let limit = limit
            .trim()
            .parse::<u32>()
            .map_err(|e| AuthError::InvalidInput(format!("invalid limit for {}: {}", class, e)))?;
        Ok((class.to_string(), limit))
    }

    /// Check the configuration for unusable values.
    pub fn validate(&self) -> AuthResult<()> {
        if self.window.as_millis() == 0 {
            return Err(AuthError::InvalidInput("rate limit window must be positive".into()));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
            DEFAULT_RATE_LIMIT,
        )
        .with_class_limit(LOGIN_RESOURCE_CLASS, DEFAULT_LOGIN_LIMIT)
        .with_class_limit(REGISTER_RESOURCE_CLASS, DEFAULT_REGISTER_LIMIT)
    }
}

/// Password hashing settings.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// bcrypt cost factor (4..=31).
    pub cost: u32,
    /// Minimum accepted password length in characters.
    pub min_length: usize,
}

impl PasswordPolicy {
    /// Set the bcrypt cost.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Set the minimum password length.
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length.max(1);
        self
    }

    /// Check the configuration for unusable values.
    pub fn validate(&self) -> AuthResult<()> {
        if !(4..=31).contains(&self.cost) {
            return Err(AuthError::InvalidInput(format!(
                "bcrypt cost must be between 4 and 31, got {}",
                self.cost
            )));
        }
        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            cost: DEFAULT_BCRYPT_COST,
            min_length: 1,
        }
    }
}

/// Credential worker pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Jobs allowed to run at once.
    pub workers: usize,
    /// Jobs allowed to wait for a worker before new jobs are refused.
    pub queue_depth: usize,
}

impl PoolConfig {
    /// Create a pool configuration.
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_depth,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = default_hash_workers();
        Self::new(workers, workers * 16)
    }
}

/// Complete access control configuration.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Token settings.
    pub token: TokenConfig,
    /// Rate limit settings.
    pub rate_limit: RateLimitConfig,
    /// Password settings.
    pub password: PasswordPolicy,
    /// Credential worker pool settings.
    pub pool: PoolConfig,
    /// Roles given to newly registered users.
    pub default_roles: RoleSet,
    /// Scopes given to newly registered users.
    pub default_scopes: ScopeSet,
    /// Whether admin implies user and user implies viewer.
    pub role_hierarchy: bool,
}

impl AccessConfig {
    /// Create a configuration around token settings, defaults elsewhere.
    pub fn new(token: TokenConfig) -> Self {
        Self {
            token,
            rate_limit: RateLimitConfig::default(),
            password: PasswordPolicy::default(),
            pool: PoolConfig::default(),
            default_roles: [Role::User].into_iter().collect(),
            default_scopes: ["items:read".to_string()].into_iter().collect(),
            role_hierarchy: false,
        }
    }

    /// Set rate limit settings.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set password settings.
    pub fn with_password_policy(mut self, password: PasswordPolicy) -> Self {
        self.password = password;
        self
    }

    /// Set worker pool settings.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set roles granted at registration.
    pub fn with_default_roles(mut self, roles: RoleSet) -> Self {
        self.default_roles = roles;
        self
    }

    /// Set scopes granted at registration.
    pub fn with_default_scopes(mut self, scopes: ScopeSet) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Enable or disable the role hierarchy.
    pub fn with_role_hierarchy(mut self, enabled: bool) -> Self {
        self.role_hierarchy = enabled;
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> AuthResult<()> {
        self.token.validate()?;
        self.rate_limit.validate()?;
        self.password.validate()?;
        Ok(())
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self::new(TokenConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AccessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token.lifetime, Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS));
        assert_eq!(config.rate_limit.limit_for(LOGIN_RESOURCE_CLASS), DEFAULT_LOGIN_LIMIT);
        assert_eq!(config.rate_limit.limit_for("anything"), DEFAULT_RATE_LIMIT);
        assert!(config.default_roles.contains(&Role::User));
        assert!(!config.role_hierarchy);
    }

    #[test]
    fn test_random_secrets_differ() {
        let a = TokenConfig::with_random_secret();
        let b = TokenConfig::with_random_secret();
        assert_ne!(a.active_secret, b.active_secret);
        assert_eq!(a.active_secret.len(), 64);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = TokenConfig::new("super-secret-value");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret-value"));
    }

    #[test]
    fn test_parse_class_limit() {
        assert_eq!(
            RateLimitConfig::parse_class_limit("login=5").unwrap(),
            ("login".to_string(), 5)
        );
        assert!(RateLimitConfig::parse_class_limit("login").is_err());
        assert!(RateLimitConfig::parse_class_limit("=5").is_err());
        assert!(RateLimitConfig::parse_class_limit("login=many").is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(TokenConfig::new("").validate().is_err());
        assert!(TokenConfig::new("k")
            .with_lifetime(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PasswordPolicy::default().with_cost(3).validate().is_err());
        assert!(RateLimitConfig::new(Duration::ZERO, 1).validate().is_err());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(
            "token-bucket".parse::<RateLimitAlgorithm>().unwrap(),
            RateLimitAlgorithm::TokenBucket
        );
        assert!("leaky".parse::<RateLimitAlgorithm>().is_err());
    }
}
