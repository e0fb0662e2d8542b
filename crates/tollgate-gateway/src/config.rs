//! Gateway configuration.

use std::fmt;
use std::time::Duration;

use clap::Parser;
use tollgate_core::config::{
    DEFAULT_BCRYPT_COST, DEFAULT_MAX_PREVIOUS_KEYS, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW_SECS,
    DEFAULT_TOKEN_LIFETIME_SECS,
};
use tollgate_core::{
    parse_roles, parse_scopes, AccessConfig, AuthResult, PasswordPolicy, PoolConfig,
    RateLimitAlgorithm, RateLimitConfig, TokenConfig,
};

/// Tollgate HTTP gateway command line arguments.
#[derive(Debug, Parser)]
#[command(name = "tollgate-gateway")]
#[command(about = "Token-based access control gateway")]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, env = "TOLLGATE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Secret used to sign access tokens. A random secret is generated when unset.
    #[arg(long, env = "TOLLGATE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Previously active signing secrets still accepted for verification.
    #[arg(
        long,
        env = "TOLLGATE_JWT_PREVIOUS_SECRETS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub jwt_previous_secret: Vec<String>,

    /// Maximum number of previous signing secrets kept after rotation.
    #[arg(long, default_value_t = DEFAULT_MAX_PREVIOUS_KEYS)]
    pub max_previous_keys: usize,

    /// Access token lifetime in seconds.
    #[arg(long, env = "TOLLGATE_TOKEN_LIFETIME_SECS", default_value_t = DEFAULT_TOKEN_LIFETIME_SECS)]
    pub token_lifetime_secs: u64,

    /// Rate limit window in seconds.
    #[arg(long, env = "TOLLGATE_RATE_WINDOW_SECS", default_value_t = DEFAULT_RATE_WINDOW_SECS)]
    pub rate_window_secs: u64,

    /// Requests per window for resource classes without an explicit limit.
    #[arg(long, env = "TOLLGATE_RATE_LIMIT", default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit: u32,

    /// Per resource class limits as `class=limit`.
    #[arg(long = "class-limit", env = "TOLLGATE_CLASS_LIMITS", value_delimiter = ',')]
    pub class_limits: Vec<String>,

    /// Rate limiting algorithm: `fixed-window` or `token-bucket`.
    #[arg(long, env = "TOLLGATE_RATE_ALGORITHM", default_value = "fixed-window")]
    pub rate_algorithm: String,

    /// bcrypt cost factor for password hashes.
    #[arg(long, env = "TOLLGATE_BCRYPT_COST", default_value_t = DEFAULT_BCRYPT_COST)]
    pub bcrypt_cost: u32,

    /// Minimum password length in characters.
    #[arg(long, default_value_t = 1)]
    pub min_password_length: usize,

    /// Number of password hashing workers. Defaults to available parallelism.
    #[arg(long, env = "TOLLGATE_HASH_WORKERS")]
    pub hash_workers: Option<usize>,

    /// Hashing jobs allowed to wait for a worker. Defaults to 16 per worker.
    #[arg(long, env = "TOLLGATE_HASH_QUEUE_DEPTH")]
    pub hash_queue_depth: Option<usize>,

    /// Comma-separated roles given to newly registered users.
    #[arg(long, env = "TOLLGATE_DEFAULT_ROLES", default_value = "user")]
    pub default_roles: String,

    /// Space-separated scopes given to newly registered users.
    #[arg(long, env = "TOLLGATE_DEFAULT_SCOPES", default_value = "items:read")]
    pub default_scopes: String,

    /// Treat admin as implying user, and user as implying viewer.
    #[arg(long, env = "TOLLGATE_ROLE_HIERARCHY")]
    pub role_hierarchy: bool,

    /// Username of an administrator created at startup.
    #[arg(long, env = "TOLLGATE_ADMIN_USERNAME", requires = "admin_password")]
    pub admin_username: Option<String>,

    /// Password of the administrator created at startup.
    #[arg(long, env = "TOLLGATE_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}

/// Administrator account created at startup.
#[derive(Clone)]
pub struct AdminBootstrap {
    /// Administrator username.
    pub username: String,
    /// Administrator password.
    pub password: String,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,
    /// Access control configuration.
    pub access: AccessConfig,
    /// Administrator created at startup, if any.
    pub admin: Option<AdminBootstrap>,
    /// Whether the signing secret was generated for this process.
    pub ephemeral_secret: bool,
}

impl GatewayConfig {
    /// Create a configuration around access settings.
    pub fn new(access: AccessConfig) -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            access,
            admin: None,
            ephemeral_secret: false,
        }
    }

    /// Set the listen address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Create an administrator at startup.
    pub fn with_admin(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin = Some(AdminBootstrap {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

impl TryFrom<&Args> for GatewayConfig {
    type Error = tollgate_core::AuthError;

    fn try_from(args: &Args) -> AuthResult<Self> {
        let ephemeral_secret = args.jwt_secret.is_none();
        let mut token = match &args.jwt_secret {
            Some(secret) => TokenConfig::new(secret.clone()),
            None => TokenConfig::with_random_secret(),
        }
        .with_lifetime(Duration::from_secs(args.token_lifetime_secs))
        .with_max_previous_keys(args.max_previous_keys);
        for secret in &args.jwt_previous_secret {
            token = token.with_previous_secret(secret.clone());
        }

        let mut rate_limit = RateLimitConfig::default();
        rate_limit.window = Duration::from_secs(args.rate_window_secs);
        rate_limit.default_limit = args.rate_limit;
        rate_limit.algorithm = args.rate_algorithm.parse::<RateLimitAlgorithm>()?;
        for spec in &args.class_limits {
            let (class, limit) = RateLimitConfig::parse_class_limit(spec)?;
            rate_limit = rate_limit.with_class_limit(class, limit);
        }

        let workers = args
            .hash_workers
            .unwrap_or_else(|| PoolConfig::default().workers)
            .max(1);
        let pool = PoolConfig::new(workers, args.hash_queue_depth.unwrap_or(workers * 16));

        let access = AccessConfig::new(token)
            .with_rate_limit(rate_limit)
            .with_password_policy(
                PasswordPolicy::default()
                    .with_cost(args.bcrypt_cost)
                    .with_min_length(args.min_password_length),
            )
            .with_pool(pool)
            .with_default_roles(parse_roles(&args.default_roles)?)
            .with_default_scopes(parse_scopes(&args.default_scopes))
            .with_role_hierarchy(args.role_hierarchy);
        access.validate()?;

        let admin = match (&args.admin_username, &args.admin_password) {
            (Some(username), Some(password)) => Some(AdminBootstrap {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            listen_addr: args.listen.clone(),
            access,
            admin,
            ephemeral_secret,
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(AccessConfig::default())
    }
}
