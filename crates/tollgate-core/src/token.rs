//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the user id, issue and expiry times, and
//! the granted roles and scopes. Verification runs in a fixed order:
//!
//! 1. structural decode (three base64url segments, JSON header and claims)
//! 2. signature check against the active key, then each previous key
//! 3. expiry check against the service clock
//!
//! so a token that is both tampered and expired reports the signature
//! failure.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::authenticator::Authenticator;
use crate::clock::{system_clock, SharedClock};
use crate::config::TokenConfig;
use crate::credential::User;
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, RoleSet, ScopeSet};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    /// Issued at (Unix seconds).
    pub iat: u64,
    /// Expiry (Unix seconds).
    pub exp: u64,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: ScopeSet,
    /// Granted roles.
    #[serde(default)]
    pub roles: RoleSet,
}

impl Claims {
    /// Convert verified claims into an identity.
    pub fn into_identity(self) -> Identity {
        Identity::user(self.sub, self.roles, self.scopes)
    }
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded token.
    pub raw: String,
    /// Claims inside the token.
    pub claims: Claims,
    /// Seconds until expiry.
    pub expires_in: u64,
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &str) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::InvalidInput("signing secret must not be empty".into()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }
}

struct KeySet {
    active: SigningKey,
    previous: Vec<SigningKey>,
}

/// Issues and verifies access tokens.
pub struct TokenService {
    keys: RwLock<KeySet>,
    lifetime_secs: u64,
    max_previous_keys: usize,
    clock: SharedClock,
}

impl TokenService {
    /// Create a token service from configuration.
    pub fn new(config: &TokenConfig) -> AuthResult<Self> {
        config.validate()?;
        let active = SigningKey::from_secret(&config.active_secret)?;
        let previous = config
            .previous_secrets
            .iter()
            .take(config.max_previous_keys)
            .map(|secret| SigningKey::from_secret(secret))
            .collect::<AuthResult<Vec<_>>>()?;

        Ok(Self {
            keys: RwLock::new(KeySet { active, previous }),
            lifetime_secs: config.lifetime.as_secs(),
            max_previous_keys: config.max_previous_keys,
            clock: system_clock(),
        })
    }

    /// Replace the clock used for issue and expiry times.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Token lifetime in seconds.
    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    /// Number of previous keys accepted for verification.
    pub fn previous_key_count(&self) -> usize {
        self.keys.read().previous.len()
    }

    /// Issue a token for a user.
    ///
    /// The token grants the intersection of the requested scopes and the
    /// user's scopes. An empty intersection still yields a valid token.
    pub fn issue(&self, user: &User, requested_scopes: &ScopeSet) -> AuthResult<IssuedToken> {
        let iat = self.clock.now_secs();
        let claims = Claims {
            sub: user.id.clone(),
            iat,
            exp: iat + self.lifetime_secs,
            scopes: requested_scopes.intersection(&user.scopes).cloned().collect(),
            roles: user.roles.clone(),
        };

        let raw = {
            let keys = self.keys.read();
            encode(&Header::new(ALGORITHM), &claims, &keys.active.encoding)
                .map_err(|e| AuthError::Internal(format!("token encoding failed: {}", e)))?
        };

        tracing::debug!(
            user_id = %claims.sub,
            scopes = claims.scopes.len(),
            exp = claims.exp,
            "token issued"
        );

        Ok(IssuedToken {
            raw,
            expires_in: self.lifetime_secs,
            claims,
        })
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, raw_token: &str) -> AuthResult<Claims> {
        let claims = decode_unverified(raw_token)?;
        self.check_signature(raw_token)?;

        if self.clock.now_secs() >= claims.exp {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    fn check_signature(&self, raw_token: &str) -> AuthResult<()> {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let keys = self.keys.read();
        let candidates = std::iter::once(&keys.active).chain(keys.previous.iter());
        for key in candidates {
            match decode::<Claims>(raw_token, &key.decoding, &validation) {
                Ok(_) => return Ok(()),
                Err(e) => match e.kind() {
                    ErrorKind::InvalidSignature => continue,
                    ErrorKind::InvalidAlgorithm => return Err(AuthError::SignatureMismatch),
                    _ => return Err(AuthError::TokenMalformed(e.to_string())),
                },
            }
        }

        Err(AuthError::SignatureMismatch)
    }

    /// Make `new_secret` the active key.
    ///
    /// The old active key is kept for verification only; the oldest previous
    /// keys beyond the configured maximum are dropped.
    pub fn rotate(&self, new_secret: &str) -> AuthResult<()> {
        let new_key = SigningKey::from_secret(new_secret)?;
        let mut keys = self.keys.write();
        let old = std::mem::replace(&mut keys.active, new_key);
        keys.previous.insert(0, old);
        keys.previous.truncate(self.max_previous_keys);
        tracing::info!(previous_keys = keys.previous.len(), "signing key rotated");
        Ok(())
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("lifetime_secs", &self.lifetime_secs)
            .field("previous_keys", &self.previous_key_count())
            .finish_non_exhaustive()
    }
}

impl Authenticator for TokenService {
    fn authenticate(&self, credential: &str) -> AuthResult<Identity> {
        let token = credential
            .strip_prefix("Bearer ")
            .or_else(|| credential.strip_prefix("bearer "))
            .unwrap_or(credential)
            .trim();
        self.verify(token).map(Claims::into_identity)
    }
}

/// Decode header and claims without checking the signature or expiry.
fn decode_unverified(raw_token: &str) -> AuthResult<Claims> {
    let mut validation = Validation::new(ALGORITHM);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(raw_token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::TokenMalformed(e.to_string()))
}
