//! bcrypt password hashing.
//!
//! Hashes carry their own version prefix, cost and salt, so records hashed
//! under an older cost keep verifying after the configured cost changes.

use crate::error::{AuthError, AuthResult};

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str, cost: u32) -> AuthResult<String> {
    bcrypt::hash(password, cost)
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {}", e)))
}

/// Verify a password against a stored hash.
///
/// An unparseable stored hash verifies as `false`.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash could not be parsed");
            false
        }
    }
}

/// Cost factor encoded in a stored hash.
pub fn hash_cost(hash: &str) -> Option<u32> {
    hash.split('$').nth(2)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_and_verify_success() {
        let hash = hash_password("my_secret_password", TEST_COST).unwrap();
        assert!(verify_password("my_secret_password", &hash));
    }

    #[test]
    fn test_verify_password_failure() {
        let hash = hash_password("my_secret_password", TEST_COST).unwrap();
        assert!(!verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same", TEST_COST).unwrap();
        let b = hash_password("same", TEST_COST).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn test_verify_invalid_hash() {
        assert!(!verify_password("password", "invalid_hash"));
    }

    #[test]
    fn test_hash_cost_is_recorded() {
        let hash = hash_password("pw", TEST_COST).unwrap();
        assert!(hash.starts_with("$2b$"));
        assert_eq!(hash_cost(&hash), Some(TEST_COST));
        assert_eq!(hash_cost("garbage"), None);
    }
}
