//! User and API key records, and password verification.

mod password;
mod store;

pub use password::{hash_cost, hash_password, verify_password};
pub use store::{
    normalize_username, ApiKeyRecord, CredentialStore, User, UserStats, API_KEY_PREFIX,
};
