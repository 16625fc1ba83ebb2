//! Credential hashing shared by user accounts and the admin login.

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::error;

/// Shortest password accepted for registration, login and self-update.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least {min} characters long")]
    TooShort { min: usize },
    #[error("failed to hash password: {0}")]
    Hash(password_hash::Error),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(password_hash::Error),
}

pub fn ensure_strength(plain: &str) -> Result<(), PasswordError> {
    if plain.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Hashes a new credential. Passwords under the minimum never reach argon2.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    ensure_strength(plain)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash failed");
            PasswordError::Hash(e)
        })?;
    Ok(hash.to_string())
}

/// `Ok(false)` on a wrong password. Errors only when `stored` itself is unusable,
/// which for the admin login means `ADMIN_PASSWORD_HASH` is misconfigured.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash does not parse");
        PasswordError::MalformedHash(e)
    })?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "stored password hash is unusable");
            Err(PasswordError::MalformedHash(e))
        }
    }
}
