use anyhow::anyhow;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use tracing::warn;

use crate::errors::AppError;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Hashes a password with Argon2id and a fresh random salt (PHC string format).
/// Runs on the blocking pool: hashing is deliberately CPU-heavy.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("Password hashing failed: {e}"))
    })
    .await
    .map_err(|e| anyhow!("Password hashing task failed: {e}"))?
    .map_err(AppError::Internal)
}

/// Checks a password against a stored PHC hash. A malformed hash never matches.
pub async fn verify_password(password: String, stored_hash: String) -> Result<bool, AppError> {
    let matched = tokio::task::spawn_blocking(move || match PasswordHash::new(&stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {e}");
            false
        }
    })
    .await
    .map_err(|e| anyhow!("Password verification task failed: {e}"))?;
    Ok(matched)
}
