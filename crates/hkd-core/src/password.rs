//! # Password Hashing
//!
//! Argon2 salted hashing for owner passwords. The predecessor system shipped
//! a reversible encoding in place of a hash; nothing here is compatible with
//! it on purpose - accounts get a real hash on first write.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{CoreError, CoreResult};

/// Hashes a plaintext password with a fresh random salt.
///
/// The output is a PHC-format string (`$argon2id$...`) safe to store and
/// to replicate to the remote auth node.
pub fn hash_password(plain: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| CoreError::PasswordHash(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verifies a plaintext password against a stored PHC-format hash.
///
/// Returns `false` for both a wrong password and an unparseable hash - a
/// corrupt hash must not grant access.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let parsed = match PasswordHash::new(stored) {
        Ok(hash) => hash,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}
