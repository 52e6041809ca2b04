use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::domain::repository::SecretHasher;
use crate::error::TwoFactorError;

/// Argon2id with the library defaults, a fresh OS-random salt per hash, and
/// PHC-string output. Backs both password verification and recovery-code
/// storage.
#[derive(Clone, Default)]
pub struct Argon2SecretHasher;

impl SecretHasher for Argon2SecretHasher {
    fn hash(&self, secret: &str) -> Result<String, TwoFactorError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    fn verify(&self, secret: &str, hash: &str) -> Result<bool, TwoFactorError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| anyhow::anyhow!("malformed secret hash: {e}"))?;
        Ok(Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok())
    }
}
