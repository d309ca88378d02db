//! Argon2id hasher for API-key secrets, grounded on the teacher's
//! `argon2_password_hasher.rs` verbatim: same OWASP-recommended parameters
//! (m=19456, t=2, p=1), same constant-time-failure verification shape.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier, Version};
use casare_application::PasswordHasher as PasswordHasherPort;
use casare_core::{AppError, AppResult};

/// Argon2id hasher for API-key secrets.
#[derive(Clone)]
pub struct Argon2ApiKeyHasher {
    argon2: Argon2<'static>,
}

impl Argon2ApiKeyHasher {
    /// Creates a new Argon2id hasher with OWASP-recommended parameters.
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(19456, 2, 1, None).unwrap_or_else(|_| Params::default());
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Self { argon2 }
    }
}

impl Default for Argon2ApiKeyHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasherPort for Argon2ApiKeyHasher {
    fn hash_password(&self, secret: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);

        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|error| AppError::Internal(format!("failed to hash api key secret: {error}")))?;

        Ok(hash.to_string())
    }

    fn verify_password(&self, secret: &str, hash: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|error| AppError::Internal(format!("failed to parse api key hash: {error}")))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(error) => Err(AppError::Internal(format!(
                "api key secret verification failed: {error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_correct_secret() -> AppResult<()> {
        let hasher = Argon2ApiKeyHasher::new();
        let hash = hasher.hash_password("sk_live_abc123")?;
        assert!(hasher.verify_password("sk_live_abc123", &hash)?);
        Ok(())
    }

    #[test]
    fn verify_wrong_secret_returns_false() -> AppResult<()> {
        let hasher = Argon2ApiKeyHasher::new();
        let hash = hasher.hash_password("correct-secret")?;
        assert!(!hasher.verify_password("wrong-secret", &hash)?);
        Ok(())
    }
}
