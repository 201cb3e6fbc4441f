// src/services/password.rs
//! Argon2id password hashing. Hashing is CPU-bound and runs on the blocking pool.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("Hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// 19 MiB memory cost, one lane; the time cost comes from configuration
const MEMORY_COST_KIB: u32 = 19_456;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasherService {
    iterations: u32,
}

impl PasswordHasherService {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(MEMORY_COST_KIB, self.iterations, 1, None)
            .map_err(|e| PasswordError::Hash(format!("argon2 params error: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password into a PHC string with a fresh random salt
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let hasher = *self;
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .argon2()?
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| PasswordError::Hash(e.to_string()))
        })
        .await?
    }

    /// `Ok(false)` on mismatch, `Err` only when the stored hash can't be parsed.
    /// Parameters are read from the PHC string, so hashes made with an older
    /// iteration count still verify.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(PasswordError::MalformedHash(e.to_string())),
            }
        })
        .await?
    }
}
