//! Password hashing for superadmin accounts.
//!
//! Argon2id with a random 16-byte salt per hash, stored as a PHC string
//! (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`). Cost parameters come from
//! configuration; verification reads them back from the stored string, so
//! raising the cost does not invalidate existing hashes.
//!
//! Both operations are CPU-bound and run on the blocking thread pool.

use crate::{config::Config, error::AppError};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use std::sync::Arc;

const SALT_BYTES: usize = 16;

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Hash of a random secret, verified against when a username does not
    /// exist so that both paths cost the same.
    dummy_hash: Arc<str>,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// Build a hasher with explicit Argon2id cost parameters.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::Internal(format!("invalid Argon2 parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let filler: [u8; 32] = rand::random();
        let dummy_hash = hash_with(&argon2, &filler)?;

        Ok(Self {
            argon2,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.password_memory_kib,
            config.password_iterations,
            config.password_parallelism,
        )
    }

    /// Hash a plaintext password into a PHC string.
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hash_with(&argon2, password.as_bytes()))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
    }

    /// Check a plaintext password against a stored PHC string.
    ///
    /// A stored value that is not a valid PHC string never matches.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AppError> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let stored_hash = stored_hash.to_owned();
        tokio::task::spawn_blocking(move || verify_with(&argon2, password.as_bytes(), &stored_hash))
            .await
            .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))
    }

    /// Spend one verification's worth of work without any account.
    pub async fn verify_dummy(&self, password: &str) -> Result<(), AppError> {
        let dummy = self.dummy_hash.clone();
        self.verify(password, &dummy).await.map(|_| ())
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &[u8]) -> Result<String, AppError> {
    let salt_bytes: [u8; SALT_BYTES] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;
    argon2
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

fn verify_with(argon2: &Argon2<'_>, password: &[u8], stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => argon2.verify_password(password, &parsed).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "stored password hash is not a valid PHC string");
            false
        }
    }
}
