//! Credential and history storage.
//!
//! Business logic talks to storage through two narrow traits:
//! - [`CredentialStore`]: API tokens and superadmin accounts
//! - [`HistoryStore`]: the record of past verifications
//!
//! Two backends implement both: [`PgStore`] (PostgreSQL via sqlx) and
//! [`MemoryStore`] (process memory, for development and tests).
//!
//! Uniqueness of token values and usernames is enforced by the backend
//! (unique indexes, or a single lock in memory), never by read-then-write
//! checks in the callers.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::{
    models::{
        api_token::{ApiToken, TokenUpdate},
        history::{HistoryEntry, NewHistoryEntry},
        superadmin::SuperAdmin,
    },
    validation::Pagination,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::fmt::Debug;

/// Bytes of entropy in a token value.
pub const TOKEN_BYTES: usize = 32;

/// How many fresh values to try before giving up on a unique token.
pub(crate) const TOKEN_INSERT_ATTEMPTS: usize = 3;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Could not generate a unique token value")]
    TokenCollision,
}

/// Result of a superadmin deactivation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    Deactivated,
    NotFound,
    /// The target is the only active superadmin left.
    LastActive,
}

/// Storage for API tokens and superadmin accounts.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait CredentialStore: Send + Sync + Debug {
    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_token(&self, id: i64) -> Result<Option<ApiToken>, StoreError>;

    /// Exact lookup by bearer value. Returns inactive tokens too; callers decide.
    async fn find_token_by_value(&self, value: &str) -> Result<Option<ApiToken>, StoreError>;

    /// One page of tokens ordered by id, plus the total count.
    async fn list_tokens(&self, page: Pagination) -> Result<(Vec<ApiToken>, i64), StoreError>;

    /// Insert a new active token with a freshly generated value.
    async fn create_token(&self, description: Option<String>) -> Result<ApiToken, StoreError>;

    async fn update_token(&self, id: i64, update: TokenUpdate) -> Result<Option<ApiToken>, StoreError>;

    /// Remove a token. Returns `false` when no token had that id.
    async fn delete_token(&self, id: i64) -> Result<bool, StoreError>;

    /// Replace the token value in place, keeping id and description.
    ///
    /// The old value must stop resolving in the same atomic step.
    async fn regenerate_token(&self, id: i64) -> Result<Option<ApiToken>, StoreError>;

    async fn get_superadmin(&self, username: &str) -> Result<Option<SuperAdmin>, StoreError>;

    /// Insert an active superadmin. Fails with [`StoreError::Conflict`] if the username exists.
    async fn create_superadmin(&self, username: &str, hashed_password: &str) -> Result<SuperAdmin, StoreError>;

    /// Swap the password hash, but only if it still equals `expected_hash`.
    ///
    /// Returns `false` if the account is gone or its hash changed meanwhile.
    async fn update_superadmin_password(
        &self,
        username: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Deactivate an account unless it is the last active one.
    async fn deactivate_superadmin(&self, username: &str) -> Result<Deactivation, StoreError>;
}

/// Storage for the verification history.
#[async_trait]
pub trait HistoryStore: Send + Sync + Debug {
    async fn record_verification(&self, entry: NewHistoryEntry) -> Result<(), StoreError>;

    /// A token's history, newest first, plus the total count.
    async fn list_history(&self, token_id: i64, page: Pagination) -> Result<(Vec<HistoryEntry>, i64), StoreError>;

    /// A token's history for one document UUID, newest first.
    async fn history_for_uuid(&self, token_id: i64, uuid: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// Generate a token value: 32 random bytes, URL-safe base64 without padding.
pub fn generate_token_value() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
