//! API token model for consumer authentication.
//!
//! API tokens authenticate callers of the verification endpoints. Superadmins
//! create, rotate and revoke them through the admin API.

use crate::{
    error::FieldError,
    validation::{Fields, FromJson},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Represents an API token record from the database.
///
/// # Database Table
///
/// Maps to the `api_tokens` table with columns:
/// - `id`: Unique identifier, assigned at creation and never changed
/// - `token`: The opaque bearer value (UNIQUE)
/// - `description`: Optional note about who uses the token
/// - `is_active`: Whether the token may authenticate requests
/// - `created_at` / `updated_at`: Timestamps, `updated_at` moves on every mutation
#[derive(Clone, sqlx::FromRow)]
pub struct ApiToken {
    pub id: i64,

    /// The bearer value itself.
    ///
    /// Regeneration replaces it in place; the previous value stops working
    /// in the same statement that installs the new one.
    pub token: String,

    pub description: Option<String>,

    /// Inactive tokens are rejected during authentication. This provides a way to revoke access without deleting the record.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiToken")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .field("description", &self.description)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Request body for creating a token.
///
/// ```json
/// { "description": "ERP integration" }
/// ```
#[derive(Debug, Default)]
pub struct CreateTokenRequest {
    pub description: Option<String>,
}

impl FromJson for CreateTokenRequest {
    fn from_json(value: &Value, loc: &[Value]) -> Result<Self, Vec<FieldError>> {
        let mut fields = Fields::new(value, loc);
        let description = fields.optional_str("description");
        if fields.is_clean() {
            Ok(Self { description })
        } else {
            Err(fields.into_errors())
        }
    }
}

/// Partial update of a token. Absent (or null) fields are left unchanged.
///
/// ```json
/// { "description": "ERP integration (prod)", "is_active": false }
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl FromJson for TokenUpdate {
    fn from_json(value: &Value, loc: &[Value]) -> Result<Self, Vec<FieldError>> {
        let mut fields = Fields::new(value, loc);
        let description = fields.optional_str("description");
        let is_active = fields.optional_bool("is_active");
        if fields.is_clean() {
            Ok(Self {
                description,
                is_active,
            })
        } else {
            Err(fields.into_errors())
        }
    }
}

/// Response body for token endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": 7,
///   "token": "q1m6oR0hV7...",
///   "description": "ERP integration",
///   "is_active": true,
///   "created_at": "2025-12-20T10:00:00Z",
///   "updated_at": "2025-12-20T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: i64,
    pub token: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ApiToken> for TokenResponse {
    fn from(token: ApiToken) -> Self {
        Self {
            id: token.id,
            token: token.token,
            description: token.description,
            is_active: token.is_active,
            created_at: token.created_at,
            updated_at: token.updated_at,
        }
    }
}

/// One page of tokens plus the total number of tokens.
#[derive(Debug, Serialize)]
pub struct TokenListResponse {
    pub tokens: Vec<TokenResponse>,
    pub total: i64,
}
