//! Superadmin account model.
//!
//! Superadmins authenticate with HTTP Basic credentials and manage API tokens
//! and other superadmins. Accounts are deactivated, never deleted.

use crate::{
    error::FieldError,
    validation::{Fields, FromJson},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 64;

/// Represents a superadmin record from the database.
///
/// `hashed_password` is an Argon2id PHC string and never leaves the service.
#[derive(Clone, sqlx::FromRow)]
pub struct SuperAdmin {
    pub id: i64,
    pub username: String,
    pub hashed_password: String,

    /// A deactivated superadmin can never authenticate, even with the right password.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for SuperAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperAdmin")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("hashed_password", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Why `name` cannot be used as a username, as a message and error type.
pub fn username_problem(name: &str) -> Option<(String, &'static str)> {
    if name.trim().is_empty() {
        Some(("String should have at least 1 character".to_string(), "string_too_short"))
    } else if name.chars().count() > MAX_USERNAME_LEN {
        Some((
            format!("String should have at most {MAX_USERNAME_LEN} characters"),
            "string_too_long",
        ))
    } else if name.contains(':') {
        // Basic credentials split on the first colon.
        Some(("Username must not contain ':'".to_string(), "value_error"))
    } else {
        None
    }
}

/// Request body for creating a superadmin.
pub struct CreateSuperAdminRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for CreateSuperAdminRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateSuperAdminRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl FromJson for CreateSuperAdminRequest {
    fn from_json(value: &Value, loc: &[Value]) -> Result<Self, Vec<FieldError>> {
        let mut fields = Fields::new(value, loc);
        let username = fields.required_str("username");
        let password = fields.required_str("password");

        if let Some((msg, kind)) = username.as_deref().and_then(username_problem) {
            fields.reject("username", msg, kind);
        }
        if password.as_deref() == Some("") {
            fields.reject("password", "String should have at least 1 character", "string_too_short");
        }

        match (username, password) {
            (Some(username), Some(password)) if fields.is_clean() => Ok(Self { username, password }),
            _ => Err(fields.into_errors()),
        }
    }
}

/// Request body for changing a superadmin's password.
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl std::fmt::Debug for UpdatePasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UpdatePasswordRequest { .. }")
    }
}

impl FromJson for UpdatePasswordRequest {
    fn from_json(value: &Value, loc: &[Value]) -> Result<Self, Vec<FieldError>> {
        let mut fields = Fields::new(value, loc);
        let current_password = fields.required_str("current_password");
        let new_password = fields.required_str("new_password");

        if new_password.as_deref() == Some("") {
            fields.reject("new_password", "String should have at least 1 character", "string_too_short");
        }

        match (current_password, new_password) {
            (Some(current_password), Some(new_password)) if fields.is_clean() => Ok(Self {
                current_password,
                new_password,
            }),
            _ => Err(fields.into_errors()),
        }
    }
}

/// Response body for superadmin endpoints. Carries no password material.
#[derive(Debug, Serialize)]
pub struct SuperAdminResponse {
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<SuperAdmin> for SuperAdminResponse {
    fn from(admin: SuperAdmin) -> Self {
        Self {
            username: admin.username,
            is_active: admin.is_active,
            created_at: admin.created_at,
        }
    }
}
