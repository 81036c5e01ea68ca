//! Token lifecycle and superadmin management.
//!
//! Every function here assumes the caller already passed the superadmin
//! gate. Storage goes through [`CredentialStore`]; uniqueness and atomicity
//! are the store's job.

use crate::{
    config::Config,
    error::AppError,
    models::{
        api_token::{ApiToken, TokenListResponse, TokenResponse, TokenUpdate},
        superadmin::{self, CreateSuperAdminRequest, SuperAdmin, UpdatePasswordRequest},
    },
    services::password::PasswordHasher,
    store::{CredentialStore, Deactivation},
    validation::Pagination,
};
use tracing::{info, warn};

pub async fn create_token(store: &dyn CredentialStore, description: Option<String>) -> Result<ApiToken, AppError> {
    let token = store.create_token(description).await?;
    info!(token_id = token.id, "API token created");
    Ok(token)
}

pub async fn list_tokens(store: &dyn CredentialStore, page: Pagination) -> Result<TokenListResponse, AppError> {
    let (tokens, total) = store.list_tokens(page).await?;
    Ok(TokenListResponse {
        tokens: tokens.into_iter().map(TokenResponse::from).collect(),
        total,
    })
}

pub async fn get_token(store: &dyn CredentialStore, id: i64) -> Result<ApiToken, AppError> {
    store.get_token(id).await?.ok_or(AppError::NotFound("Token"))
}

/// Apply a partial update. Setting `is_active: false` revokes the token for
/// every subsequent request.
pub async fn update_token(store: &dyn CredentialStore, id: i64, update: TokenUpdate) -> Result<ApiToken, AppError> {
    let token = store
        .update_token(id, update)
        .await?
        .ok_or(AppError::NotFound("Token"))?;
    info!(token_id = id, is_active = token.is_active, "API token updated");
    Ok(token)
}

pub async fn delete_token(store: &dyn CredentialStore, id: i64) -> Result<(), AppError> {
    if !store.delete_token(id).await? {
        return Err(AppError::NotFound("Token"));
    }
    info!(token_id = id, "API token deleted");
    Ok(())
}

/// Issue a new value for an existing token. The old value stops working immediately.
pub async fn regenerate_token(store: &dyn CredentialStore, id: i64) -> Result<ApiToken, AppError> {
    let token = store
        .regenerate_token(id)
        .await?
        .ok_or(AppError::NotFound("Token"))?;
    info!(token_id = id, "API token regenerated");
    Ok(token)
}

/// Create a superadmin account.
///
/// # Errors
///
/// - `AppError::Conflict` if the username is taken
pub async fn create_superadmin(
    store: &dyn CredentialStore,
    hasher: &PasswordHasher,
    request: CreateSuperAdminRequest,
) -> Result<SuperAdmin, AppError> {
    let hashed = hasher.hash(&request.password).await?;
    let admin = store.create_superadmin(&request.username, &hashed).await?;
    info!(username = %admin.username, "Superadmin created");
    Ok(admin)
}

/// Change a superadmin's password after checking the current one.
///
/// The new hash is only written if the stored hash is still the one that
/// was verified. A failed attempt leaves the stored hash untouched.
///
/// # Errors
///
/// - `AppError::NotFound` if the username does not exist
/// - `AppError::IncorrectPassword` if `current_password` does not match
/// - `AppError::Conflict` if the password was changed concurrently
pub async fn update_password(
    store: &dyn CredentialStore,
    hasher: &PasswordHasher,
    username: &str,
    request: UpdatePasswordRequest,
) -> Result<(), AppError> {
    let admin = store
        .get_superadmin(username)
        .await?
        .ok_or(AppError::NotFound("Superadmin"))?;

    if !hasher.verify(&request.current_password, &admin.hashed_password).await? {
        warn!(username, "Password change rejected: wrong current password");
        return Err(AppError::IncorrectPassword);
    }

    let new_hash = hasher.hash(&request.new_password).await?;
    let swapped = store
        .update_superadmin_password(username, &admin.hashed_password, &new_hash)
        .await?;

    if !swapped {
        warn!(username, "Password changed concurrently; update discarded");
        return Err(AppError::Conflict("Password was changed concurrently".to_string()));
    }

    info!(username, "Superadmin password updated");
    Ok(())
}

/// Deactivate a superadmin on behalf of `acting_username`.
///
/// # Errors
///
/// - `AppError::InvalidRequest` for self-deactivation or the last active account
/// - `AppError::NotFound` if the username does not exist
pub async fn deactivate_superadmin(
    store: &dyn CredentialStore,
    acting_username: &str,
    username: &str,
) -> Result<(), AppError> {
    if acting_username == username {
        return Err(AppError::InvalidRequest("Cannot deactivate your own account".to_string()));
    }

    match store.deactivate_superadmin(username).await? {
        Deactivation::Deactivated => {
            info!(username, by = acting_username, "Superadmin deactivated");
            Ok(())
        }
        Deactivation::NotFound => Err(AppError::NotFound("Superadmin")),
        Deactivation::LastActive => Err(AppError::InvalidRequest(
            "Cannot deactivate the last active admin account".to_string(),
        )),
    }
}

/// Create the configured bootstrap superadmin if it does not exist yet.
///
/// Does nothing unless both `ADMIN_USERNAME` and `ADMIN_PASSWORD` are set.
/// A name the admin API would refuse, or an empty password, is an error.
/// An existing account with that name is left as it is, password included.
pub async fn bootstrap_superadmin(
    store: &dyn CredentialStore,
    hasher: &PasswordHasher,
    config: &Config,
) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        info!("No bootstrap superadmin configured");
        return Ok(());
    };
    if let Some((msg, _)) = superadmin::username_problem(username) {
        return Err(AppError::InvalidRequest(format!("ADMIN_USERNAME is not usable: {msg}")));
    }
    if password.is_empty() {
        return Err(AppError::InvalidRequest("ADMIN_PASSWORD must not be empty".to_string()));
    }

    if store.get_superadmin(username).await?.is_some() {
        info!(username = %username, "Bootstrap superadmin already exists");
        return Ok(());
    }

    let hashed = hasher.hash(password).await?;
    match store.create_superadmin(username, &hashed).await {
        Ok(_) => {
            info!(username = %username, "Bootstrap superadmin created");
            Ok(())
        }
        // Another instance created it first.
        Err(crate::store::StoreError::Conflict(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}
