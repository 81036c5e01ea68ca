//! Admin HTTP handlers.
//!
//! Token lifecycle:
//! - POST /admin/tokens - Create a token
//! - GET /admin/tokens - List tokens (`skip`, `limit`)
//! - GET /admin/tokens/{token_id} - Get one token
//! - PUT /admin/tokens/{token_id} - Update description / active flag
//! - DELETE /admin/tokens/{token_id} - Delete a token
//! - POST /admin/tokens/{token_id}/regenerate - Issue a new value for a token
//!
//! Superadmins:
//! - POST /admin/superadmins - Create a superadmin
//! - PUT /admin/superadmins/{username}/password - Change a password
//! - DELETE /admin/superadmins/{username} - Deactivate a superadmin
//!
//! Every route requires HTTP Basic credentials of an active superadmin.

use crate::{
    AppState,
    error::AppError,
    middleware::auth::AdminPrincipal,
    models::{
        MessageResponse,
        api_token::{CreateTokenRequest, TokenListResponse, TokenResponse, TokenUpdate},
        superadmin::{CreateSuperAdminRequest, SuperAdminResponse, UpdatePasswordRequest},
    },
    services::admin_service,
    validation::{self, Pagination, ValidJson},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::PathRejection, rejection::QueryRejection},
};
use std::collections::HashMap;

/// Create a new API token.
///
/// # Endpoint
///
/// `POST /admin/tokens`
///
/// # Request Body
///
/// ```json
/// { "description": "ERP integration" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: the token, including its bearer value
/// - **Error (401)**: Invalid superadmin credentials
pub async fn create_token(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminPrincipal>,
    ValidJson(request): ValidJson<CreateTokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = admin_service::create_token(state.credentials.as_ref(), request.description).await?;
    tracing::info!(token_id = token.id, by = %admin.username, "Token issued");
    Ok(Json(token.into()))
}

/// List API tokens.
///
/// # Endpoint
///
/// `GET /admin/tokens?skip=0&limit=100`
///
/// # Response
///
/// ```json
/// { "tokens": [ ... ], "total": 42 }
/// ```
///
/// `total` counts all tokens, not just this page.
pub async fn list_tokens(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<TokenListResponse>, AppError> {
    let page = Pagination::from_query(query)?;
    Ok(Json(admin_service::list_tokens(state.credentials.as_ref(), page).await?))
}

/// `GET /admin/tokens/{token_id}`
pub async fn get_token(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let id = validation::token_id(path)?;
    let token = admin_service::get_token(state.credentials.as_ref(), id).await?;
    Ok(Json(token.into()))
}

/// Update a token.
///
/// # Endpoint
///
/// `PUT /admin/tokens/{token_id}`
///
/// # Request Body
///
/// Both fields optional; absent or `null` leaves the value unchanged.
///
/// ```json
/// { "description": "ERP (prod)", "is_active": false }
/// ```
pub async fn update_token(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    ValidJson(update): ValidJson<TokenUpdate>,
) -> Result<Json<TokenResponse>, AppError> {
    let id = validation::token_id(path)?;
    let token = admin_service::update_token(state.credentials.as_ref(), id, update).await?;
    Ok(Json(token.into()))
}

/// `DELETE /admin/tokens/{token_id}`
///
/// ```json
/// { "message": "Token 7 successfully deleted" }
/// ```
pub async fn delete_token(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = validation::token_id(path)?;
    admin_service::delete_token(state.credentials.as_ref(), id).await?;
    Ok(Json(MessageResponse::new(format!("Token {id} successfully deleted"))))
}

/// Regenerate a token's value.
///
/// # Endpoint
///
/// `POST /admin/tokens/{token_id}/regenerate`
///
/// Same id and description, new bearer value. The old value is rejected
/// from the next request on.
pub async fn regenerate_token(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let id = validation::token_id(path)?;
    let token = admin_service::regenerate_token(state.credentials.as_ref(), id).await?;
    Ok(Json(token.into()))
}

/// Create a superadmin.
///
/// # Endpoint
///
/// `POST /admin/superadmins`
///
/// # Request Body
///
/// ```json
/// { "username": "ops", "password": "..." }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{"username", "is_active", "created_at"}`
/// - **Error (409)**: Username already exists
pub async fn create_superadmin(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminPrincipal>,
    ValidJson(request): ValidJson<CreateSuperAdminRequest>,
) -> Result<Json<SuperAdminResponse>, AppError> {
    let created = admin_service::create_superadmin(state.credentials.as_ref(), &state.hasher, request).await?;
    tracing::info!(username = %created.username, by = %admin.username, "Superadmin added");
    Ok(Json(created.into()))
}

/// Change a superadmin's password.
///
/// # Endpoint
///
/// `PUT /admin/superadmins/{username}/password`
///
/// # Request Body
///
/// ```json
/// { "current_password": "...", "new_password": "..." }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{"message": "Password updated successfully"}`
/// - **Error (401)**: `current_password` does not match
/// - **Error (404)**: Unknown username
/// - **Error (409)**: Password changed concurrently
pub async fn update_password(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    ValidJson(request): ValidJson<UpdatePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let username = validation::path_param(path, "username")?;
    admin_service::update_password(state.credentials.as_ref(), &state.hasher, &username, request).await?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

/// Deactivate a superadmin.
///
/// # Endpoint
///
/// `DELETE /admin/superadmins/{username}`
///
/// Accounts are never deleted. A caller cannot deactivate itself, and the
/// last active account cannot be deactivated.
pub async fn deactivate_superadmin(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminPrincipal>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let username = validation::path_param(path, "username")?;
    admin_service::deactivate_superadmin(state.credentials.as_ref(), &admin.username, &username).await?;
    Ok(Json(MessageResponse::new(format!(
        "Superadmin '{username}' deactivated successfully"
    ))))
}
