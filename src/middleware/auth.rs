//! Authentication middleware.
//!
//! Two schemes guard two groups of routes:
//! - [`BearerTokenAuth`]: `Authorization: Bearer <token>` for verification endpoints
//! - [`BasicSuperAdminAuth`]: `Authorization: Basic <base64(user:pass)>` for admin endpoints
//!
//! Both implement [`Authenticator`]. The generic [`require`] middleware runs
//! one of them, rejects the request with 401 on failure, and otherwise
//! inserts the resolved principal into the request extensions, where
//! handlers read it with `Extension<TokenPrincipal>` / `Extension<AdminPrincipal>`.

use crate::{AppState, error::AppError};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Identity of the API token that authenticated a request.
#[derive(Debug, Clone)]
pub struct TokenPrincipal {
    /// Used to scope history queries to the caller.
    pub token_id: i64,
    pub description: Option<String>,
}

/// Identity of the superadmin that authenticated a request.
#[derive(Debug, Clone)]
pub struct AdminPrincipal {
    pub id: i64,
    pub username: String,
}

/// A way of turning request headers into a principal.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    type Principal: Clone + Send + Sync + 'static;

    /// Challenge sent back in `WWW-Authenticate`.
    const SCHEME: &'static str;

    async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Self::Principal, AppError>;

    fn rejected() -> AppError {
        AppError::Unauthenticated { scheme: Self::SCHEME }
    }
}

/// Authenticates consumers by their API token.
///
/// The token must exist and be active. Lookup is by exact value against a
/// unique index, so no candidate set is compared in memory.
#[derive(Debug, Clone, Copy)]
pub struct BearerTokenAuth;

#[async_trait]
impl Authenticator for BearerTokenAuth {
    type Principal = TokenPrincipal;
    const SCHEME: &'static str = "Bearer";

    async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<TokenPrincipal, AppError> {
        let value = bearer_credential(headers).ok_or_else(Self::rejected)?;

        let token = state
            .credentials
            .find_token_by_value(value)
            .await?
            .ok_or_else(Self::rejected)?;

        if !token.is_active {
            tracing::warn!(token_id = token.id, "Rejected inactive API token");
            return Err(Self::rejected());
        }

        Ok(TokenPrincipal {
            token_id: token.id,
            description: token.description,
        })
    }
}

/// Authenticates superadmins by username and password.
///
/// Unknown usernames still pay for one password verification so that
/// response time does not reveal which accounts exist.
#[derive(Debug, Clone, Copy)]
pub struct BasicSuperAdminAuth;

#[async_trait]
impl Authenticator for BasicSuperAdminAuth {
    type Principal = AdminPrincipal;
    const SCHEME: &'static str = "Basic";

    async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AdminPrincipal, AppError> {
        let (username, password) = basic_credentials(headers).ok_or_else(Self::rejected)?;

        let Some(admin) = state.credentials.get_superadmin(&username).await? else {
            state.hasher.verify_dummy(&password).await?;
            tracing::warn!(username = %username, "Rejected unknown superadmin");
            return Err(Self::rejected());
        };

        let password_ok = state.hasher.verify(&password, &admin.hashed_password).await?;
        if !password_ok || !admin.is_active {
            tracing::warn!(username = %username, active = admin.is_active, "Rejected superadmin credentials");
            return Err(Self::rejected());
        }

        Ok(AdminPrincipal {
            id: admin.id,
            username: admin.username,
        })
    }
}

/// Middleware that requires authenticator `A` to succeed.
///
/// # Usage
///
/// ```ignore
/// router.route_layer(axum::middleware::from_fn_with_state(
///     state.clone(),
///     auth::require::<BearerTokenAuth>,
/// ))
/// ```
pub async fn require<A: Authenticator>(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = A::authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Split `Authorization: <scheme> <credentials>`, matching the scheme case-insensitively.
fn credentials_for<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (given, credentials) = header.split_once(' ')?;
    if !given.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let credentials = credentials.trim();
    (!credentials.is_empty()).then_some(credentials)
}

fn bearer_credential(headers: &HeaderMap) -> Option<&str> {
    credentials_for(headers, "Bearer")
}

/// Decode `Basic` credentials into `(username, password)`.
///
/// The password may itself contain `:`; only the first one separates.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = credentials_for(headers, "Basic")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
