//! CFDI Verification Service
//!
//! A REST API that checks Mexican electronic invoices (CFDI) against the SAT
//! consultation service, one at a time or in batches, for consumers holding
//! an API token. Superadmins manage tokens and other superadmins.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Storage**: PostgreSQL with sqlx, or an in-memory store (`DATABASE_URL=memory://`)
//! - **Authentication**: Bearer API tokens for consumers, HTTP Basic + Argon2id for superadmins
//! - **Upstream**: SAT `ConsultaCFDIService` over SOAP
//! - **Format**: JSON requests/responses

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod validation;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use config::Config;
use middleware::auth::{self, BasicSuperAdminAuth, BearerTokenAuth};
use services::{batch_service::BatchVerifier, password::PasswordHasher, verifier::DocumentVerifier};
use std::sync::Arc;
use store::{CredentialStore, HistoryStore};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub history: Arc<dyn HistoryStore>,
    pub verifier: Arc<dyn DocumentVerifier>,
    pub batch: BatchVerifier,
    pub hasher: PasswordHasher,
    pub config: Arc<Config>,
}

impl AppState {
    /// The batch fan-out limit is taken from `config`.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        history: Arc<dyn HistoryStore>,
        verifier: Arc<dyn DocumentVerifier>,
        hasher: PasswordHasher,
        config: Config,
    ) -> Self {
        let batch = BatchVerifier::new(Arc::clone(&verifier), config.batch_concurrency());
        Self {
            credentials,
            history,
            verifier,
            batch,
            hasher,
            config: Arc::new(config),
        }
    }
}

/// Build the HTTP router.
pub fn app(state: AppState) -> Router {
    // Consumer routes (Bearer token)
    let consumer_routes = Router::new()
        .route("/verify-cfdi", post(handlers::cfdi::verify_cfdi))
        .route("/verify-cfdi-batch", post(handlers::cfdi::verify_cfdi_batch))
        .route("/cfdi-history", get(handlers::cfdi::list_history))
        .route("/cfdi-history/{uuid}", get(handlers::cfdi::history_for_uuid))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::require::<BearerTokenAuth>,
        ));

    // Admin routes (superadmin Basic auth)
    let admin_routes = Router::new()
        .route(
            "/admin/tokens",
            post(handlers::admin::create_token).get(handlers::admin::list_tokens),
        )
        .route(
            "/admin/tokens/{token_id}",
            get(handlers::admin::get_token)
                .put(handlers::admin::update_token)
                .delete(handlers::admin::delete_token),
        )
        .route(
            "/admin/tokens/{token_id}/regenerate",
            post(handlers::admin::regenerate_token),
        )
        .route("/admin/superadmins", post(handlers::admin::create_superadmin))
        .route(
            "/admin/superadmins/{username}",
            delete(handlers::admin::deactivate_superadmin),
        )
        .route(
            "/admin/superadmins/{username}/password",
            put(handlers::admin::update_password),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::require::<BasicSuperAdminAuth>,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .merge(consumer_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
