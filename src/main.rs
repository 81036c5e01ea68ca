//! CFDI Verification Service - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open storage: PostgreSQL pool + migrations, or the in-memory store
//! 3. Create the bootstrap superadmin if configured
//! 4. Build the SAT client and HTTP router
//! 5. Start server on configured port

use cfdi_verification_service::{
    AppState, app,
    config::Config,
    db,
    services::{admin_service, password::PasswordHasher, sat_client::SatClient},
    store::{CredentialStore, HistoryStore, MemoryStore, PgStore},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    // Open storage
    let (credentials, history) = open_store(&config).await?;

    let hasher = PasswordHasher::from_config(&config)?;
    admin_service::bootstrap_superadmin(credentials.as_ref(), &hasher, &config).await?;

    let verifier = Arc::new(SatClient::from_config(&config)?);
    tracing::info!(endpoint = %config.sat_service_url, "SAT client ready");

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState::new(credentials, history, verifier, hasher, config);

    // Bind to network address and start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Both store traits are served by the same backend instance.
async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn CredentialStore>, Arc<dyn HistoryStore>)> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; all data is lost on restart");
        let store = Arc::new(MemoryStore::new());
        let credentials: Arc<dyn CredentialStore> = store.clone();
        let history: Arc<dyn HistoryStore> = store;
        return Ok((credentials, history));
    }

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(PgStore::new(pool));
    let credentials: Arc<dyn CredentialStore> = store.clone();
    let history: Arc<dyn HistoryStore> = store;
    Ok((credentials, history))
}
