//! PostgreSQL pool and schema setup for [`crate::store::PgStore`].

use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

/// How long a request waits for a free connection before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection pool of at most `max_connections`.
///
/// # Errors
///
/// Fails if the URL is invalid or the server refuses the first connection.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Apply pending migrations from `migrations/`.
///
/// Applied versions are recorded in `_sqlx_migrations`; rerunning is a no-op.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
