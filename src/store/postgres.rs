//! PostgreSQL storage backend.
//!
//! Token values and usernames are protected by UNIQUE constraints; every
//! mutation is a single statement (or one transaction), so concurrent
//! create/regenerate calls never leave two live values for one token.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{
    CredentialStore, Deactivation, HistoryStore, StoreError, TOKEN_INSERT_ATTEMPTS,
    generate_token_value,
};
use crate::{
    db::DbPool,
    models::{
        api_token::{ApiToken, TokenUpdate},
        history::{HistoryEntry, NewHistoryEntry},
        superadmin::SuperAdmin,
    },
    validation::Pagination,
};

const TOKEN_COLUMNS: &str = "id, token, description, is_active, created_at, updated_at";
const SUPERADMIN_COLUMNS: &str = "id, username, hashed_password, is_active, created_at, updated_at";
const HISTORY_COLUMNS: &str = "id, token_id, uuid, emisor_rfc, receptor_rfc, total, estado, \
    es_cancelable, estatus_cancelacion, codigo_estatus, validacion_efos, created_at";

/// Credential and history store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_token(&self, id: i64) -> Result<Option<ApiToken>, StoreError> {
        let token = sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn find_token_by_value(&self, value: &str) -> Result<Option<ApiToken>, StoreError> {
        // Indexed equality lookup; no candidate set is compared in memory.
        let token = sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE token = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn list_tokens(&self, page: Pagination) -> Result<(Vec<ApiToken>, i64), StoreError> {
        let tokens = sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_tokens")
            .fetch_one(&self.pool)
            .await?;

        Ok((tokens, total))
    }

    async fn create_token(&self, description: Option<String>) -> Result<ApiToken, StoreError> {
        for _ in 0..TOKEN_INSERT_ATTEMPTS {
            let result = sqlx::query_as::<_, ApiToken>(&format!(
                "INSERT INTO api_tokens (token, description) VALUES ($1, $2) RETURNING {TOKEN_COLUMNS}"
            ))
            .bind(generate_token_value())
            .bind(&description)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(token) => {
                    info!(token_id = token.id, "Created API token");
                    return Ok(token);
                }
                Err(err) if is_unique_violation(&err) => {
                    warn!("Generated token value collided, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::TokenCollision)
    }

    async fn update_token(&self, id: i64, update: TokenUpdate) -> Result<Option<ApiToken>, StoreError> {
        let token = sqlx::query_as::<_, ApiToken>(&format!(
            r#"
            UPDATE api_tokens
            SET description = COALESCE($2, description),
                is_active = COALESCE($3, is_active),
                updated_at = now()
            WHERE id = $1
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.description)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn delete_token(&self, id: i64) -> Result<bool, StoreError> {
        // cfdi_history.token_id is ON DELETE SET NULL.
        let result = sqlx::query("DELETE FROM api_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn regenerate_token(&self, id: i64) -> Result<Option<ApiToken>, StoreError> {
        for _ in 0..TOKEN_INSERT_ATTEMPTS {
            // One UPDATE: the old value stops matching in the same statement
            // that makes the new one visible.
            let result = sqlx::query_as::<_, ApiToken>(&format!(
                "UPDATE api_tokens SET token = $2, updated_at = now() WHERE id = $1 RETURNING {TOKEN_COLUMNS}"
            ))
            .bind(id)
            .bind(generate_token_value())
            .fetch_optional(&self.pool)
            .await;

            match result {
                Ok(token) => return Ok(token),
                Err(err) if is_unique_violation(&err) => {
                    warn!(token_id = id, "Regenerated token value collided, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::TokenCollision)
    }

    async fn get_superadmin(&self, username: &str) -> Result<Option<SuperAdmin>, StoreError> {
        let admin = sqlx::query_as::<_, SuperAdmin>(&format!(
            "SELECT {SUPERADMIN_COLUMNS} FROM superadmins WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn create_superadmin(&self, username: &str, hashed_password: &str) -> Result<SuperAdmin, StoreError> {
        sqlx::query_as::<_, SuperAdmin>(&format!(
            "INSERT INTO superadmins (username, hashed_password) VALUES ($1, $2) RETURNING {SUPERADMIN_COLUMNS}"
        ))
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict("Username already exists".to_string())
            } else {
                err.into()
            }
        })
    }

    async fn update_superadmin_password(
        &self,
        username: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE superadmins
            SET hashed_password = $3, updated_at = now()
            WHERE username = $1 AND hashed_password = $2
            "#,
        )
        .bind(username)
        .bind(expected_hash)
        .bind(new_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_superadmin(&self, username: &str) -> Result<Deactivation, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock every active row so two concurrent deactivations cannot both
        // see two active accounts and leave none.
        let active: Vec<String> =
            sqlx::query_scalar("SELECT username FROM superadmins WHERE is_active ORDER BY id FOR UPDATE")
                .fetch_all(&mut *tx)
                .await?;

        let target: Option<bool> = sqlx::query_scalar("SELECT is_active FROM superadmins WHERE username = $1")
            .bind(username)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match target {
            None => Deactivation::NotFound,
            Some(false) => Deactivation::Deactivated,
            Some(true) if active.len() <= 1 => Deactivation::LastActive,
            Some(true) => {
                sqlx::query("UPDATE superadmins SET is_active = FALSE, updated_at = now() WHERE username = $1")
                    .bind(username)
                    .execute(&mut *tx)
                    .await?;
                Deactivation::Deactivated
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn record_verification(&self, entry: NewHistoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cfdi_history (
                token_id, uuid, emisor_rfc, receptor_rfc, total,
                estado, es_cancelable, estatus_cancelacion, codigo_estatus, validacion_efos
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.token_id)
        .bind(&entry.request.uuid)
        .bind(&entry.request.emisor_rfc)
        .bind(&entry.request.receptor_rfc)
        .bind(&entry.request.total)
        .bind(&entry.response.estado)
        .bind(&entry.response.es_cancelable)
        .bind(&entry.response.estatus_cancelacion)
        .bind(&entry.response.codigo_estatus)
        .bind(&entry.response.validacion_efos)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_history(&self, token_id: i64, page: Pagination) -> Result<(Vec<HistoryEntry>, i64), StoreError> {
        let items = sqlx::query_as::<_, HistoryEntry>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM cfdi_history WHERE token_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(token_id)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cfdi_history WHERE token_id = $1")
            .bind(token_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((items, total))
    }

    async fn history_for_uuid(&self, token_id: i64, uuid: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let items = sqlx::query_as::<_, HistoryEntry>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM cfdi_history WHERE token_id = $1 AND lower(uuid) = lower($2) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(token_id)
        .bind(uuid)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
