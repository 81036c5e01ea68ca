//! In-memory storage backend
//!
//! Keeps tokens, superadmins and history in hashmaps behind one lock, so
//! every operation is atomic with respect to every other. Suitable for
//! development and tests. Data is lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use super::{
    CredentialStore, Deactivation, HistoryStore, StoreError, TOKEN_INSERT_ATTEMPTS,
    generate_token_value,
};
use crate::{
    models::{
        api_token::{ApiToken, TokenUpdate},
        history::{HistoryEntry, NewHistoryEntry},
        superadmin::SuperAdmin,
    },
    validation::Pagination,
};

#[derive(Debug, Default)]
struct State {
    /// Tokens by id; ordered so pagination is stable.
    tokens: BTreeMap<i64, ApiToken>,
    /// Token value -> id. The uniqueness index.
    token_index: HashMap<String, i64>,
    next_token_id: i64,

    superadmins: HashMap<String, SuperAdmin>,
    next_superadmin_id: i64,

    history: Vec<HistoryEntry>,
    next_history_id: i64,
}

impl State {
    fn fresh_token_value(&self) -> Result<String, StoreError> {
        for _ in 0..TOKEN_INSERT_ATTEMPTS {
            let value = generate_token_value();
            if !self.token_index.contains_key(&value) {
                return Ok(value);
            }
        }
        Err(StoreError::TokenCollision)
    }
}

/// In-memory credential and history store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, page: Pagination) -> Vec<T> {
    let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(0);
    items.skip(skip).take(limit).collect()
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_token(&self, id: i64) -> Result<Option<ApiToken>, StoreError> {
        Ok(self.state.lock().tokens.get(&id).cloned())
    }

    async fn find_token_by_value(&self, value: &str) -> Result<Option<ApiToken>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .token_index
            .get(value)
            .and_then(|id| state.tokens.get(id))
            .cloned())
    }

    async fn list_tokens(&self, pagination: Pagination) -> Result<(Vec<ApiToken>, i64), StoreError> {
        let state = self.state.lock();
        let tokens = page(state.tokens.values().cloned(), pagination);
        Ok((tokens, state.tokens.len() as i64))
    }

    async fn create_token(&self, description: Option<String>) -> Result<ApiToken, StoreError> {
        let mut state = self.state.lock();
        let value = state.fresh_token_value()?;

        state.next_token_id += 1;
        let now = Utc::now();
        let token = ApiToken {
            id: state.next_token_id,
            token: value.clone(),
            description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        state.token_index.insert(value, token.id);
        state.tokens.insert(token.id, token.clone());
        info!(token_id = token.id, "Created API token");
        Ok(token)
    }

    async fn update_token(&self, id: i64, update: TokenUpdate) -> Result<Option<ApiToken>, StoreError> {
        let mut state = self.state.lock();
        let Some(token) = state.tokens.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(description) = update.description {
            token.description = Some(description);
        }
        if let Some(is_active) = update.is_active {
            token.is_active = is_active;
        }
        token.updated_at = Utc::now();
        Ok(Some(token.clone()))
    }

    async fn delete_token(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let Some(token) = state.tokens.remove(&id) else {
            return Ok(false);
        };

        state.token_index.remove(&token.token);
        for entry in state.history.iter_mut().filter(|e| e.token_id == Some(id)) {
            entry.token_id = None;
        }
        Ok(true)
    }

    async fn regenerate_token(&self, id: i64) -> Result<Option<ApiToken>, StoreError> {
        let mut state = self.state.lock();
        if !state.tokens.contains_key(&id) {
            return Ok(None);
        }
        let value = state.fresh_token_value()?;

        let State {
            tokens,
            token_index,
            ..
        } = &mut *state;
        let Some(token) = tokens.get_mut(&id) else {
            return Ok(None);
        };

        token_index.remove(&token.token);
        token_index.insert(value.clone(), id);
        token.token = value;
        token.updated_at = Utc::now();
        Ok(Some(token.clone()))
    }

    async fn get_superadmin(&self, username: &str) -> Result<Option<SuperAdmin>, StoreError> {
        Ok(self.state.lock().superadmins.get(username).cloned())
    }

    async fn create_superadmin(&self, username: &str, hashed_password: &str) -> Result<SuperAdmin, StoreError> {
        let mut state = self.state.lock();
        if state.superadmins.contains_key(username) {
            return Err(StoreError::Conflict("Username already exists".to_string()));
        }

        state.next_superadmin_id += 1;
        let now = Utc::now();
        let admin = SuperAdmin {
            id: state.next_superadmin_id,
            username: username.to_string(),
            hashed_password: hashed_password.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.superadmins.insert(admin.username.clone(), admin.clone());
        Ok(admin)
    }

    async fn update_superadmin_password(
        &self,
        username: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        match state.superadmins.get_mut(username) {
            Some(admin) if admin.hashed_password == expected_hash => {
                admin.hashed_password = new_hash.to_string();
                admin.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_superadmin(&self, username: &str) -> Result<Deactivation, StoreError> {
        let mut state = self.state.lock();
        let active = state.superadmins.values().filter(|a| a.is_active).count();
        let Some(admin) = state.superadmins.get_mut(username) else {
            return Ok(Deactivation::NotFound);
        };

        if admin.is_active {
            if active <= 1 {
                return Ok(Deactivation::LastActive);
            }
            admin.is_active = false;
            admin.updated_at = Utc::now();
        }
        Ok(Deactivation::Deactivated)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn record_verification(&self, entry: NewHistoryEntry) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.next_history_id += 1;
        let NewHistoryEntry {
            token_id,
            request,
            response,
        } = entry;

        let row = HistoryEntry {
            id: state.next_history_id,
            token_id: Some(token_id),
            uuid: request.uuid,
            emisor_rfc: request.emisor_rfc,
            receptor_rfc: request.receptor_rfc,
            total: request.total,
            estado: response.estado,
            es_cancelable: response.es_cancelable,
            estatus_cancelacion: response.estatus_cancelacion,
            codigo_estatus: response.codigo_estatus,
            validacion_efos: response.validacion_efos,
            created_at: Utc::now(),
        };
        state.history.push(row);
        Ok(())
    }

    async fn list_history(&self, token_id: i64, pagination: Pagination) -> Result<(Vec<HistoryEntry>, i64), StoreError> {
        let state = self.state.lock();
        let mine: Vec<&HistoryEntry> = state
            .history
            .iter()
            .rev()
            .filter(|e| e.token_id == Some(token_id))
            .collect();
        let total = mine.len() as i64;
        Ok((page(mine.into_iter().cloned(), pagination), total))
    }

    async fn history_for_uuid(&self, token_id: i64, uuid: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|e| e.token_id == Some(token_id) && e.uuid.eq_ignore_ascii_case(uuid))
            .cloned()
            .collect())
    }
}
