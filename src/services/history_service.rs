//! Verification history: recording and lookup.

use crate::{
    error::AppError,
    models::{
        cfdi::{BatchItem, CfdiRequest, CfdiResponse},
        history::{HistoryEntry, HistoryListResponse, NewHistoryEntry},
    },
    store::HistoryStore,
    validation::Pagination,
};

/// Record one successful verification.
///
/// A storage failure is logged and swallowed; the verification result is
/// still returned to the caller.
pub async fn record(store: &dyn HistoryStore, token_id: i64, request: &CfdiRequest, response: &CfdiResponse) {
    let entry = NewHistoryEntry::new(token_id, request, response);
    if let Err(err) = store.record_verification(entry).await {
        tracing::warn!(token_id, uuid = %request.uuid, error = %err, "Failed to record verification history");
    }
}

/// Record every verified item of a batch. Failed items are not recorded.
pub async fn record_batch(store: &dyn HistoryStore, token_id: i64, items: &[BatchItem]) {
    for item in items.iter().filter(|item| item.error.is_none()) {
        record(store, token_id, &item.request, &item.response).await;
    }
}

pub async fn list(store: &dyn HistoryStore, token_id: i64, page: Pagination) -> Result<HistoryListResponse, AppError> {
    let (items, total) = store.list_history(token_id, page).await?;
    Ok(HistoryListResponse { items, total })
}

pub async fn for_uuid(store: &dyn HistoryStore, token_id: i64, uuid: &str) -> Result<Vec<HistoryEntry>, AppError> {
    Ok(store.history_for_uuid(token_id, uuid).await?)
}
