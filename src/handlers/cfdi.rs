//! CFDI verification HTTP handlers.
//!
//! This module implements the consumer-facing endpoints:
//! - POST /verify-cfdi - Verify one CFDI with the SAT
//! - POST /verify-cfdi-batch - Verify many CFDIs, one result per input
//! - GET /cfdi-history - The caller's past verifications
//! - GET /cfdi-history/{uuid} - The caller's past verifications of one CFDI
//!
//! All of them require `Authorization: Bearer <token>`.

use crate::{
    AppState,
    error::AppError,
    middleware::auth::TokenPrincipal,
    models::{
        cfdi::{BatchCfdiRequest, BatchCfdiResponse, CfdiRequest, CfdiResponse},
        history::{HistoryEntry, HistoryListResponse},
    },
    services::history_service,
    validation::{self, Pagination, ValidJson},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::PathRejection, rejection::QueryRejection},
};
use std::collections::HashMap;

/// Verify a single CFDI.
///
/// # Endpoint
///
/// `POST /verify-cfdi`
///
/// # Request Body
///
/// ```json
/// {
///   "uuid": "6128396f-c09b-4ec6-8699-43c5f7e3b230",
///   "emisor_rfc": "CDZ050722LA9",
///   "receptor_rfc": "XIN06112344A",
///   "total": "12000.00"
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: the SAT status, unknown fields as `null`
/// - **Error (401)**: Missing, invalid or inactive token
/// - **Error (422)**: Malformed body
/// - **Error (502)**: SAT unreachable or returned unusable data
pub async fn verify_cfdi(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenPrincipal>,
    ValidJson(request): ValidJson<CfdiRequest>,
) -> Result<Json<CfdiResponse>, AppError> {
    let response = state.verifier.verify(&request).await?;

    history_service::record(state.history.as_ref(), auth.token_id, &request, &response).await;

    Ok(Json(response))
}

/// Verify a batch of CFDIs.
///
/// # Endpoint
///
/// `POST /verify-cfdi-batch`
///
/// # Request Body
///
/// ```json
/// { "cfdis": [ { "uuid": "...", "emisor_rfc": "...", "receptor_rfc": "...", "total": "..." } ] }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{"results": [...]}`, one item per input in input order.
///   An item that could not be verified carries `error` and an all-null `response`.
/// - **Error (422)**: Malformed body or empty `cfdis`
/// - **Error (504)**: The whole batch exceeded its deadline; no partial results
pub async fn verify_cfdi_batch(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenPrincipal>,
    ValidJson(request): ValidJson<BatchCfdiRequest>,
) -> Result<Json<BatchCfdiResponse>, AppError> {
    let deadline = state.config.batch_timeout();

    // Timing out drops the batch future, which aborts every pending call.
    let results = tokio::time::timeout(deadline, state.batch.verify_batch(request.cfdis))
        .await
        .map_err(|_| {
            tracing::warn!(token_id = auth.token_id, ?deadline, "Batch verification timed out");
            AppError::Timeout
        })??;

    history_service::record_batch(state.history.as_ref(), auth.token_id, &results).await;

    Ok(Json(BatchCfdiResponse { results }))
}

/// List the caller's verification history, newest first.
///
/// # Endpoint
///
/// `GET /cfdi-history?skip=0&limit=100`
pub async fn list_history(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenPrincipal>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<HistoryListResponse>, AppError> {
    let page = Pagination::from_query(query)?;
    let history = history_service::list(state.history.as_ref(), auth.token_id, page).await?;
    Ok(Json(history))
}

/// All of the caller's verifications of one CFDI, newest first.
///
/// # Endpoint
///
/// `GET /cfdi-history/{uuid}`
pub async fn history_for_uuid(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenPrincipal>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let uuid = validation::path_param(path, "uuid")?;
    let entries = history_service::for_uuid(state.history.as_ref(), auth.token_id, &uuid).await?;
    Ok(Json(entries))
}
