//! Verification history.
//!
//! Each successful verification is recorded against the token that asked
//! for it, so consumers can look up what the SAT answered earlier.

use crate::models::cfdi::{CfdiRequest, CfdiResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Represents a row of the `cfdi_history` table.
///
/// `token_id` becomes NULL when the token is deleted; the row itself stays.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(skip_serializing)]
    pub token_id: Option<i64>,
    pub uuid: String,
    pub emisor_rfc: String,
    pub receptor_rfc: String,
    pub total: String,
    pub estado: Option<String>,
    pub es_cancelable: Option<String>,
    pub estatus_cancelacion: Option<String>,
    pub codigo_estatus: Option<String>,
    pub validacion_efos: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A verification about to be recorded.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub token_id: i64,
    pub request: CfdiRequest,
    pub response: CfdiResponse,
}

impl NewHistoryEntry {
    pub fn new(token_id: i64, request: &CfdiRequest, response: &CfdiResponse) -> Self {
        Self {
            token_id,
            request: request.clone(),
            // The raw SOAP body is not kept in history.
            response: CfdiResponse {
                raw_response: None,
                ..response.clone()
            },
        }
    }
}

/// One page of a token's history plus the total number of entries.
#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub items: Vec<HistoryEntry>,
    pub total: i64,
}
