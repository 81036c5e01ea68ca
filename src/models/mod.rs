//! Data models representing database entities and API payloads.

use serde::Serialize;

/// API token model
pub mod api_token;
/// CFDI verification payloads
pub mod cfdi;
/// Verification history records
pub mod history;
/// Superadmin account model
pub mod superadmin;

/// Plain confirmation body, e.g. `{"message": "Token 3 successfully deleted"}`.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
