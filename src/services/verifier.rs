//! Single-document verification against the tax authority.

use crate::models::cfdi::{CfdiRequest, CfdiResponse};
use async_trait::async_trait;

/// Why a verification call produced no usable status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Connection could not be established or broke mid-request.
    #[error("Error connecting to SAT service: {0}")]
    Transport(String),

    #[error("SAT service did not answer in time")]
    Timeout,

    /// The service answered with a non-success HTTP status.
    #[error("SAT service error: {status} - {body}")]
    Status { status: u16, body: String },

    /// The body could not be read as a consultation result.
    #[error("Error parsing SAT response: {0}")]
    Malformed(String),
}

impl VerifyError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VerifyError::Timeout
        } else {
            VerifyError::Transport(err.to_string())
        }
    }
}

/// One round trip to the authority for one document.
///
/// Implementations must not cache: the authority's answer can change at any
/// time (a document gets cancelled), and a stale answer is worse than none.
#[async_trait]
pub trait DocumentVerifier: Send + Sync {
    async fn verify(&self, cfdi: &CfdiRequest) -> Result<CfdiResponse, VerifyError>;
}
