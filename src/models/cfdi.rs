//! CFDI verification payloads.
//!
//! This module defines:
//! - `CfdiRequest`: the identity of one tax document (UUID, issuer, recipient, total)
//! - `CfdiResponse`: the normalized status the SAT reported for it
//! - `BatchItem` / `BatchCfdiResponse`: per-document outcomes of a batch request

use crate::{
    error::FieldError,
    validation::{Fields, FromJson},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

/// Taxpayer identifier: 3 letters (companies) or 4 (individuals), a YYMMDD
/// date and a 3-character check sequence.
static RFC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-ZÑ&]{3,4}[0-9]{6}[A-Z0-9]{3}$").expect("valid RFC regex"));

/// Decimal amount as text. Kept as a string so no precision is lost.
static TOTAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]{1,6})?$").expect("valid total regex"));

/// Identity of a CFDI as understood by the SAT consultation service.
///
/// # JSON Example
///
/// ```json
/// {
///   "uuid": "6128396f-c09b-4ec6-8699-43c5f7e3b230",
///   "emisor_rfc": "CDZ050722LA9",
///   "receptor_rfc": "XIN06112344A",
///   "total": "12000.00"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CfdiRequest {
    /// Folio fiscal of the document.
    pub uuid: String,

    /// RFC of the issuer.
    pub emisor_rfc: String,

    /// RFC of the recipient.
    pub receptor_rfc: String,

    /// Document total, decimal-formatted.
    pub total: String,
}

impl FromJson for CfdiRequest {
    fn from_json(value: &Value, loc: &[Value]) -> Result<Self, Vec<FieldError>> {
        let mut fields = Fields::new(value, loc);
        let uuid = fields.required_str("uuid");
        let emisor_rfc = fields.required_str("emisor_rfc");
        let receptor_rfc = fields.required_str("receptor_rfc");
        let total = fields.required_str("total");

        if let Some(uuid) = &uuid {
            if uuid::Uuid::parse_str(uuid).is_err() {
                fields.reject("uuid", "Input should be a valid UUID", "uuid_parsing");
            }
        }
        for (name, rfc) in [("emisor_rfc", &emisor_rfc), ("receptor_rfc", &receptor_rfc)] {
            if let Some(rfc) = rfc {
                if !RFC_PATTERN.is_match(rfc) {
                    fields.reject(name, "Input should be a valid RFC", "string_pattern_mismatch");
                }
            }
        }
        if let Some(total) = &total {
            if !TOTAL_PATTERN.is_match(total) {
                fields.reject("total", "Input should be a decimal amount", "string_pattern_mismatch");
            }
        }

        match (uuid, emisor_rfc, receptor_rfc, total) {
            (Some(uuid), Some(emisor_rfc), Some(receptor_rfc), Some(total)) if fields.is_clean() => Ok(Self {
                uuid,
                emisor_rfc,
                receptor_rfc,
                total,
            }),
            _ => Err(fields.into_errors()),
        }
    }
}

/// Status of a CFDI as reported by the SAT.
///
/// Every field is optional: the SAT may answer with partial data, and a
/// field it leaves out is reported as `null` (unknown) rather than guessed.
/// All fields are always present in the JSON output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CfdiResponse {
    /// `Vigente`, `Cancelado` or `No Encontrado`.
    pub estado: Option<String>,

    /// e.g. `Cancelable sin aceptación`, `Cancelable con aceptación`, `No cancelable`.
    pub es_cancelable: Option<String>,

    /// Cancellation workflow status, when one exists.
    pub estatus_cancelacion: Option<String>,

    /// SAT status code, e.g. `S - Comprobante obtenido satisfactoriamente.`
    pub codigo_estatus: Option<String>,

    /// EFOS (blacklisted issuer) validation result.
    pub validacion_efos: Option<String>,

    /// The SAT response body as received.
    pub raw_response: Option<String>,
}

/// Batch verification request: at least one CFDI.
#[derive(Debug, Clone)]
pub struct BatchCfdiRequest {
    pub cfdis: Vec<CfdiRequest>,
}

impl FromJson for BatchCfdiRequest {
    fn from_json(value: &Value, loc: &[Value]) -> Result<Self, Vec<FieldError>> {
        let mut fields = Fields::new(value, loc);
        let Some(items) = fields.required_array("cfdis") else {
            return Err(fields.into_errors());
        };

        if items.is_empty() {
            fields.reject(
                "cfdis",
                "List should have at least 1 item after validation, not 0",
                "too_short",
            );
            return Err(fields.into_errors());
        }

        let mut cfdis = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut item_loc = fields.loc().to_vec();
            item_loc.push(json!("cfdis"));
            item_loc.push(json!(index));
            if let Some(cfdi) = fields.nested::<CfdiRequest>(&item_loc, item) {
                cfdis.push(cfdi);
            }
        }

        if fields.is_clean() {
            Ok(Self { cfdis })
        } else {
            Err(fields.into_errors())
        }
    }
}

/// Outcome of one CFDI in a batch.
///
/// Exactly one of two shapes: a verified response with `error: null`, or an
/// all-null response with the error message that prevented verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub request: CfdiRequest,
    pub response: CfdiResponse,
    pub error: Option<String>,
}

impl BatchItem {
    pub fn verified(request: CfdiRequest, response: CfdiResponse) -> Self {
        Self {
            request,
            response,
            error: None,
        }
    }

    pub fn failed(request: CfdiRequest, error: impl Into<String>) -> Self {
        Self {
            request,
            response: CfdiResponse::default(),
            error: Some(error.into()),
        }
    }
}

/// Batch verification response, in request order.
#[derive(Debug, Serialize)]
pub struct BatchCfdiResponse {
    pub results: Vec<BatchItem>,
}
