//! SAT consultation client.
//!
//! Talks to the public `ConsultaCFDIService` SOAP endpoint and normalizes its
//! answer into a [`CfdiResponse`].
//!
//! # Request
//!
//! A SOAP 1.1 `Consulta` call whose only argument is the "printed
//! expression" of the document: `?re={issuer}&rr={recipient}&tt={total}&id={uuid}`.
//!
//! # Response
//!
//! ```xml
//! <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
//!   <s:Body>
//!     <ConsultaResponse xmlns="http://tempuri.org/">
//!       <ConsultaResult xmlns:a="http://schemas.datacontract.org/2004/07/Sat.Cfdi.Negocio.ConsultaCfdi.Servicio">
//!         <a:CodigoEstatus>S - Comprobante obtenido satisfactoriamente.</a:CodigoEstatus>
//!         <a:EsCancelable>Cancelable con aceptación</a:EsCancelable>
//!         <a:Estado>Vigente</a:Estado>
//!         <a:EstatusCancelacion/>
//!         <a:ValidacionEFOS>200</a:ValidacionEFOS>
//!       </ConsultaResult>
//!     </ConsultaResponse>
//!   </s:Body>
//! </s:Envelope>
//! ```
//!
//! Fields may also arrive as attributes of `ConsultaResult`; both forms are read.

use crate::{
    config::Config,
    error::AppError,
    models::cfdi::{CfdiRequest, CfdiResponse},
    services::verifier::{DocumentVerifier, VerifyError},
};
use async_trait::async_trait;
use quick_xml::{
    Reader,
    escape::escape,
    events::{BytesStart, Event},
};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

const SOAP_ACTION: &str = "http://tempuri.org/IConsultaCFDIService/Consulta";

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for the SAT consultation service.
///
/// Holds one connection pool for the life of the process.
#[derive(Debug, Clone)]
pub struct SatClient {
    client: reqwest::Client,
    endpoint: String,
}

impl SatClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(config.sat_service_url.clone(), config.sat_timeout())
    }
}

#[async_trait]
impl DocumentVerifier for SatClient {
    async fn verify(&self, cfdi: &CfdiRequest) -> Result<CfdiResponse, VerifyError> {
        tracing::info!(
            uuid = %cfdi.uuid,
            emisor = %cfdi.emisor_rfc,
            receptor = %cfdi.receptor_rfc,
            "Verifying CFDI"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml;charset=UTF-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(soap_envelope(cfdi))
            .send()
            .await
            .map_err(VerifyError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(VerifyError::from_reqwest)?;

        if !status.is_success() {
            tracing::error!(uuid = %cfdi.uuid, status = status.as_u16(), "SAT service error");
            return Err(VerifyError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let mut result = parse_consulta_response(&body).inspect_err(|e| {
            tracing::error!(uuid = %cfdi.uuid, error = %e, "Unusable SAT response");
        })?;
        result.raw_response = Some(body);

        tracing::info!(uuid = %cfdi.uuid, estado = ?result.estado, "CFDI verification successful");
        Ok(result)
    }
}

/// Build the SOAP request body for one document.
pub fn soap_envelope(cfdi: &CfdiRequest) -> String {
    let expression = format!(
        "?re={}&rr={}&tt={}&id={}",
        cfdi.emisor_rfc, cfdi.receptor_rfc, cfdi.total, cfdi.uuid
    );
    format!(
        r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:tem="http://tempuri.org/"><soap:Header/><soap:Body><tem:Consulta><tem:expresionImpresa>{}</tem:expresionImpresa></tem:Consulta></soap:Body></soap:Envelope>"#,
        escape(expression.as_str())
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Estado,
    EsCancelable,
    EstatusCancelacion,
    CodigoEstatus,
    ValidacionEfos,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Estado" => Some(Field::Estado),
            b"EsCancelable" => Some(Field::EsCancelable),
            b"EstatusCancelacion" => Some(Field::EstatusCancelacion),
            b"CodigoEstatus" => Some(Field::CodigoEstatus),
            b"ValidacionEFOS" => Some(Field::ValidacionEfos),
            _ => None,
        }
    }

    fn slot(self, result: &mut CfdiResponse) -> &mut Option<String> {
        match self {
            Field::Estado => &mut result.estado,
            Field::EsCancelable => &mut result.es_cancelable,
            Field::EstatusCancelacion => &mut result.estatus_cancelacion,
            Field::CodigoEstatus => &mut result.codigo_estatus,
            Field::ValidacionEfos => &mut result.validacion_efos,
        }
    }
}

/// Store a field value; blank values stay unknown.
fn set(result: &mut CfdiResponse, field: Field, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        *field.slot(result) = Some(value.to_string());
    }
}

fn read_attributes(element: &BytesStart<'_>, result: &mut CfdiResponse) -> Result<(), VerifyError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| VerifyError::Malformed(e.to_string()))?;
        if let Some(field) = Field::from_local_name(attr.key.local_name().as_ref()) {
            let value = attr
                .unescape_value()
                .map_err(|e| VerifyError::Malformed(e.to_string()))?;
            set(result, field, &value);
        }
    }
    Ok(())
}

/// Extract the consultation fields from a SOAP response body.
///
/// Fails if the body is not well-formed XML or has no `ConsultaResult`.
/// `raw_response` is left unset.
pub fn parse_consulta_response(body: &str) -> Result<CfdiResponse, VerifyError> {
    let mut reader = Reader::from_str(body);
    let mut result = CfdiResponse::default();
    let mut saw_result = false;
    let mut current: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = element.local_name();
                saw_result |= name.as_ref() == b"ConsultaResult";
                current = Field::from_local_name(name.as_ref());
                read_attributes(&element, &mut result)?;
            }
            Ok(Event::Empty(element)) => {
                saw_result |= element.local_name().as_ref() == b"ConsultaResult";
                read_attributes(&element, &mut result)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(field) = current {
                    let value = text
                        .unescape()
                        .map_err(|e| VerifyError::Malformed(e.to_string()))?;
                    set(&mut result, field, &value);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(field) = current {
                    set(&mut result, field, &String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(VerifyError::Malformed(e.to_string())),
        }
    }

    if !saw_result {
        return Err(VerifyError::Malformed("response has no ConsultaResult".to_string()));
    }
    Ok(result)
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VIGENTE: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><ConsultaResponse xmlns="http://tempuri.org/"><ConsultaResult xmlns:a="http://schemas.datacontract.org/2004/07/Sat.Cfdi.Negocio.ConsultaCfdi.Servicio" xmlns:i="http://www.w3.org/2001/XMLSchema-instance"><a:CodigoEstatus>S - Comprobante obtenido satisfactoriamente.</a:CodigoEstatus><a:EsCancelable>Cancelable con aceptación</a:EsCancelable><a:Estado>Vigente</a:Estado><a:EstatusCancelacion/><a:ValidacionEFOS>200</a:ValidacionEFOS></ConsultaResult></ConsultaResponse></s:Body></s:Envelope>"#;

    fn cfdi() -> CfdiRequest {
        CfdiRequest {
            uuid: "6128396f-c09b-4ec6-8699-43c5f7e3b230".to_string(),
            emisor_rfc: "CDZ050722LA9".to_string(),
            receptor_rfc: "XIN06112344A".to_string(),
            total: "12000.00".to_string(),
        }
    }

    #[test]
    fn parses_child_elements() {
        let result = parse_consulta_response(VIGENTE).unwrap();
        assert_eq!(result.estado.as_deref(), Some("Vigente"));
        assert_eq!(result.es_cancelable.as_deref(), Some("Cancelable con aceptación"));
        assert_eq!(
            result.codigo_estatus.as_deref(),
            Some("S - Comprobante obtenido satisfactoriamente.")
        );
        assert_eq!(result.validacion_efos.as_deref(), Some("200"));
        // Empty element means the SAT said nothing, not an empty status.
        assert_eq!(result.estatus_cancelacion, None);
        assert_eq!(result.raw_response, None);
    }

    #[test]
    fn parses_attribute_form() {
        let body = r#"<Envelope><Body><ConsultaResult Estado="Cancelado" EsCancelable="No cancelable" CodigoEstatus="S - Comprobante obtenido satisfactoriamente." EstatusCancelacion="Cancelado sin aceptaci&#243;n"/></Body></Envelope>"#;
        let result = parse_consulta_response(body).unwrap();
        assert_eq!(result.estado.as_deref(), Some("Cancelado"));
        assert_eq!(result.es_cancelable.as_deref(), Some("No cancelable"));
        assert_eq!(result.estatus_cancelacion.as_deref(), Some("Cancelado sin aceptación"));
        assert_eq!(result.validacion_efos, None);
    }

    #[test]
    fn missing_fields_stay_unknown() {
        let body = r#"<Envelope><Body><ConsultaResult><Estado>No Encontrado</Estado></ConsultaResult></Body></Envelope>"#;
        let result = parse_consulta_response(body).unwrap();
        assert_eq!(result.estado.as_deref(), Some("No Encontrado"));
        assert_eq!(result.es_cancelable, None);
        assert_eq!(result.codigo_estatus, None);
    }

    #[test]
    fn rejects_body_without_consulta_result() {
        let err = parse_consulta_response("<html><body>maintenance</body></html>").unwrap_err();
        assert!(matches!(err, VerifyError::Malformed(_)));
    }

    #[test]
    fn rejects_broken_xml() {
        let err = parse_consulta_response("<ConsultaResult><Estado>Vigente</Codigo></ConsultaResult>").unwrap_err();
        assert!(matches!(err, VerifyError::Malformed(_)));
    }

    #[test]
    fn envelope_escapes_expression() {
        let mut request = cfdi();
        request.emisor_rfc = "A&B050722LA9".to_string();
        let envelope = soap_envelope(&request);
        assert!(envelope.contains("?re=A&amp;B050722LA9&amp;rr=XIN06112344A&amp;tt=12000.00&amp;id=6128396f"));
        assert!(!envelope.contains("&rr="));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ñññ", 3), "ñ...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[tokio::test]
    async fn verify_posts_soap_and_keeps_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ConsultaCFDIService.svc"))
            .and(header("SOAPAction", SOAP_ACTION))
            .and(body_string_contains("id=6128396f-c09b-4ec6-8699-43c5f7e3b230"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VIGENTE))
            .expect(1)
            .mount(&server)
            .await;

        let client = SatClient::new(
            format!("{}/ConsultaCFDIService.svc", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client.verify(&cfdi()).await.unwrap();
        assert_eq!(result.estado.as_deref(), Some("Vigente"));
        assert_eq!(result.raw_response.as_deref(), Some(VIGENTE));
    }

    #[tokio::test]
    async fn verify_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let client = SatClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.verify(&cfdi()).await.unwrap_err();

        assert_eq!(
            err,
            VerifyError::Status {
                status: 503,
                body: "Service Unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn verify_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VIGENTE)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = SatClient::new(server.uri(), Duration::from_millis(100)).unwrap();
        assert_eq!(client.verify(&cfdi()).await.unwrap_err(), VerifyError::Timeout);
    }

    #[tokio::test]
    async fn verify_reports_unreachable_service() {
        // Nothing listens on port 9 (discard) in the test environment.
        let client = SatClient::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        let err = client.verify(&cfdi()).await.unwrap_err();
        assert!(matches!(err, VerifyError::Transport(_) | VerifyError::Timeout));
    }
}
