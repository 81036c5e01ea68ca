//! End-to-end tests of the HTTP surface, driven in-process with `oneshot`
//! against the in-memory store and a stub SAT verifier.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use cfdi_verification_service::{
    AppState, app,
    config::Config,
    models::cfdi::{CfdiRequest, CfdiResponse},
    services::{
        password::PasswordHasher,
        verifier::{DocumentVerifier, VerifyError},
    },
    store::{CredentialStore, MemoryStore},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tower::ServiceExt;

const ADMIN: &str = "root";
const ADMIN_PASSWORD: &str = "root-password";
const UUID: &str = "6128396f-c09b-4ec6-8699-43c5f7e3b230";

/// Stub SAT: total "0.00" fails, total "999.00" hangs, anything else is Vigente.
#[derive(Default)]
struct StubSat {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentVerifier for StubSat {
    async fn verify(&self, cfdi: &CfdiRequest) -> Result<CfdiResponse, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match cfdi.total.as_str() {
            "0.00" => Err(VerifyError::Transport("connection refused".to_string())),
            "999.00" => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(VerifyError::Timeout)
            }
            _ => Ok(CfdiResponse {
                estado: Some("Vigente".to_string()),
                es_cancelable: Some("Cancelable con aceptación".to_string()),
                codigo_estatus: Some("S - Comprobante obtenido satisfactoriamente.".to_string()),
                raw_response: Some("<ConsultaResult/>".to_string()),
                ..CfdiResponse::default()
            }),
        }
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    sat: Arc<StubSat>,
}

async fn setup() -> TestApp {
    let config: Config = envy::from_iter(vec![
        ("DATABASE_URL".to_string(), "memory://".to_string()),
        ("BATCH_CONCURRENCY".to_string(), "3".to_string()),
        ("BATCH_TIMEOUT_SECS".to_string(), "1".to_string()),
    ])
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let sat = Arc::new(StubSat::default());
    let hasher = PasswordHasher::new(64, 1, 1).unwrap();

    let hash = hasher.hash(ADMIN_PASSWORD).await.unwrap();
    store.create_superadmin(ADMIN, &hash).await.unwrap();

    let state = AppState::new(store.clone(), store.clone(), sat.clone(), hasher, config);
    TestApp {
        router: app(state),
        store,
        sat,
    }
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn root_auth() -> String {
    basic(ADMIN, ADMIN_PASSWORD)
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn request(method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn create_token(&self, description: &str) -> (i64, String) {
        let (status, body) = self
            .send(request(
                "POST",
                "/admin/tokens",
                Some(&root_auth()),
                Some(json!({ "description": description })),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (
            body["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn verify(&self, token: &str, cfdi: Value) -> (StatusCode, Value) {
        self.send(request("POST", "/verify-cfdi", Some(&bearer(token)), Some(cfdi)))
            .await
    }
}

fn cfdi(total: &str) -> Value {
    json!({
        "uuid": UUID,
        "emisor_rfc": "CDZ050722LA9",
        "receptor_rfc": "XIN06112344A",
        "total": total
    })
}

fn cfdi_with_uuid(uuid: &str, total: &str) -> Value {
    let mut value = cfdi(total);
    value["uuid"] = json!(uuid);
    value
}

#[tokio::test]
async fn root_and_health_are_public() {
    let app = setup().await;

    let (status, body) = app.send(request("GET", "/", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");

    let (status, body) = app.send(request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn verify_requires_a_known_bearer_token() {
    let app = setup().await;

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/verify-cfdi", None, Some(cfdi("12000.00"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let (status, _) = app.verify("not-a-token", cfdi("12000.00")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.sat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verify_returns_every_field() {
    let app = setup().await;
    let (_, token) = app.create_token("erp").await;

    let (status, body) = app.verify(&token, cfdi("12000.00")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["estado"], "Vigente");
    let object = body.as_object().unwrap();
    for field in [
        "estado",
        "es_cancelable",
        "estatus_cancelacion",
        "codigo_estatus",
        "validacion_efos",
        "raw_response",
    ] {
        assert!(object.contains_key(field), "missing {field}");
    }
    assert!(body["validacion_efos"].is_null());
}

#[tokio::test]
async fn verify_reports_validation_errors() {
    let app = setup().await;
    let (_, token) = app.create_token("erp").await;

    let (status, body) = app
        .verify(
            &token,
            json!({ "uuid": "nope", "emisor_rfc": "CDZ050722LA9", "receptor_rfc": "XIN06112344A", "total": 12000 }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let detail = body["detail"].as_array().unwrap();
    assert_eq!(detail.len(), 2);
    let total = detail.iter().find(|d| d["loc"] == json!(["body", "total"])).unwrap();
    assert_eq!(total["type"], "string_type");
    let uuid = detail.iter().find(|d| d["loc"] == json!(["body", "uuid"])).unwrap();
    assert_eq!(uuid["type"], "uuid_parsing");
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let app = setup().await;
    let (_, token) = app.create_token("erp").await;

    let (status, body) = app.verify(&token, cfdi("0.00")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn inactive_token_is_unauthenticated_not_invalid() {
    let app = setup().await;
    let (id, token) = app.create_token("erp").await;

    let (status, _) = app.verify(&token, cfdi("12000.00")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(request(
            "PUT",
            &format!("/admin/tokens/{id}"),
            Some(&root_auth()),
            Some(json!({ "is_active": false })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);
    assert_eq!(body["description"], "erp");

    // Even with a body that would not validate, auth is checked first.
    let (status, _) = app.verify(&token, json!({ "uuid": 1 })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.verify(&token, cfdi("12000.00")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    let app = setup().await;
    let (_, token) = app.create_token("erp").await;

    let (status, body) = app
        .send(request(
            "POST",
            "/verify-cfdi-batch",
            Some(&bearer(&token)),
            Some(json!({ "cfdis": [cfdi("1.00"), cfdi("0.00"), cfdi("3.00"), cfdi("4.00")] })),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);

    let totals: Vec<_> = results.iter().map(|r| r["request"]["total"].as_str().unwrap()).collect();
    assert_eq!(totals, vec!["1.00", "0.00", "3.00", "4.00"]);

    let failed: Vec<_> = results.iter().filter(|r| !r["error"].is_null()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["request"]["total"], "0.00");
    assert!(failed[0]["response"]["estado"].is_null());
    assert_eq!(results[2]["response"]["estado"], "Vigente");
}

#[tokio::test]
async fn empty_batch_is_rejected_before_any_call() {
    let app = setup().await;
    let (_, token) = app.create_token("erp").await;

    let (status, body) = app
        .send(request(
            "POST",
            "/verify-cfdi-batch",
            Some(&bearer(&token)),
            Some(json!({ "cfdis": [] })),
        ))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["type"], "too_short");
    assert_eq!(app.sat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_batch_times_out_without_partial_results() {
    let app = setup().await;
    let (_, token) = app.create_token("erp").await;

    let (status, body) = app
        .send(request(
            "POST",
            "/verify-cfdi-batch",
            Some(&bearer(&token)),
            Some(json!({ "cfdis": [cfdi("1.00"), cfdi("999.00")] })),
        ))
        .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body.get("results").is_none());
}

#[tokio::test]
async fn admin_routes_require_valid_superadmin() {
    let app = setup().await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/admin/tokens", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Basic");

    for auth in [basic(ADMIN, "wrong"), basic("ghost", ADMIN_PASSWORD)] {
        let (status, _) = app.send(request("GET", "/admin/tokens", Some(&auth), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // A bearer token is not an admin credential.
    let (_, token) = app.create_token("erp").await;
    let (status, _) = app
        .send(request("GET", "/admin/tokens", Some(&bearer(&token)), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_lifecycle() {
    let app = setup().await;
    let auth = root_auth();
    let (id, token) = app.create_token("erp").await;
    app.create_token("billing").await;
    app.create_token("audit").await;

    let (status, body) = app
        .send(request("GET", &format!("/admin/tokens/{id}"), Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"], token.as_str());

    let (status, body) = app
        .send(request("GET", "/admin/tokens?skip=0&limit=2", Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokens"].as_array().unwrap().len(), 2);
    assert_eq!(body["total"], 3);

    let (status, body) = app
        .send(request(
            "POST",
            &format!("/admin/tokens/{id}/regenerate"),
            Some(&auth),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["description"], "erp");
    let fresh = body["token"].as_str().unwrap().to_string();
    assert_ne!(fresh, token);

    let (status, _) = app.verify(&token, cfdi("1.00")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.verify(&fresh, cfdi("1.00")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(request("DELETE", &format!("/admin/tokens/{id}"), Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], format!("Token {id} successfully deleted"));

    let (status, _) = app.verify(&fresh, cfdi("1.00")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = app
        .send(request("GET", &format!("/admin/tokens/{id}"), Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Token not found");
}

#[tokio::test]
async fn bad_path_and_query_parameters_are_validation_errors() {
    let app = setup().await;
    let auth = root_auth();

    let (status, body) = app
        .send(request("GET", "/admin/tokens/abc", Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["path", "token_id"]));

    let (status, body) = app
        .send(request("GET", "/admin/tokens?limit=0&skip=-1", Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"].as_array().unwrap().len(), 2);

    // %FF does not decode to UTF-8.
    let (status, body) = app
        .send(request("DELETE", "/admin/superadmins/%FF", Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["path", "username"]));
    assert_eq!(body["detail"][0]["type"], "string_unicode");

    let (status, body) = app
        .send(request(
            "PUT",
            "/admin/superadmins/%FF/password",
            Some(&auth),
            Some(json!({ "current_password": "a", "new_password": "b" })),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["path", "username"]));

    let (_, token) = app.create_token("paths").await;
    let (status, body) = app
        .send(request("GET", "/cfdi-history/%FF", Some(&bearer(&token)), None))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["path", "uuid"]));
}

#[tokio::test]
async fn superadmin_creation_and_conflict() {
    let app = setup().await;
    let auth = root_auth();

    let (status, body) = app
        .send(request(
            "POST",
            "/admin/superadmins",
            Some(&auth),
            Some(json!({ "username": "ops", "password": "ops-password" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ops");
    assert_eq!(body["is_active"], true);
    assert!(body.get("password").is_none());
    assert!(body.get("hashed_password").is_none());

    let (status, _) = app
        .send(request("GET", "/admin/tokens", Some(&basic("ops", "ops-password")), None))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(request(
            "POST",
            "/admin/superadmins",
            Some(&auth),
            Some(json!({ "username": "ops", "password": "other" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn password_change_requires_current_password() {
    let app = setup().await;
    let auth = root_auth();
    let before = app.store.get_superadmin(ADMIN).await.unwrap().unwrap().hashed_password;

    let (status, body) = app
        .send(request(
            "PUT",
            &format!("/admin/superadmins/{ADMIN}/password"),
            Some(&auth),
            Some(json!({ "current_password": "guess", "new_password": "new-password" })),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Incorrect current password");
    let after = app.store.get_superadmin(ADMIN).await.unwrap().unwrap().hashed_password;
    assert_eq!(before, after);

    let (status, body) = app
        .send(request(
            "PUT",
            &format!("/admin/superadmins/{ADMIN}/password"),
            Some(&auth),
            Some(json!({ "current_password": ADMIN_PASSWORD, "new_password": "new-password" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password updated successfully");

    let (status, _) = app.send(request("GET", "/admin/tokens", Some(&auth), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .send(request("GET", "/admin/tokens", Some(&basic(ADMIN, "new-password")), None))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(request(
            "PUT",
            "/admin/superadmins/ghost/password",
            Some(&basic(ADMIN, "new-password")),
            Some(json!({ "current_password": "a", "new_password": "b" })),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn superadmin_deactivation() {
    let app = setup().await;
    let auth = root_auth();
    let ops = basic("ops", "ops-password");

    app.send(request(
        "POST",
        "/admin/superadmins",
        Some(&auth),
        Some(json!({ "username": "ops", "password": "ops-password" })),
    ))
    .await;

    let (status, body) = app
        .send(request("DELETE", &format!("/admin/superadmins/{ADMIN}"), Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Cannot deactivate your own account");

    let (status, _) = app
        .send(request("DELETE", "/admin/superadmins/ghost", Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(request("GET", "/admin/tokens", Some(&ops), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(request("DELETE", "/admin/superadmins/ops", Some(&auth), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Superadmin 'ops' deactivated successfully");

    // Correct password, inactive account.
    let (status, _) = app.send(request("GET", "/admin/tokens", Some(&ops), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_is_recorded_per_token() {
    let app = setup().await;
    let (_, token) = app.create_token("erp").await;
    let (_, other) = app.create_token("billing").await;
    let second_uuid = "0b6a1f2e-8d1c-4a57-9f3e-2a1c5b7d9e00";

    app.verify(&token, cfdi("12000.00")).await;
    app.verify(&token, cfdi("0.00")).await;
    app.send(request(
        "POST",
        "/verify-cfdi-batch",
        Some(&bearer(&token)),
        Some(json!({ "cfdis": [cfdi_with_uuid(second_uuid, "5.00"), cfdi("0.00")] })),
    ))
    .await;

    let (status, body) = app
        .send(request("GET", "/cfdi-history", Some(&bearer(&token)), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    // Newest first.
    assert_eq!(body["items"][0]["uuid"], second_uuid);
    assert!(body["items"][0].get("raw_response").is_none());

    let (status, body) = app
        .send(request(
            "GET",
            &format!("/cfdi-history/{UUID}"),
            Some(&bearer(&token)),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["estado"], "Vigente");

    let (_, body) = app
        .send(request("GET", "/cfdi-history", Some(&bearer(&other)), None))
        .await;
    assert_eq!(body["total"], 0);
}
