//! In-process control-plane tests: JWT auth and scope enforcement, request
//! validation, and the full route behaviors against a stub gateway.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use tower::ServiceExt;

use wabridge_session::{SessionController, SessionState};
use wabridge_shared::gateway::{Gateway, GatewayFactory};
use wabridge_shared::testing::{StubFactory, StubGateway};
use wabridge_shared::{Jid, DEFAULT_USER_SERVER};
use wabridge_store::{MediaColumns, MessageRecord, MessageStore};

use crate::api::{build_router, AppState};
use crate::auth::AuthConfig;

const SECRET: &str = "test-secret-value";
const AUDIENCE: &str = "whatsapp-bridge";
const ISSUER: &str = "omicron-api";

struct Harness {
    router: Router,
    gateway: Arc<StubGateway>,
    controller: Arc<SessionController>,
    _dir: tempfile::TempDir,
}

fn harness_with(gateway: Arc<StubGateway>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MessageStore::open(dir.path()).unwrap());
    let factory = StubFactory::new(gateway.clone());
    let controller = SessionController::new(store, factory as Arc<dyn GatewayFactory>);

    let state = AppState {
        controller: controller.clone(),
        auth: AuthConfig::new(SECRET, AUDIENCE, ISSUER),
        store_dir: Arc::new(dir.path().to_path_buf()),
    };

    Harness {
        router: build_router(state),
        gateway,
        controller,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(StubGateway::new())
}

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    aud: String,
    iss: String,
    iat: i64,
    exp: i64,
    scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime_id: Option<String>,
}

impl TestClaims {
    fn new(scope: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: "agent-1".into(),
            aud: AUDIENCE.into(),
            iss: ISSUER.into(),
            iat: now,
            exp: now + 3600,
            scope: scope.into(),
            runtime_id: Some("runtime-1".into()),
        }
    }
}

fn sign(claims: &TestClaims, algorithm: Algorithm) -> String {
    encode(
        &Header::new(algorithm),
        claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn token(scope: &str) -> String {
    sign(&TestClaims::new(scope), Algorithm::HS256)
}

async fn call(
    router: &Router,
    method: Method,
    path: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {bearer}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn device() -> Jid {
    Jid::new("5550009999", DEFAULT_USER_SERVER)
}

// ─── Authentication and scopes ───

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let h = harness();
    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/send",
        None,
        Some(serde_json::json!({"recipient": "5551234567", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let h = harness();
    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some("not-a-jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_hs256_algorithm_is_rejected() {
    let h = harness();
    let bearer = sign(&TestClaims::new("whatsapp:status"), Algorithm::HS384);
    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_audience_is_unauthorized() {
    let h = harness();
    let mut claims = TestClaims::new("whatsapp:status");
    claims.aud = "someone-else".into();
    let bearer = sign(&claims, Algorithm::HS256);
    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let h = harness();
    let mut claims = TestClaims::new("whatsapp:status");
    claims.exp = Utc::now().timestamp() - 600;
    let bearer = sign(&claims, Algorithm::HS256);
    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_runtime_id_is_unauthorized() {
    let h = harness();
    let mut claims = TestClaims::new("whatsapp:status");
    claims.runtime_id = None;
    let bearer = sign(&claims, Algorithm::HS256);
    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_subject_is_unauthorized() {
    let h = harness();
    let mut claims = TestClaims::new("whatsapp:status");
    claims.sub = "  ".into();
    let bearer = sign(&claims, Algorithm::HS256);
    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_scope_cannot_send() {
    let h = harness();
    let bearer = token("whatsapp:status");

    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&bearer),
        Some(serde_json::json!({"recipient": "5551234567", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The same token is fine for the route it is scoped to.
    let (status, body) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "disconnected");
}

#[tokio::test]
async fn wildcard_scope_reaches_every_route() {
    let h = harness();
    let bearer = token("whatsapp:*");

    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Auth passes; the 503 comes from the missing handle, not the token.
    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&bearer),
        Some(serde_json::json!({"recipient": "5551234567", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let h = harness();
    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/unknown",
        Some(&token("whatsapp:*")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Unmatched paths resolve before the auth guard; no token needed.
    let (status, _) = call(&h.router, Method::POST, "/api/unknown", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_method_on_known_path_is_method_not_allowed() {
    let h = harness();
    let (status, _) = call(
        &h.router,
        Method::GET,
        "/api/send",
        Some(&token("whatsapp:*")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    // Method mismatches also resolve before the auth guard.
    let (status, _) = call(&h.router, Method::GET, "/api/send", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

// ─── Send ───

#[tokio::test]
async fn send_requires_recipient() {
    let h = harness();
    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&token("whatsapp:send")),
        Some(serde_json::json!({"recipient": "", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn send_requires_message_or_media() {
    let h = harness();
    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&token("whatsapp:send")),
        Some(serde_json::json!({"recipient": "5551234567"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_rejects_unknown_fields() {
    let h = harness();
    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&token("whatsapp:send")),
        Some(serde_json::json!({"recipient": "5551234567", "message": "hi", "surprise": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_rejects_malformed_json() {
    let h = harness();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/send")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("whatsapp:send")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_without_handle_is_service_unavailable() {
    let h = harness();
    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&token("whatsapp:send")),
        Some(serde_json::json!({"recipient": "5551234567", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn send_with_disconnected_handle_is_service_unavailable() {
    let h = harness();
    h.controller.ensure().await.unwrap();

    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&token("whatsapp:send")),
        Some(serde_json::json!({"recipient": "5551234567", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn send_delivers_through_the_gateway() {
    let h = harness();
    h.controller.ensure().await.unwrap();
    h.gateway.set_connected(true);

    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&token("whatsapp:send")),
        Some(serde_json::json!({"recipient": "5551234567", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Message sent to 5551234567");
    assert_eq!(h.gateway.sent_count(), 1);
}

// ─── Download ───

#[tokio::test]
async fn download_requires_both_ids() {
    let h = harness();
    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/download",
        Some(&token("whatsapp:download")),
        Some(serde_json::json!({"message_id": "", "chat_jid": "5551234567"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_of_unknown_message_fails() {
    let h = harness();
    h.controller.ensure().await.unwrap();

    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/download",
        Some(&token("whatsapp:download")),
        Some(serde_json::json!({"message_id": "nope", "chat_jid": "5551234567"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("failed to find message"));
}

#[tokio::test]
async fn download_persists_media_and_returns_path() {
    let h = harness();
    h.controller.ensure().await.unwrap();

    let store = h.controller.store();
    store.upsert_chat("5551234567", "Ada", None).unwrap();
    store
        .upsert_message(&MessageRecord {
            id: "m1".into(),
            chat_jid: "5551234567".into(),
            sender_id: "5551234567".into(),
            content: String::new(),
            timestamp: Utc::now(),
            is_from_me: false,
            media: Some(MediaColumns {
                kind: Some(wabridge_shared::MediaKind::Image),
                filename: "image_20240310_120000.jpg".into(),
                url: "https://mmg.whatsapp.net/v/t62.7117-24/blob123?ccb=11".into(),
                media_key: vec![1; 32],
                file_sha256: vec![2; 32],
                file_enc_sha256: vec![3; 32],
                file_length: 9,
            }),
        })
        .unwrap();
    h.gateway
        .insert_blob("/v/t62.7117-24/blob123", b"jpeg-data".to_vec());

    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/download",
        Some(&token("whatsapp:download")),
        Some(serde_json::json!({"message_id": "m1", "chat_jid": "5551234567"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "image_20240310_120000.jpg");

    let path = body["path"].as_str().unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"jpeg-data");
}

// ─── Status / connect / disconnect / revoke ───

#[tokio::test]
async fn auth_status_reports_rfc3339_timestamp() {
    let h = harness();
    let (status, body) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&token("whatsapp:status")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "disconnected");
    assert_eq!(body["connected"], false);

    let updated_at = body["updated_at"].as_str().unwrap();
    chrono::DateTime::parse_from_rfc3339(updated_at).expect("valid RFC 3339 timestamp");
}

#[tokio::test]
async fn auth_status_upgrades_idle_state_for_live_handle() {
    let h = harness_with(StubGateway::linked(device()));
    h.controller.ensure().await.unwrap();
    h.gateway.set_connected(true);
    h.controller.status().set_disconnected("");

    let (_, body) = call(
        &h.router,
        Method::GET,
        "/api/auth/status",
        Some(&token("whatsapp:status")),
        None,
    )
    .await;
    assert_eq!(body["state"], "connected");
    assert_eq!(body["connected"], true);
    assert_eq!(body["message"], "WhatsApp connected");
}

#[tokio::test(start_paused = true)]
async fn connect_with_linked_device_reports_connected() {
    let h = harness_with(StubGateway::linked(device()));

    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/connect",
        Some(&token("whatsapp:connect")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["state"], "connected");
    assert_eq!(body["connected"], true);
}

#[tokio::test]
async fn disconnect_without_handle_still_succeeds() {
    let h = harness();
    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/disconnect",
        Some(&token("whatsapp:disconnect")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "WhatsApp client is not initialized");
}

#[tokio::test]
async fn disconnect_detaches_the_handle() {
    let h = harness_with(StubGateway::linked(device()));
    h.controller.ensure().await.unwrap();
    h.gateway.set_connected(true);

    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/disconnect",
        Some(&token("whatsapp:disconnect")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "WhatsApp disconnected");
    assert!(h.controller.current().await.is_none());
    assert!(!h.gateway.is_connected());
}

#[tokio::test]
async fn revoke_succeeds_and_clears_cache() {
    let h = harness_with(StubGateway::linked(device()));
    h.controller.ensure().await.unwrap();
    h.controller
        .store()
        .upsert_chat("5551234567", "Ada", None)
        .unwrap();

    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/disconnect/revoke",
        Some(&token("whatsapp:disconnect")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(h.controller.store().get_chats().unwrap().is_empty());
}

#[tokio::test]
async fn revoke_with_remote_failure_is_bad_gateway() {
    let gateway = StubGateway::linked(device());
    gateway.fail_logout.store(true, Ordering::SeqCst);
    let h = harness_with(gateway);
    h.controller.ensure().await.unwrap();
    h.controller
        .store()
        .upsert_chat("5551234567", "Ada", None)
        .unwrap();

    let (status, body) = call(
        &h.router,
        Method::POST,
        "/api/disconnect/revoke",
        Some(&token("whatsapp:disconnect")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Local credentials were cleared"));

    // Local wipe still completed in full.
    assert!(h.controller.store().get_chats().unwrap().is_empty());
    assert!(h.gateway.device_cleared.load(Ordering::SeqCst));
    assert_eq!(
        h.controller.status().get().state,
        SessionState::LoggedOut
    );
}

#[tokio::test]
async fn oversize_body_is_rejected() {
    let h = harness();
    let big = "x".repeat(2 * 1024 * 1024);
    let (status, _) = call(
        &h.router,
        Method::POST,
        "/api/send",
        Some(&token("whatsapp:send")),
        Some(serde_json::json!({"recipient": "5551234567", "message": big})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
