//! HTTP control plane: send, download, connect, auth status, disconnect and
//! revoke. Every route sits behind bearer-JWT auth with per-route scopes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use wabridge_session::{
    download_media, send_message, AuthStatus, RevokeOutcome, SessionController, SessionState,
};

use crate::auth::{require_bridge_auth, AuthConfig};
use crate::error::ApiError;

/// How long a connect request waits for the session to reach a
/// connect-ready state before reporting what it sees.
const CONNECT_READY_TIMEOUT: Duration = Duration::from_secs(6);

/// JSON request bodies are bounded at 1 MiB.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Per-request handler timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub auth: AuthConfig,
    pub store_dir: Arc<PathBuf>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/send", post(send_handler))
        .route("/api/download", post(download_handler))
        .route("/api/connect", post(connect_handler))
        .route("/api/auth/status", get(auth_status_handler))
        .route("/api/disconnect", post(disconnect_handler))
        .route("/api/disconnect/revoke", post(revoke_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        // route_layer keeps the guard off unmatched paths and methods, so
        // those return plain 404/405 instead of auth errors.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bridge_auth,
        ))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr, "starting bridge control plane");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ─── Request / response shapes ───

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SendMessageRequest {
    recipient: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    media_path: String,
}

#[derive(Serialize)]
struct SendMessageResponse {
    success: bool,
    message: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DownloadMediaRequest {
    message_id: String,
    chat_jid: String,
}

#[derive(Serialize)]
struct DownloadMediaResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    filename: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    path: String,
}

#[derive(Serialize)]
struct AuthStatusResponse {
    state: &'static str,
    connected: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    qr_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    qr_image_data_url: String,
    #[serde(skip_serializing_if = "is_zero_u8")]
    sync_progress: u8,
    #[serde(skip_serializing_if = "is_zero_usize")]
    sync_current: usize,
    #[serde(skip_serializing_if = "is_zero_usize")]
    sync_total: usize,
    updated_at: String,
}

#[derive(Serialize)]
struct ConnectResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    state: String,
    connected: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    qr_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    qr_image_data_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    updated_at: String,
}

#[derive(Serialize)]
struct DisconnectResponse {
    success: bool,
    message: String,
}

fn is_zero_u8(value: &u8) -> bool {
    *value == 0
}

fn is_zero_usize(value: &usize) -> bool {
    *value == 0
}

fn status_response(status: &AuthStatus) -> AuthStatusResponse {
    AuthStatusResponse {
        state: status.state.as_str(),
        connected: status.connected,
        message: status.message.clone(),
        qr_code: status.qr_code.clone(),
        qr_image_data_url: status.qr_image_data_url.clone(),
        sync_progress: status.sync_progress,
        sync_current: status.sync_current,
        sync_total: status.sync_total,
        updated_at: status.updated_at.to_rfc3339(),
    }
}

/// Parse a bounded JSON body, rejecting malformed payloads and unknown
/// fields alike.
fn decode_json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|_| ApiError::BadRequest("Invalid request format".into()))
}

// ─── Handlers ───

async fn send_handler(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let request = decode_json_body(payload)?;

    if request.recipient.is_empty() {
        return Err(ApiError::BadRequest("Recipient is required".into()));
    }
    if request.message.is_empty() && request.media_path.is_empty() {
        return Err(ApiError::BadRequest(
            "Message or media path is required".into(),
        ));
    }

    let client = state.controller.current().await.ok_or_else(|| {
        ApiError::NotConnected("WhatsApp client is not initialized. Start connect first.".into())
    })?;

    let media_path = (!request.media_path.is_empty()).then(|| Path::new(&request.media_path));
    let message = send_message(
        client.as_ref(),
        &request.recipient,
        &request.message,
        media_path,
    )
    .await?;

    Ok(Json(SendMessageResponse {
        success: true,
        message,
    }))
}

async fn download_handler(
    State(state): State<AppState>,
    payload: Result<Json<DownloadMediaRequest>, JsonRejection>,
) -> Result<Json<DownloadMediaResponse>, ApiError> {
    let request = decode_json_body(payload)?;

    if request.message_id.is_empty() || request.chat_jid.is_empty() {
        return Err(ApiError::BadRequest(
            "Message ID and Chat JID are required".into(),
        ));
    }

    let client = state.controller.current().await.ok_or_else(|| {
        ApiError::NotConnected("WhatsApp client is not initialized. Start connect first.".into())
    })?;

    let outcome = download_media(
        client.as_ref(),
        state.controller.store(),
        &state.store_dir,
        &request.message_id,
        &request.chat_jid,
    )
    .await
    .map_err(|e| ApiError::Upstream(format!("Failed to download media: {e}")))?;

    Ok(Json(DownloadMediaResponse {
        success: true,
        message: format!("Successfully downloaded {} media", outcome.kind),
        filename: outcome.filename,
        path: outcome.path.display().to_string(),
    }))
}

async fn connect_handler(
    State(state): State<AppState>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let client = state
        .controller
        .ensure()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let has_linked_device = client.device_id().is_some();
    if client.is_connected() {
        if has_linked_device {
            let status = state.controller.status().get();
            return Ok(Json(ConnectResponse {
                success: true,
                message: "WhatsApp already connected".into(),
                state: status.state.as_str().into(),
                connected: true,
                qr_code: status.qr_code,
                qr_image_data_url: status.qr_image_data_url,
                updated_at: status.updated_at.to_rfc3339(),
            }));
        }
        client.disconnect().await;
    }

    state
        .controller
        .connect_client(&client)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let mut status = state
        .controller
        .wait_for_connect_ready(CONNECT_READY_TIMEOUT)
        .await;
    if client.is_connected()
        && status.state != SessionState::LoggingIn
        && status.state != SessionState::Syncing
    {
        status.state = SessionState::Connected;
        status.connected = true;
    }

    Ok(Json(ConnectResponse {
        success: true,
        message: "WhatsApp connect requested".into(),
        state: status.state.as_str().into(),
        connected: status.connected,
        qr_code: status.qr_code,
        qr_image_data_url: status.qr_image_data_url,
        updated_at: status.updated_at.to_rfc3339(),
    }))
}

async fn auth_status_handler(State(state): State<AppState>) -> Json<AuthStatusResponse> {
    let client = state.controller.current().await;
    let mut status = state.controller.status().get();

    // A live, linked handle in an otherwise idle state reads as connected.
    if let Some(client) = &client {
        if client.device_id().is_some()
            && client.is_connected()
            && matches!(
                status.state,
                SessionState::Connected | SessionState::Disconnected
            )
        {
            status.state = SessionState::Connected;
            status.connected = true;
            if status.message.is_empty() {
                status.message = "WhatsApp connected".into();
            }
        }
    }

    Json(status_response(&status))
}

async fn disconnect_handler(
    State(state): State<AppState>,
) -> Json<DisconnectResponse> {
    let message = state.controller.disconnect().await;
    Json(DisconnectResponse {
        success: true,
        message,
    })
}

async fn revoke_handler(
    State(state): State<AppState>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    match state.controller.revoke().await {
        RevokeOutcome::Revoked { message } => Ok(Json(DisconnectResponse {
            success: true,
            message,
        })),
        RevokeOutcome::RemoteFailed { message } => Err(ApiError::PartialRevoke(message)),
        RevokeOutcome::Failed { message } => Err(ApiError::Upstream(message)),
    }
}
