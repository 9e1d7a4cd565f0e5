//! Session controller.
//!
//! Owns the single mutable slot holding the upstream client handle and
//! drives the session state machine: pairing, reconnection, disconnect and
//! revoke. HTTP handlers read the handle through [`SessionController::current`];
//! only ensure/detach swap it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use wabridge_shared::gateway::{Gateway, GatewayFactory, QrEvent};
use wabridge_store::MessageStore;

use crate::error::{Result, SessionError};
use crate::pipeline::spawn_event_pipeline;
use crate::status::{AuthStatus, SessionState, StatusHandle};

/// Deadline for the remote logout RPC during revoke.
const LOGOUT_DEADLINE: Duration = Duration::from_secs(20);

/// Detached deadline for local credential cleanup after a failed remote
/// logout.
const CLEANUP_DEADLINE: Duration = Duration::from_secs(10);

/// How long connect waits for the link to stabilize before reporting.
const STABLE_CONNECT_WAIT: Duration = Duration::from_secs(2);

/// Poll cadence while waiting for a connect-ready status.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Startup auto-connect readiness deadline.
const STARTUP_READY_TIMEOUT: Duration = Duration::from_secs(8);

/// Result of a revoke attempt, mapped onto HTTP statuses by the caller.
#[derive(Debug, Clone)]
pub enum RevokeOutcome {
    /// Remote device revoked and local state cleared.
    Revoked { message: String },
    /// Remote logout failed but local credentials and cache were wiped.
    RemoteFailed { message: String },
    /// Local cleanup itself failed.
    Failed { message: String },
}

pub struct SessionController {
    client: RwLock<Option<Arc<dyn Gateway>>>,
    store: Arc<MessageStore>,
    status: StatusHandle,
    factory: Arc<dyn GatewayFactory>,
}

impl SessionController {
    pub fn new(store: Arc<MessageStore>, factory: Arc<dyn GatewayFactory>) -> Arc<Self> {
        Arc::new(Self {
            client: RwLock::new(None),
            store,
            status: StatusHandle::new(),
            factory,
        })
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    /// The current handle, if one exists.
    pub async fn current(&self) -> Option<Arc<dyn Gateway>> {
        self.client.read().await.clone()
    }

    /// Remove and return the current handle.
    pub async fn detach(&self) -> Option<Arc<dyn Gateway>> {
        self.client.write().await.take()
    }

    /// Build a fresh handle and wire its event stream into the pipeline.
    async fn new_client(&self) -> Result<Arc<dyn Gateway>> {
        self.status.set_connecting("Initializing WhatsApp client");

        let (gateway, events) = self.factory.create().await.map_err(|e| {
            self.status
                .set_error("Failed to initialize WhatsApp client");
            SessionError::Gateway(e)
        })?;

        spawn_event_pipeline(
            gateway.clone(),
            self.store.clone(),
            self.status.clone(),
            events,
        );
        Ok(gateway)
    }

    /// Return the shared handle, creating it if none exists yet.
    pub async fn ensure(&self) -> Result<Arc<dyn Gateway>> {
        if let Some(existing) = self.client.read().await.clone() {
            return Ok(existing);
        }

        // Build outside the write lock; creation can block on the device
        // store.
        let candidate = self.new_client().await?;

        let mut slot = self.client.write().await;
        if let Some(existing) = slot.clone() {
            // Another request initialized while we built this one.
            if candidate.is_connected() {
                candidate.disconnect().await;
            }
            return Ok(existing);
        }
        *slot = Some(candidate.clone());
        Ok(candidate)
    }

    /// Establish the upstream link, entering the QR flow when no device is
    /// linked yet.
    pub async fn connect_client(&self, gateway: &Arc<dyn Gateway>) -> Result<()> {
        self.status.set_connecting("Connecting to WhatsApp");

        if gateway.device_id().is_none() {
            // After logout/revoke the device store keeps bindings for the
            // previous identity; reset so the next pair re-binds cleanly.
            gateway.mark_uninitialized();

            let qr_events = gateway.qr_channel().await.map_err(|e| {
                self.status.set_error("Failed to initialize WhatsApp QR flow");
                SessionError::Gateway(e)
            })?;
            gateway.connect().await.map_err(|e| {
                self.status.set_error("Failed to connect to WhatsApp");
                SessionError::Gateway(e)
            })?;

            self.status
                .set_awaiting_qr("", "Waiting for WhatsApp QR code");
            let status = self.status.clone();
            tokio::spawn(async move {
                watch_qr_channel(status, qr_events).await;
            });
            return Ok(());
        }

        gateway.connect().await.map_err(|e| {
            self.status.set_error("Failed to connect to WhatsApp");
            SessionError::Gateway(e)
        })?;

        tokio::time::sleep(STABLE_CONNECT_WAIT).await;
        if !gateway.is_connected() {
            self.status
                .set_error("Failed to establish stable WhatsApp connection");
            return Err(SessionError::NotConnected);
        }

        self.status.set_connected("WhatsApp connected");
        Ok(())
    }

    /// Startup behavior: reconnect a linked device, otherwise wait for an
    /// explicit connect request to begin pairing.
    pub async fn auto_connect_on_startup(&self) {
        let gateway = match self.ensure().await {
            Ok(gateway) => gateway,
            Err(e) => {
                self.status
                    .set_disconnected("WhatsApp startup initialization failed");
                error!(error = %e, "startup client init failed");
                return;
            }
        };

        if gateway.device_id().is_none() {
            self.status
                .set_disconnected("WhatsApp ready. Call /api/connect for first-time login.");
            info!("no linked WhatsApp device found, waiting for explicit connect");
            return;
        }

        if gateway.is_connected() {
            self.status.set_connected("WhatsApp connected");
            return;
        }

        info!("linked WhatsApp device found, auto-reconnecting on startup");
        if let Err(e) = self.connect_client(&gateway).await {
            error!(error = %e, "auto-reconnect failed");
            return;
        }

        let status = self.wait_for_connect_ready(STARTUP_READY_TIMEOUT).await;
        if gateway.is_connected()
            && status.state != SessionState::LoggingIn
            && status.state != SessionState::Syncing
        {
            self.status.set_connected("WhatsApp connected");
        }
    }

    /// Poll the published status until it reaches a connect-ready state or
    /// the deadline passes, returning the last observation.
    pub async fn wait_for_connect_ready(&self, timeout: Duration) -> AuthStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.status.get();
            if connect_ready(&status) || tokio::time::Instant::now() >= deadline {
                return status;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Detach and close the current handle.
    pub async fn disconnect(&self) -> String {
        let Some(gateway) = self.detach().await else {
            return "WhatsApp client is not initialized".to_string();
        };

        if gateway.is_connected() {
            gateway.disconnect().await;
        }
        self.status.set_disconnected("WhatsApp disconnected");
        "WhatsApp disconnected".to_string()
    }

    /// Revoke the linked device: remote logout, local credential wipe and a
    /// full cache reset. A remote failure still completes the local wipe.
    pub async fn revoke(&self) -> RevokeOutcome {
        let gateway = match self.detach().await {
            Some(gateway) => gateway,
            None => match self.new_client().await {
                Ok(gateway) => gateway,
                Err(e) => {
                    return RevokeOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            },
        };

        if gateway.device_id().is_some() {
            if let Err(remote_err) = gateway.logout(LOGOUT_DEADLINE).await {
                gateway.disconnect().await;

                if let Err(cleanup_err) = gateway.clear_device(CLEANUP_DEADLINE).await {
                    return RevokeOutcome::Failed {
                        message: format!(
                            "Failed to revoke WhatsApp device ({remote_err}) and local cleanup also failed ({cleanup_err})"
                        ),
                    };
                }
                if let Err(cache_err) = self.store.reset() {
                    return RevokeOutcome::Failed {
                        message: format!(
                            "Failed to revoke WhatsApp device ({remote_err}); local credentials were cleared but message cleanup failed ({cache_err})"
                        ),
                    };
                }

                self.status.set_logged_out(
                    "WhatsApp local credentials cleared. Re-authentication is required.",
                );
                return RevokeOutcome::RemoteFailed {
                    message: format!(
                        "Failed to revoke WhatsApp device remotely ({remote_err}). Local credentials were cleared."
                    ),
                };
            }
        } else {
            gateway.disconnect().await;
        }

        if let Err(e) = self.store.reset() {
            return RevokeOutcome::Failed {
                message: format!("Failed to clear local WhatsApp data: {e}"),
            };
        }

        self.status
            .set_logged_out("WhatsApp revoked and local credentials cleared");
        RevokeOutcome::Revoked {
            message: "WhatsApp device revoked and local credentials cleared".to_string(),
        }
    }
}

/// Whether a status is terminal for a connect request.
pub fn connect_ready(status: &AuthStatus) -> bool {
    match status.state {
        SessionState::Connected
        | SessionState::LoggingIn
        | SessionState::Syncing
        | SessionState::Error
        | SessionState::LoggedOut => true,
        SessionState::AwaitingQr => {
            !status.qr_code.is_empty() || !status.qr_image_data_url.is_empty()
        }
        _ => false,
    }
}

/// Republish each pairing code and track the channel to its terminal event.
async fn watch_qr_channel(
    status: StatusHandle,
    mut qr_events: tokio::sync::mpsc::UnboundedReceiver<QrEvent>,
) {
    while let Some(event) = qr_events.recv().await {
        match event {
            QrEvent::Code(code) => {
                status.set_awaiting_qr(&code, "Scan this QR code with WhatsApp");
                info!("WhatsApp QR is ready for UI retrieval via the auth status API");
            }
            QrEvent::Success => {
                status.set_logging_in("Logging into WhatsApp");
                info!("QR scanned, logging into WhatsApp");
            }
            QrEvent::Timeout => status.set_error("QR code scan timed out"),
            QrEvent::Error(reason) => {
                warn!(reason, "QR pairing failed");
                status.set_error("WhatsApp login error");
            }
        }
    }
}
