//! Published session status.
//!
//! The state machine is visible in two places at once: it drives the
//! controller's internal flow and it is the payload of the auth-status API.
//! Every transition builds a fresh [`AuthStatus`] record with a new
//! timestamp; readers only ever see complete snapshots.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::qr::qr_png_data_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingQr,
    LoggingIn,
    Syncing,
    Connected,
    LoggedOut,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingQr => "awaiting_qr",
            SessionState::LoggingIn => "logging_in",
            SessionState::Syncing => "syncing",
            SessionState::Connected => "connected",
            SessionState::LoggedOut => "logged_out",
            SessionState::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthStatus {
    pub state: SessionState,
    pub connected: bool,
    pub message: String,
    pub qr_code: String,
    pub qr_image_data_url: String,
    pub sync_progress: u8,
    pub sync_current: usize,
    pub sync_total: usize,
    pub updated_at: DateTime<Utc>,
}

impl AuthStatus {
    fn new(state: SessionState, connected: bool, message: &str) -> Self {
        Self {
            state,
            connected,
            message: message.to_string(),
            qr_code: String::new(),
            qr_image_data_url: String::new(),
            sync_progress: 0,
            sync_current: 0,
            sync_total: 0,
            updated_at: Utc::now(),
        }
    }
}

impl Default for AuthStatus {
    fn default() -> Self {
        Self::new(SessionState::Disconnected, false, "")
    }
}

fn clamp_progress(progress: u8) -> u8 {
    progress.min(100)
}

/// Shared, cloneable handle to the published status record.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<AuthStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> AuthStatus {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, mut status: AuthStatus) {
        status.updated_at = Utc::now();
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn set_connecting(&self, message: &str) {
        self.set(AuthStatus::new(SessionState::Connecting, false, message));
    }

    /// Publish a pairing code along with its rendered PNG form. An empty
    /// code still moves the state machine to `awaiting_qr`.
    pub fn set_awaiting_qr(&self, qr_code: &str, message: &str) {
        let mut status = AuthStatus::new(SessionState::AwaitingQr, false, message);
        if !qr_code.is_empty() {
            status.qr_code = qr_code.to_string();
            status.qr_image_data_url = qr_png_data_url(qr_code).unwrap_or_default();
        }
        self.set(status);
    }

    pub fn set_logging_in(&self, message: &str) {
        let mut status = AuthStatus::new(SessionState::LoggingIn, false, message);
        status.sync_progress = 10;
        self.set(status);
    }

    pub fn set_syncing(&self, message: &str, progress: u8, current: usize, total: usize) {
        let mut status = AuthStatus::new(SessionState::Syncing, false, message);
        status.sync_progress = clamp_progress(progress);
        status.sync_current = current;
        status.sync_total = total;
        self.set(status);
    }

    /// Advance sync progress, preserving (or adopting) the syncing state.
    pub fn set_syncing_progress(&self, progress: u8, current: usize, total: usize) {
        let mut status = self.get();
        if status.state != SessionState::Syncing {
            status.state = SessionState::Syncing;
            status.connected = false;
            if status.message.is_empty() {
                status.message = "Syncing WhatsApp messages".to_string();
            }
        }
        status.sync_progress = clamp_progress(progress);
        status.sync_current = current;
        status.sync_total = total;
        self.set(status);
    }

    pub fn set_connected(&self, message: &str) {
        let mut status = AuthStatus::new(SessionState::Connected, true, message);
        status.sync_progress = 100;
        self.set(status);
    }

    pub fn set_disconnected(&self, message: &str) {
        self.set(AuthStatus::new(SessionState::Disconnected, false, message));
    }

    pub fn set_logged_out(&self, message: &str) {
        self.set(AuthStatus::new(SessionState::LoggedOut, false, message));
    }

    pub fn set_error(&self, message: &str) {
        self.set(AuthStatus::new(SessionState::Error, false, message));
    }
}
