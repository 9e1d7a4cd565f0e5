//! The capability surface the bridge requires from the protocol library.
//!
//! Everything below the wire (signaling, encryption, the QR pairing channel,
//! media transport cryptography) is a black box behind [`Gateway`]. The
//! bridge never sees sockets or frames, only this trait; concrete wire
//! backends live out of tree and are selected when the binary is assembled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::GatewayEvent;
use crate::jid::Jid;
use crate::media::MediaKind;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no protocol backend is compiled into this build")]
    BackendUnavailable,

    #[error("client is not connected")]
    NotConnected,

    #[error("pairing error: {0}")]
    Pairing(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Events emitted by the QR pairing channel.
#[derive(Debug, Clone)]
pub enum QrEvent {
    /// A fresh pairing payload to display; reissued until scanned.
    Code(String),
    Success,
    Timeout,
    Error(String),
}

/// Result of uploading a media blob to the platform.
#[derive(Debug, Clone, Default)]
pub struct UploadResponse {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Everything the library needs to fetch and decrypt one media payload.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub kind: MediaKind,
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Media attachment of an outbound message.
#[derive(Debug, Clone)]
pub struct OutboundMedia {
    pub caption: String,
    pub mime_type: String,
    pub upload: UploadResponse,
}

/// An outbound message payload.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    Text {
        body: String,
    },
    Image(OutboundMedia),
    Video(OutboundMedia),
    Audio {
        media: OutboundMedia,
        seconds: u32,
        waveform: Vec<u8>,
        voice_note: bool,
    },
    Document {
        media: OutboundMedia,
        title: String,
    },
}

/// A live session handle owned by the protocol library.
#[async_trait]
pub trait Gateway: Send + Sync {
    fn is_connected(&self) -> bool;

    /// The linked device identity, or `None` before first pairing (and after
    /// a revoke).
    fn device_id(&self) -> Option<Jid>;

    /// Reset the device store's initialized flag so the next successful pair
    /// re-binds storage to the new device identity. Called when
    /// [`Gateway::device_id`] is `None`.
    fn mark_uninitialized(&self);

    async fn connect(&self) -> Result<(), GatewayError>;

    async fn disconnect(&self);

    /// Remote logout of the linked device. On success implementations also
    /// delete the local device credentials.
    async fn logout(&self, deadline: Duration) -> Result<(), GatewayError>;

    /// Delete local device credentials.
    async fn clear_device(&self, deadline: Duration) -> Result<(), GatewayError>;

    /// Open the QR pairing channel. Only valid while no device is linked.
    async fn qr_channel(&self) -> Result<mpsc::UnboundedReceiver<QrEvent>, GatewayError>;

    async fn send_message(
        &self,
        to: Jid,
        message: OutgoingMessage,
        deadline: Duration,
    ) -> Result<(), GatewayError>;

    async fn upload(&self, data: Vec<u8>, kind: MediaKind) -> Result<UploadResponse, GatewayError>;

    async fn download(&self, source: &MediaSource) -> Result<Vec<u8>, GatewayError>;

    /// Phone-number form of a hidden-space identifier, if the library's
    /// LID index knows one.
    async fn pn_for_lid(&self, lid: &Jid) -> Option<Jid>;

    /// Hidden-space form of a phone-number identifier, if known.
    async fn lid_for_pn(&self, pn: &Jid) -> Option<Jid>;

    async fn group_name(&self, group: &Jid) -> Option<String>;

    async fn contact_name(&self, contact: &Jid) -> Option<String>;
}

/// Creates gateway handles wired to an event stream.
///
/// The receiver carries every upstream event for the lifetime of the handle,
/// in arrival order; the session controller owns wiring it to the event
/// pipeline.
#[async_trait]
pub trait GatewayFactory: Send + Sync {
    async fn create(
        &self,
    ) -> Result<(Arc<dyn Gateway>, mpsc::UnboundedReceiver<GatewayEvent>), GatewayError>;
}

/// Factory for builds without a wire backend. The control plane stays up and
/// every connect attempt reports the error through the auth status.
pub struct UnlinkedBackend;

#[async_trait]
impl GatewayFactory for UnlinkedBackend {
    async fn create(
        &self,
    ) -> Result<(Arc<dyn Gateway>, mpsc::UnboundedReceiver<GatewayEvent>), GatewayError> {
        Err(GatewayError::BackendUnavailable)
    }
}
