//! Normalized upstream events.
//!
//! The protocol library's wire shapes are flattened into these structs before
//! they reach the bridge. The event pipeline consumes them sequentially from
//! the receiver handed out at handle creation.

use chrono::{DateTime, Utc};

use crate::jid::Jid;

/// Event stream delivered by a gateway handle, in arrival order.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Message(LiveMessage),
    HistorySync(HistorySync),
    Connected,
    LoggedOut,
}

/// A live incoming (or echoed outgoing) message.
#[derive(Debug, Clone)]
pub struct LiveMessage {
    pub info: MessageInfo,
    pub content: MessageContent,
}

#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    /// The sender's identifier in the other address space, when the server
    /// included one (e.g. the phone-number form of a hidden-space sender).
    pub sender_alt: Option<Jid>,
    pub timestamp: DateTime<Utc>,
    pub from_me: bool,
}

/// Flattened message body. At most one media slot is populated.
#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    pub conversation: Option<String>,
    pub extended_text: Option<String>,
    pub image: Option<MediaRef>,
    pub video: Option<MediaRef>,
    pub audio: Option<MediaRef>,
    pub document: Option<MediaRef>,
}

/// Download metadata attached to an incoming media message.
#[derive(Debug, Clone, Default)]
pub struct MediaRef {
    pub url: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
    /// Original file name, only populated for documents.
    pub file_name: Option<String>,
}

/// A batch of historical conversations pushed by the server after pairing.
#[derive(Debug, Clone, Default)]
pub struct HistorySync {
    pub conversations: Vec<HistoryConversation>,
}

/// One conversation snapshot. Messages are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryConversation {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryMessage {
    pub key: Option<MessageKey>,
    /// Unix seconds; `0` means the server sent no timestamp.
    pub timestamp: i64,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Default)]
pub struct MessageKey {
    pub id: Option<String>,
    pub from_me: bool,
    pub participant: Option<String>,
}
