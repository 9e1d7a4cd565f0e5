use chrono::{DateTime, Utc};
use wabridge_shared::MediaKind;

/// A message row as written by the event pipeline.
///
/// `chat_jid` and `sender_id` are always canonical identifiers; the on-disk
/// columns keep their legacy names (`chat_jid`, `sender`) and the translation
/// happens inside this crate.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub chat_jid: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub media: Option<MediaColumns>,
}

/// Media metadata embedded in a message row.
#[derive(Debug, Clone, Default)]
pub struct MediaColumns {
    pub kind: Option<MediaKind>,
    pub filename: String,
    pub url: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

impl MediaColumns {
    /// Whether every field needed to download the payload is present.
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty()
            && !self.media_key.is_empty()
            && !self.file_sha256.is_empty()
            && !self.file_enc_sha256.is_empty()
            && self.file_length > 0
    }
}

/// A message as returned by read queries.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub content: String,
    pub is_from_me: bool,
    pub media_kind: Option<MediaKind>,
    pub filename: String,
}

/// A chat row summary, newest-first in listings.
#[derive(Debug, Clone)]
pub struct ChatSummary {
    pub chat_jid: String,
    pub name: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}
