//! Message payload extraction.
//!
//! Pulls the text body and media metadata out of a normalized upstream
//! message, and assigns synthetic download filenames for media kinds the
//! platform does not name.

use chrono::{DateTime, Utc};

use wabridge_shared::event::{MediaRef, MessageContent};
use wabridge_shared::MediaKind;
use wabridge_store::MediaColumns;

/// Best-effort text content: plain conversation first, then extended text.
pub fn extract_text_content(content: &MessageContent) -> String {
    if let Some(text) = &content.conversation {
        if !text.is_empty() {
            return text.clone();
        }
    }
    content.extended_text.clone().unwrap_or_default()
}

/// Media metadata for persistence, or `None` for a text-only message.
///
/// Image, video and audio filenames are derived from the message timestamp
/// so re-ingesting the same message lands on the same file on disk.
pub fn extract_media_info(
    content: &MessageContent,
    timestamp: DateTime<Utc>,
) -> Option<MediaColumns> {
    let stamp = timestamp.format("%Y%m%d_%H%M%S");

    if let Some(image) = &content.image {
        return Some(media_columns(MediaKind::Image, format!("image_{stamp}.jpg"), image));
    }
    if let Some(video) = &content.video {
        return Some(media_columns(MediaKind::Video, format!("video_{stamp}.mp4"), video));
    }
    if let Some(audio) = &content.audio {
        return Some(media_columns(MediaKind::Audio, format!("audio_{stamp}.ogg"), audio));
    }
    if let Some(document) = &content.document {
        let filename = document
            .file_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("document_{stamp}"));
        return Some(media_columns(MediaKind::Document, filename, document));
    }

    None
}

fn media_columns(kind: MediaKind, filename: String, media: &MediaRef) -> MediaColumns {
    MediaColumns {
        kind: Some(kind),
        filename,
        url: media.url.clone(),
        media_key: media.media_key.clone(),
        file_sha256: media.file_sha256.clone(),
        file_enc_sha256: media.file_enc_sha256.clone(),
        file_length: media.file_length,
    }
}
