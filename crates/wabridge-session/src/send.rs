//! Outbound message sending.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use wabridge_media::{analyze_ogg_opus, classify_media_path};
use wabridge_shared::gateway::{Gateway, GatewayError, OutboundMedia, OutgoingMessage};
use wabridge_shared::log_refs::obfuscated_chat_ref;
use wabridge_shared::{Jid, MediaKind, DEFAULT_USER_SERVER};

use crate::error::{Result, SessionError};

/// Request-scoped deadline for the platform send RPC.
const SEND_DEADLINE: Duration = Duration::from_secs(20);

/// Fallback voice-note length when the payload cannot be analyzed.
const DEFAULT_AUDIO_SECONDS: u32 = 30;

/// Send text and/or media through a connected handle.
///
/// The recipient is either bare digits (taken as the phone-number space) or
/// a full `user@server` identifier.
pub async fn send_message(
    gateway: &dyn Gateway,
    recipient: &str,
    text: &str,
    media_path: Option<&Path>,
) -> Result<String> {
    if !gateway.is_connected() {
        return Err(SessionError::NotConnected);
    }

    let recipient_jid = parse_recipient_jid(recipient)?;

    let message = match media_path {
        Some(path) => build_media_message(gateway, path, text).await?,
        None => OutgoingMessage::Text {
            body: text.to_string(),
        },
    };

    gateway
        .send_message(recipient_jid.clone(), message, SEND_DEADLINE)
        .await
        .map_err(|e| match e {
            GatewayError::NotConnected => SessionError::NotConnected,
            other => SessionError::Gateway(other),
        })?;

    info!(
        chat_ref = obfuscated_chat_ref(&recipient_jid.to_string()),
        "message sent"
    );
    Ok(format!("Message sent to {recipient}"))
}

/// Accept either a full identifier or bare phone-number digits.
fn parse_recipient_jid(recipient: &str) -> Result<Jid> {
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err(SessionError::InvalidRecipient("recipient is empty".into()));
    }

    if recipient.contains('@') {
        recipient
            .parse::<Jid>()
            .map_err(|e| SessionError::InvalidRecipient(e.to_string()))
    } else {
        Ok(Jid::new(recipient, DEFAULT_USER_SERVER))
    }
}

/// Read, classify, analyze and upload a media file, then build the matching
/// outbound payload.
async fn build_media_message(
    gateway: &dyn Gateway,
    path: &Path,
    caption: &str,
) -> Result<OutgoingMessage> {
    let data = tokio::fs::read(path).await?;
    let (kind, mime_type) = classify_media_path(path);

    // Voice notes get a real duration and waveform preview; other audio
    // keeps the platform defaults.
    let audio_analysis = match kind {
        MediaKind::Audio if mime_type.contains("ogg") => Some(analyze_ogg_opus(&data)?),
        _ => None,
    };

    let upload = gateway.upload(data, kind).await?;
    let media = OutboundMedia {
        caption: caption.to_string(),
        mime_type: mime_type.to_string(),
        upload,
    };

    Ok(match kind {
        MediaKind::Image => OutgoingMessage::Image(media),
        MediaKind::Video => OutgoingMessage::Video(media),
        MediaKind::Audio => {
            let (seconds, waveform) = audio_analysis
                .map(|analysis| (analysis.seconds, analysis.waveform))
                .unwrap_or((DEFAULT_AUDIO_SECONDS, Vec::new()));
            OutgoingMessage::Audio {
                media,
                seconds,
                waveform,
                voice_note: true,
            }
        }
        MediaKind::Document => OutgoingMessage::Document {
            title: path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string(),
            media,
        },
    })
}
