//! Media download into the chat-scoped store directory.

use std::path::{Path, PathBuf};

use tracing::info;

use wabridge_shared::gateway::{Gateway, MediaSource};
use wabridge_shared::log_refs::obfuscated_message_ref;
use wabridge_shared::MediaKind;
use wabridge_store::{MessageStore, StoreError};

use crate::error::{Result, SessionError};

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub kind: MediaKind,
    pub filename: String,
    /// Absolute path of the file on disk.
    pub path: PathBuf,
}

/// Fetch a message's media payload and persist it under
/// `<store>/<chat id with ':' replaced by '_'>/<filename>`.
///
/// An already-downloaded file short-circuits without touching the network.
/// Fresh downloads require the full metadata set (url, key, both hashes and
/// a non-zero length) and are written atomically.
pub async fn download_media(
    gateway: &dyn Gateway,
    store: &MessageStore,
    store_dir: &Path,
    message_id: &str,
    chat_jid: &str,
) -> Result<DownloadOutcome> {
    let media = store.get_media_info(message_id, chat_jid).map_err(|e| match e {
        StoreError::NotFound => SessionError::MessageNotFound,
        other => SessionError::Store(other),
    })?;

    let Some(kind) = media.kind else {
        return Err(SessionError::NotMedia);
    };

    // Keep only the final path component of the stored filename; document
    // names come from the remote side.
    let filename = Path::new(&media.filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("media.bin")
        .to_string();

    let chat_dir = store_dir.join(chat_jid.replace(':', "_"));
    std::fs::create_dir_all(&chat_dir)?;

    let local_path = chat_dir.join(&filename);
    let abs_path = std::path::absolute(&local_path)?;

    if local_path.exists() {
        return Ok(DownloadOutcome {
            kind,
            filename,
            path: abs_path,
        });
    }

    if !media.is_complete() {
        return Err(SessionError::IncompleteMedia);
    }

    let source = MediaSource {
        kind,
        direct_path: extract_direct_path(&media.url),
        url: media.url,
        media_key: media.media_key,
        file_sha256: media.file_sha256,
        file_enc_sha256: media.file_enc_sha256,
        file_length: media.file_length,
    };
    let data = gateway.download(&source).await?;

    // Write through a temp file so a crash never leaves a truncated blob
    // that the on-disk short-circuit would then trust.
    let tmp_path = chat_dir.join(format!(".{filename}.part"));
    std::fs::write(&tmp_path, &data)?;
    std::fs::rename(&tmp_path, &local_path)?;

    info!(
        media_type = %kind,
        message_ref = obfuscated_message_ref(message_id),
        size = data.len(),
        "downloaded media"
    );

    Ok(DownloadOutcome {
        kind,
        filename,
        path: abs_path,
    })
}

/// Derive the platform direct path from a stored media URL: everything
/// after the host's `.net/`, with the query string cut off.
fn extract_direct_path(url: &str) -> String {
    match url.split_once(".net/") {
        Some((_, rest)) => {
            let path = rest.split('?').next().unwrap_or(rest);
            format!("/{path}")
        }
        None => url.to_string(),
    }
}
