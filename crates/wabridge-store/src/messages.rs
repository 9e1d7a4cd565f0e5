use rusqlite::{params, OptionalExtension};
use wabridge_shared::MediaKind;

use crate::database::MessageStore;
use crate::error::{Result, StoreError};
use crate::models::{MediaColumns, MessageRecord, StoredMessage};

impl MessageStore {
    /// Insert or replace a message row keyed by `(id, chat_jid)`.
    ///
    /// Rows with neither text content nor a media kind are dropped without
    /// error. Replacement overwrites the media columns in full.
    pub fn upsert_message(&self, record: &MessageRecord) -> Result<()> {
        let media = record.media.clone().unwrap_or_default();
        if record.content.is_empty() && media.kind.is_none() {
            return Ok(());
        }

        self.lock().execute(
            "INSERT OR REPLACE INTO messages
             (id, chat_jid, sender, content, timestamp, is_from_me,
              media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.chat_jid,
                record.sender_id,
                record.content,
                record.timestamp,
                record.is_from_me,
                media.kind.map(|k| k.as_str()).unwrap_or(""),
                media.filename,
                media.url,
                media.media_key,
                media.file_sha256,
                media.file_enc_sha256,
                media.file_length as i64,
            ],
        )?;
        Ok(())
    }

    /// Update only the media download columns of an existing row.
    pub fn upsert_media_info(
        &self,
        id: &str,
        chat_jid: &str,
        url: &str,
        media_key: &[u8],
        file_sha256: &[u8],
        file_enc_sha256: &[u8],
        file_length: u64,
    ) -> Result<()> {
        self.lock().execute(
            "UPDATE messages
             SET url = ?1, media_key = ?2, file_sha256 = ?3, file_enc_sha256 = ?4, file_length = ?5
             WHERE id = ?6 AND chat_jid = ?7",
            params![
                url,
                media_key,
                file_sha256,
                file_enc_sha256,
                file_length as i64,
                id,
                chat_jid
            ],
        )?;
        Ok(())
    }

    /// Media metadata for a message row.
    ///
    /// Columns that were never populated come back as empty values, so a
    /// partially known row still yields its `(kind, filename)` pair; callers
    /// check [`MediaColumns::is_complete`] before attempting a download.
    pub fn get_media_info(&self, id: &str, chat_jid: &str) -> Result<MediaColumns> {
        self.lock()
            .query_row(
                "SELECT media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length
                 FROM messages WHERE id = ?1 AND chat_jid = ?2",
                params![id, chat_jid],
                |row| {
                    let kind: Option<String> = row.get(0)?;
                    Ok(MediaColumns {
                        kind: kind.as_deref().and_then(MediaKind::parse),
                        filename: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        url: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        media_key: row.get::<_, Option<Vec<u8>>>(3)?.unwrap_or_default(),
                        file_sha256: row.get::<_, Option<Vec<u8>>>(4)?.unwrap_or_default(),
                        file_enc_sha256: row.get::<_, Option<Vec<u8>>>(5)?.unwrap_or_default(),
                        file_length: row.get::<_, Option<i64>>(6)?.unwrap_or_default() as u64,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    /// Recent messages for a chat, newest first.
    pub fn get_messages(&self, chat_jid: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT sender, content, timestamp, is_from_me, media_type, filename
             FROM messages WHERE chat_jid = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![chat_jid, limit], |row| {
            let kind: Option<String> = row.get(4)?;
            Ok(StoredMessage {
                sender_id: row.get(0)?,
                content: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                timestamp: row.get(2)?,
                is_from_me: row.get(3)?,
                media_kind: kind.as_deref().and_then(MediaKind::parse),
                filename: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}
