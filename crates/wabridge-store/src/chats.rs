use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::MessageStore;
use crate::error::Result;
use crate::models::ChatSummary;

impl MessageStore {
    /// Insert or update a chat row.
    ///
    /// A non-empty stored display name is never replaced by an empty one,
    /// and `last_message_time` only moves forward (or fills a null).
    pub fn upsert_chat(
        &self,
        chat_jid: &str,
        name: &str,
        last_message_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.lock().execute(
            "INSERT INTO chats (jid, name, last_message_time) VALUES (?1, ?2, ?3)
             ON CONFLICT(jid) DO UPDATE SET
                name = CASE
                    WHEN excluded.name IS NOT NULL AND excluded.name <> '' THEN excluded.name
                    ELSE chats.name
                END,
                last_message_time = CASE
                    WHEN chats.last_message_time IS NULL THEN excluded.last_message_time
                    WHEN excluded.last_message_time IS NULL THEN chats.last_message_time
                    WHEN excluded.last_message_time > chats.last_message_time THEN excluded.last_message_time
                    ELSE chats.last_message_time
                END",
            params![chat_jid, name, last_message_time],
        )?;
        Ok(())
    }

    /// Stored display name for a chat, if any.
    pub fn get_chat_name(&self, chat_jid: &str) -> Result<Option<String>> {
        let name: Option<Option<String>> = self
            .lock()
            .query_row(
                "SELECT name FROM chats WHERE jid = ?1",
                params![chat_jid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.flatten().filter(|n| !n.is_empty()))
    }

    /// All chats, most recently active first.
    pub fn get_chats(&self) -> Result<Vec<ChatSummary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT jid, name, last_message_time FROM chats
             ORDER BY last_message_time DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ChatSummary {
                chat_jid: row.get(0)?,
                name: row.get(1)?,
                last_message_time: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Fold alias chat rows into a canonical one.
    ///
    /// For each alias: carry the older row's name and latest time into the
    /// canonical chat (honoring the merge guards), repoint its messages and
    /// drop the alias row. Transactional so a crash never leaves messages
    /// pointing at a deleted chat.
    pub fn promote_chat(&self, canonical_id: &str, aliases: &[String]) -> Result<()> {
        let canonical = wabridge_shared::normalize_user_id(canonical_id);
        if canonical.is_empty() {
            return Ok(());
        }

        let promote_from = dedup_aliases(&canonical, aliases);
        if promote_from.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for alias in &promote_from {
            tx.execute(
                "INSERT INTO chats (jid, name, last_message_time)
                 SELECT ?1, name, last_message_time
                 FROM chats
                 WHERE jid = ?2
                 ON CONFLICT(jid) DO UPDATE SET
                    name = CASE
                        WHEN chats.name IS NOT NULL AND chats.name <> '' THEN chats.name
                        ELSE excluded.name
                    END,
                    last_message_time = CASE
                        WHEN chats.last_message_time IS NULL THEN excluded.last_message_time
                        WHEN excluded.last_message_time IS NULL THEN chats.last_message_time
                        WHEN excluded.last_message_time > chats.last_message_time THEN excluded.last_message_time
                        ELSE chats.last_message_time
                    END",
                params![canonical, alias],
            )?;
            tx.execute(
                "UPDATE messages SET chat_jid = ?1 WHERE chat_jid = ?2",
                params![canonical, alias],
            )?;
            tx.execute("DELETE FROM chats WHERE jid = ?1", params![alias])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Normalize and deduplicate aliases, dropping the canonical id itself and
/// empty entries.
pub(crate) fn dedup_aliases(canonical: &str, aliases: &[String]) -> Vec<String> {
    let mut unique = Vec::new();
    for alias in aliases {
        let normalized = wabridge_shared::normalize_user_id(alias);
        if normalized.is_empty() || normalized == canonical {
            continue;
        }
        if !unique.contains(&normalized) {
            unique.push(normalized);
        }
    }
    unique
}
