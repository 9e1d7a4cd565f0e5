use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::chats::dedup_aliases;
use crate::database::MessageStore;
use crate::error::Result;

impl MessageStore {
    /// Record that every alias in the set resolves to `canonical_id`.
    ///
    /// The canonical id always maps to itself. `updated_at` only moves
    /// forward, so replayed history cannot roll a mapping back in time.
    pub fn upsert_aliases(
        &self,
        canonical_id: &str,
        aliases: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let canonical = wabridge_shared::normalize_user_id(canonical_id);
        if canonical.is_empty() {
            return Ok(());
        }

        let mut unique = vec![canonical.clone()];
        unique.extend(dedup_aliases(&canonical, aliases));

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sender_id_aliases (alias_id, canonical_id, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(alias_id) DO UPDATE SET
                    canonical_id = excluded.canonical_id,
                    updated_at = CASE
                        WHEN excluded.updated_at > sender_id_aliases.updated_at THEN excluded.updated_at
                        ELSE sender_id_aliases.updated_at
                    END",
            )?;
            for alias in &unique {
                stmt.execute(params![alias, canonical, updated_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Rewrite stored message senders from any alias to the canonical id.
    pub fn promote_sender(&self, canonical_id: &str, aliases: &[String]) -> Result<()> {
        let canonical = wabridge_shared::normalize_user_id(canonical_id);
        if canonical.is_empty() {
            return Ok(());
        }

        let promote_from = dedup_aliases(&canonical, aliases);
        if promote_from.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; promote_from.len()].join(",");
        let sql = format!("UPDATE messages SET sender = ? WHERE sender IN ({placeholders})");

        let mut args: Vec<&dyn rusqlite::ToSql> = vec![&canonical];
        for alias in &promote_from {
            args.push(alias);
        }

        self.lock().execute(&sql, args.as_slice())?;
        Ok(())
    }

    /// Resolve a raw identifier through the alias table, if a mapping exists.
    pub fn canonical_for_alias(&self, alias_id: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let alias = wabridge_shared::normalize_user_id(alias_id);
        self.lock()
            .query_row(
                "SELECT canonical_id FROM sender_id_aliases WHERE alias_id = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }
}
