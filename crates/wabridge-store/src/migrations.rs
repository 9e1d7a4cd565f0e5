//! Schema bootstrap and migrations.
//!
//! Every step here is additive and idempotent and runs on every open, in
//! order: declarative table creation, column backfill on legacy tables,
//! index creation, then a one-shot normalization that rewrites legacy rows
//! to canonical identifiers.
//!
//! The on-disk column names are legacy (`messages.sender`, `chats.jid`); the
//! crate's public API translates them to `sender_id` / `chat_jid`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

const BOOTSTRAP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    jid               TEXT PRIMARY KEY,
    name              TEXT,
    last_message_time TIMESTAMP
);

CREATE TABLE IF NOT EXISTS messages (
    id              TEXT,
    chat_jid        TEXT,
    sender          TEXT,
    content         TEXT,
    timestamp       TIMESTAMP,
    is_from_me      BOOLEAN,
    media_type      TEXT,
    filename        TEXT,
    url             TEXT,
    media_key       BLOB,
    file_sha256     BLOB,
    file_enc_sha256 BLOB,
    file_length     INTEGER,
    PRIMARY KEY (id, chat_jid),
    FOREIGN KEY (chat_jid) REFERENCES chats(jid)
);

CREATE TABLE IF NOT EXISTS sender_id_aliases (
    alias_id     TEXT PRIMARY KEY,
    canonical_id TEXT NOT NULL,
    updated_at   TIMESTAMP NOT NULL
);
"#;

const INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_chats_last_message_time
    ON chats(last_message_time DESC);
CREATE INDEX IF NOT EXISTS idx_messages_chat_timestamp
    ON messages(chat_jid, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_messages_sender_timestamp
    ON messages(sender, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_sender_id_aliases_canonical_id
    ON sender_id_aliases(canonical_id);
"#;

struct SchemaColumn {
    name: &'static str,
    definition: &'static str,
}

const CHAT_COLUMNS: &[SchemaColumn] = &[
    SchemaColumn { name: "jid", definition: "TEXT" },
    SchemaColumn { name: "name", definition: "TEXT" },
    SchemaColumn { name: "last_message_time", definition: "TIMESTAMP" },
];

const MESSAGE_COLUMNS: &[SchemaColumn] = &[
    SchemaColumn { name: "id", definition: "TEXT" },
    SchemaColumn { name: "chat_jid", definition: "TEXT" },
    SchemaColumn { name: "sender", definition: "TEXT" },
    SchemaColumn { name: "content", definition: "TEXT" },
    SchemaColumn { name: "timestamp", definition: "TIMESTAMP" },
    SchemaColumn { name: "is_from_me", definition: "BOOLEAN" },
    SchemaColumn { name: "media_type", definition: "TEXT" },
    SchemaColumn { name: "filename", definition: "TEXT" },
    SchemaColumn { name: "url", definition: "TEXT" },
    SchemaColumn { name: "media_key", definition: "BLOB" },
    SchemaColumn { name: "file_sha256", definition: "BLOB" },
    SchemaColumn { name: "file_enc_sha256", definition: "BLOB" },
    SchemaColumn { name: "file_length", definition: "INTEGER" },
];

/// Add any missing required column to an existing table.
fn ensure_table_columns(
    conn: &Connection,
    table: &str,
    required: &[SchemaColumn],
) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<_, _>>()?;

    for column in required {
        if existing.iter().any(|name| name == column.name) {
            continue;
        }
        tracing::info!(table, column = column.name, "adding missing column");
        conn.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {} {}",
            column.name, column.definition
        ))?;
    }

    Ok(())
}

/// One-shot normalization of legacy rows.
///
/// Strips server suffixes from `messages.sender`, seeds the alias table from
/// the observed senders, then rewrites `chats.jid` and `messages.chat_jid`
/// through a temporary old→new map. Group identifiers pass through
/// unchanged; merges preserve a non-empty display name and only advance
/// `last_message_time` forward.
fn normalize_legacy_rows(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        UPDATE messages SET sender = SUBSTR(sender, 1, INSTR(sender, '@') - 1)
        WHERE INSTR(sender, '@') > 1;

        INSERT INTO sender_id_aliases (alias_id, canonical_id, updated_at)
        SELECT sender, sender, MAX(timestamp)
        FROM messages
        WHERE sender IS NOT NULL AND sender <> ''
        GROUP BY sender
        ON CONFLICT(alias_id) DO UPDATE SET
            canonical_id = excluded.canonical_id,
            updated_at = CASE
                WHEN excluded.updated_at > sender_id_aliases.updated_at THEN excluded.updated_at
                ELSE sender_id_aliases.updated_at
            END;

        CREATE TEMP TABLE IF NOT EXISTS chat_id_map (
            old_id TEXT PRIMARY KEY,
            new_id TEXT NOT NULL
        );
        DELETE FROM chat_id_map;

        INSERT OR REPLACE INTO chat_id_map (old_id, new_id)
        SELECT source_id,
            CASE
                WHEN source_id LIKE '%@g.us' THEN source_id
                WHEN INSTR(source_id, '@') > 0 THEN COALESCE(
                    (SELECT canonical_id FROM sender_id_aliases
                     WHERE alias_id = SUBSTR(source_id, 1, INSTR(source_id, '@') - 1) LIMIT 1),
                    SUBSTR(source_id, 1, INSTR(source_id, '@') - 1)
                )
                ELSE COALESCE(
                    (SELECT canonical_id FROM sender_id_aliases
                     WHERE alias_id = source_id LIMIT 1),
                    source_id
                )
            END AS normalized_id
        FROM (
            SELECT jid AS source_id FROM chats
            UNION
            SELECT chat_jid AS source_id FROM messages
        )
        WHERE source_id IS NOT NULL AND source_id <> '';

        INSERT INTO chats (jid, name, last_message_time)
        SELECT DISTINCT new_id, NULL, NULL
        FROM chat_id_map
        WHERE new_id <> old_id
        ON CONFLICT(jid) DO NOTHING;

        INSERT INTO chats (jid, name, last_message_time)
        SELECT map.new_id, c.name, c.last_message_time
        FROM chats c
        JOIN chat_id_map map ON map.old_id = c.jid
        WHERE map.new_id <> map.old_id
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
            END;

        UPDATE messages
        SET chat_jid = (
            SELECT new_id FROM chat_id_map WHERE old_id = messages.chat_jid
        )
        WHERE EXISTS (
            SELECT 1 FROM chat_id_map
            WHERE old_id = messages.chat_jid AND new_id <> old_id
        );

        DELETE FROM chats
        WHERE jid IN (
            SELECT old_id FROM chat_id_map WHERE new_id <> old_id
        );

        DROP TABLE IF EXISTS chat_id_map;
        "#,
    )?;
    Ok(())
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(BOOTSTRAP_SQL)
        .map_err(|e| StoreError::Migration(format!("bootstrap failed: {e}")))?;

    ensure_table_columns(conn, "chats", CHAT_COLUMNS)?;
    ensure_table_columns(conn, "messages", MESSAGE_COLUMNS)?;

    conn.execute_batch(INDEX_SQL)
        .map_err(|e| StoreError::Migration(format!("index creation failed: {e}")))?;

    normalize_legacy_rows(conn)
        .map_err(|e| StoreError::Migration(format!("row normalization failed: {e}")))?;

    Ok(())
}
