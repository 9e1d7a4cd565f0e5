//! Database connection management.
//!
//! [`MessageStore`] owns a single [`rusqlite::Connection`] behind a mutex and
//! guarantees that schema migrations have run before any other operation.
//! SQLite's own locking plus a 5 second busy timeout absorb the brief
//! contention between the HTTP handlers and the sync pipeline.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::Result;
use crate::migrations;

/// Name of the cache database file inside the store directory. The device
/// state database next to it is owned by the protocol library.
pub const CACHE_DB_FILE: &str = "messages.db";

pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    /// Open (or create) the cache under the given store directory.
    pub fn open(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir)?;
        Self::open_at(&store_dir.join(CACHE_DB_FILE))
    }

    /// Open (or create) a cache database at an explicit path.
    ///
    /// Useful for tests and for embedding the store in custom layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening message cache");

        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-statement; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path().map(PathBuf::from)
    }

    /// Delete every cached row: messages, chats and identity aliases, in a
    /// single transaction. Called on revoke.
    pub fn reset(&self) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages", [])?;
        tx.execute("DELETE FROM chats", [])?;
        tx.execute("DELETE FROM sender_id_aliases", [])?;
        tx.commit()?;
        Ok(())
    }
}
