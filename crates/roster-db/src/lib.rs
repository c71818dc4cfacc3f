pub mod keys;
pub mod migrations;
pub mod queries;
pub mod records;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Durable string-keyed, string-valued store backed by SQLite.
///
/// Every write is committed before the call returns. Callers that read a
/// record, change it and write it back wrap the whole sequence in
/// [`Database::exclusive`] so concurrent updates cannot overwrite each other.
pub struct Database {
    conn: Mutex<Connection>,
    writer: Mutex<()>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            writer: Mutex::new(()),
        })
    }

    /// Private in-memory store, gone when dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            writer: Mutex::new(()),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run a read-modify-write sequence with no other such sequence in
    /// between. Not reentrant: `f` must not call `exclusive` again.
    pub fn exclusive<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        // The guard protects no data, so a poisoned lock is still usable
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }
}
