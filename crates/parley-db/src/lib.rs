pub mod memory;
pub mod migrations;
pub mod models;
pub mod password;
pub mod queries;
mod store;

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use memory::MemoryStore;
pub use password::Passwords;

/// SQLite-backed store.
pub struct Database {
    conn: Mutex<Connection>,
    passwords: Passwords,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, Passwords::default())
    }

    pub fn open_with(path: &Path, passwords: Passwords) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            passwords,
        })
    }

    /// Private database that disappears with the handle.
    pub fn open_in_memory(passwords: Passwords) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            passwords,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}
