//! SQLite persistence for formatter settings.
//!
//! The database is a small key-value store; `FormatSettings` is kept under a
//! single key as JSON.

mod migrations;

use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::provision::paths;

pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the database at the default location
    /// (`<data dir>/sqlfmt-bridge/settings.db`).
    pub fn open() -> rusqlite::Result<Self> {
        Self::open_at(Self::default_path())
    }

    /// Open the database at a specific path, creating parent directories.
    pub fn open_at(path: PathBuf) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }
        }

        let conn = Connection::open(&path)?;
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Open a throwaway database that lives only as long as this handle.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    pub fn default_path() -> PathBuf {
        paths::get_settings_db_path()
    }

    /// Run pending migrations. Safe to call repeatedly.
    pub fn migrate(&self) -> rusqlite::Result<()> {
        migrations::run_migrations(&self.conn)
    }

    /// Database file path; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Save a setting (upsert).
    pub fn set_setting(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, unixepoch())
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value],
        )?;
        Ok(())
    }

    /// Returns `None` if the setting doesn't exist.
    pub fn get_setting(&self, key: &str) -> rusqlite::Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?")?;
        match stmt.query_row([key], |row| row.get(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// No-op if the setting doesn't exist.
    pub fn delete_setting(&self, key: &str) -> rusqlite::Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])?;
        Ok(())
    }
}
