use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;
use crate::turn::History;

/// Name of the slot holding the conversation document.
pub const HISTORY_SLOT: &str = "hr_chat_history";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("history storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("history directory error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn db_path() -> PathBuf {
    Config::get_config_dir().join("history.sqlite")
}

/// Whole-document persistence of the conversation in a single named slot.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Opens the file at `path`, or keeps history in memory when that fails.
    pub fn open_or_in_memory(path: &Path) -> Result<Self, StoreError> {
        Self::open(path).or_else(|e| {
            tracing::warn!(
                error = %e,
                path = %path.display(),
                "History file unavailable, keeping history in memory"
            );
            Self::open_in_memory()
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS slots (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(HistoryStore { conn })
    }

    /// Never fails: a missing or unreadable slot is an empty history.
    pub fn load(&self) -> History {
        let raw = match self.read_slot() {
            Ok(Some(raw)) => raw,
            Ok(None) => return History::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read history slot, starting empty");
                return History::new();
            }
        };

        match serde_json::from_str::<History>(&raw) {
            Ok(history) => {
                tracing::debug!(turns = history.len(), "History loaded");
                history
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persisted history is malformed, starting empty");
                History::new()
            }
        }
    }

    /// Overwrites the slot with the full sequence.
    pub fn save(&self, history: &History) -> Result<(), StoreError> {
        let raw = serde_json::to_string(history)?;
        self.write_slot(&raw)?;
        tracing::debug!(turns = history.len(), "History saved");
        Ok(())
    }

    /// Persists and returns an empty history.
    pub fn clear(&self) -> Result<History, StoreError> {
        let history = History::new();
        self.save(&history)?;
        Ok(history)
    }

    fn read_slot(&self) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM slots WHERE name = ?1",
                params![HISTORY_SLOT],
                |row| row.get(0),
            )
            .optional()
    }

    fn write_slot(&self, raw: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO slots (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![HISTORY_SLOT, raw],
        )?;
        Ok(())
    }
}
