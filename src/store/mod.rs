mod history;
mod scheduled;
mod slots;
pub mod types;

pub use history::HistorySummary;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

/// Single-file pipeline database: slot configuration, parked scheduled
/// posts, and the generation audit trail.
pub struct Storage {
    db: Arc<Mutex<Connection>>,
}

impl Storage {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await?;
        }

        let db = Connection::open(path)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS slots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                weekday TEXT NOT NULL,
                position INTEGER NOT NULL,
                hour INTEGER NOT NULL,
                minute INTEGER NOT NULL,
                label TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS scheduled_posts (
                weekday TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                media TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                created_by TEXT NOT NULL DEFAULT ''
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS generation_records (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                prompt TEXT NOT NULL,
                source_text TEXT,
                result_text TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        info!(path = %path.display(), "pipeline storage opened");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub(crate) fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }
}
