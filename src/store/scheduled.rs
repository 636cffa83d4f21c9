use anyhow::Result;
use rusqlite::params;
use tracing::info;

use super::Storage;
use super::types::{ScheduledPost, Weekday};

/// Scheduled-post records, keyed by weekday.
///
/// The store does not serialize check-then-act sequences: two operators
/// editing the same weekday concurrently resolve last-write-wins. The
/// operator population is small and edits are human-paced, so no per-key
/// locking is layered on top.
impl Storage {
    /// Park an approved post for `weekday`, overwriting any prior entry.
    pub async fn put_scheduled_post(
        &self,
        weekday: Weekday,
        text: &str,
        media: &[String],
        author: &str,
    ) -> Result<()> {
        let media_json = serde_json::to_string(media)?;
        let db = self.db().lock().await;
        db.execute(
            "INSERT OR REPLACE INTO scheduled_posts (weekday, body, media, created_at, created_by)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP, ?4)",
            params![weekday.as_str(), text, media_json, author],
        )?;
        info!(weekday = weekday.as_str(), "scheduled post stored");
        Ok(())
    }

    pub async fn get_scheduled_post(&self, weekday: Weekday) -> Result<Option<ScheduledPost>> {
        let db = self.db().lock().await;
        let mut stmt = db.prepare(
            "SELECT weekday, body, media, created_at, created_by
             FROM scheduled_posts WHERE weekday = ?1",
        )?;
        let mut rows = stmt.query_map(params![weekday.as_str()], row_to_post)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn remove_scheduled_post(&self, weekday: Weekday) -> Result<bool> {
        let db = self.db().lock().await;
        let deleted = db.execute(
            "DELETE FROM scheduled_posts WHERE weekday = ?1",
            params![weekday.as_str()],
        )?;
        if deleted > 0 {
            info!(weekday = weekday.as_str(), "scheduled post removed");
        }
        Ok(deleted > 0)
    }

    pub async fn list_scheduled_posts(&self) -> Result<Vec<ScheduledPost>> {
        let db = self.db().lock().await;
        let mut stmt = db.prepare(
            "SELECT weekday, body, media, created_at, created_by
             FROM scheduled_posts ORDER BY weekday",
        )?;
        let rows = stmt.query_map([], row_to_post)?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledPost> {
    let weekday_name: String = row.get(0)?;
    let media_json: String = row.get(2)?;
    Ok(ScheduledPost {
        weekday: Weekday::from_name(&weekday_name).unwrap_or(Weekday::Monday),
        text: row.get(1)?,
        media: serde_json::from_str(&media_json).unwrap_or_default(),
        created_at: row.get(3)?,
        created_by: row.get(4)?,
    })
}
