use anyhow::Result;
use rusqlite::params;
use tracing::warn;

use super::Storage;
use super::types::{GenerationRecord, RecordKind, RecordStatus};

/// Totals over the audit trail, for operator-facing status output only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub edits: usize,
}

/// Generation audit trail. Append-only; rows are updated in place by id
/// until they reach a terminal status.
impl Storage {
    pub async fn add_generation_record(
        &self,
        id: &str,
        kind: RecordKind,
        prompt: &str,
        source_text: Option<&str>,
    ) -> Result<()> {
        let db = self.db().lock().await;
        db.execute(
            "INSERT INTO generation_records (id, kind, prompt, source_text, status)
             VALUES (?1, ?2, ?3, ?4, 'pending')",
            params![id, kind.as_str(), prompt, source_text],
        )?;
        Ok(())
    }

    pub async fn finish_generation_record(
        &self,
        id: &str,
        status: RecordStatus,
        result_text: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let db = self.db().lock().await;
        let updated = db.execute(
            "UPDATE generation_records SET status = ?1, result_text = ?2, error = ?3
             WHERE id = ?4",
            params![status.as_str(), result_text, error, id],
        )?;
        if updated == 0 {
            warn!(id, "generation record not found for update");
        }
        Ok(())
    }

    pub async fn get_generation_record(&self, id: &str) -> Result<Option<GenerationRecord>> {
        let db = self.db().lock().await;
        let mut stmt = db.prepare(
            "SELECT id, kind, prompt, source_text, result_text, status, error, created_at
             FROM generation_records WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], row_to_record)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Recent completed results, usable as optional context for later
    /// generation. Never consulted by the pipeline's own control flow.
    pub async fn recent_completed_results(&self, limit: usize) -> Result<Vec<String>> {
        let db = self.db().lock().await;
        let mut stmt = db.prepare(
            "SELECT result_text FROM generation_records
             WHERE status = 'completed' AND result_text IS NOT NULL
             ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn history_summary(&self) -> Result<HistorySummary> {
        let db = self.db().lock().await;
        let mut stmt =
            db.prepare("SELECT status, kind, COUNT(*) FROM generation_records GROUP BY status, kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as usize,
            ))
        })?;

        let mut summary = HistorySummary::default();
        for row in rows {
            let (status, kind, count) = row?;
            summary.total += count;
            match RecordStatus::from_name(&status) {
                Some(RecordStatus::Completed) => summary.completed += count,
                Some(RecordStatus::Failed) => summary.failed += count,
                Some(RecordStatus::Pending) | None => summary.pending += count,
            }
            if RecordKind::from_name(&kind) == Some(RecordKind::Edit) {
                summary.edits += count;
            }
        }
        Ok(summary)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationRecord> {
    let kind: String = row.get(1)?;
    let status: String = row.get(5)?;
    Ok(GenerationRecord {
        id: row.get(0)?,
        kind: RecordKind::from_name(&kind).unwrap_or(RecordKind::Generate),
        prompt: row.get(2)?,
        source_text: row.get(3)?,
        result_text: row.get(4)?,
        status: RecordStatus::from_name(&status).unwrap_or(RecordStatus::Pending),
        error: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("pipeline.db")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn record_lifecycle_pending_to_completed() {
        let (_dir, storage) = temp_storage().await;
        storage
            .add_generation_record("r1", RecordKind::Generate, "write a post", None)
            .await
            .unwrap();

        let record = storage.get_generation_record("r1").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Pending);
        assert!(record.result_text.is_none());

        storage
            .finish_generation_record("r1", RecordStatus::Completed, Some("the post"), None)
            .await
            .unwrap();
        let record = storage.get_generation_record("r1").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.result_text.as_deref(), Some("the post"));
    }

    #[tokio::test]
    async fn failed_record_keeps_error() {
        let (_dir, storage) = temp_storage().await;
        storage
            .add_generation_record("r2", RecordKind::Edit, "shorten", Some("old text"))
            .await
            .unwrap();
        storage
            .finish_generation_record("r2", RecordStatus::Failed, None, Some("timed out"))
            .await
            .unwrap();

        let record = storage.get_generation_record("r2").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("timed out"));
        assert_eq!(record.source_text.as_deref(), Some("old text"));
    }

    #[tokio::test]
    async fn summary_counts_by_status_and_kind() {
        let (_dir, storage) = temp_storage().await;
        for (id, kind) in [
            ("a", RecordKind::Generate),
            ("b", RecordKind::Edit),
            ("c", RecordKind::PublishNow),
        ] {
            storage
                .add_generation_record(id, kind, "p", None)
                .await
                .unwrap();
        }
        storage
            .finish_generation_record("a", RecordStatus::Completed, Some("x"), None)
            .await
            .unwrap();
        storage
            .finish_generation_record("b", RecordStatus::Failed, None, Some("e"))
            .await
            .unwrap();

        let summary = storage.history_summary().await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.edits, 1);

        let recent = storage.recent_completed_results(5).await.unwrap();
        assert_eq!(recent, vec!["x".to_string()]);
    }
}
