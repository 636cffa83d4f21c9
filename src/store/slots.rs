use anyhow::{Result, bail};
use rusqlite::{OptionalExtension, params};
use tracing::info;

use super::Storage;
use super::types::{Slot, SlotUpdate, Weekday};

/// Slot configuration. Insertion order within a weekday is display and
/// fire order; positions are renumbered on removal. Edits here take effect
/// on the scheduler's next `reload()`.
impl Storage {
    pub async fn add_slot(&self, slot: &Slot) -> Result<()> {
        let db = self.db().lock().await;
        let position: i64 = db.query_row(
            "SELECT COUNT(*) FROM slots WHERE weekday = ?1",
            params![slot.weekday.as_str()],
            |row| row.get(0),
        )?;
        db.execute(
            "INSERT INTO slots (weekday, position, hour, minute, label, description, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                slot.weekday.as_str(),
                position,
                slot.hour,
                slot.minute,
                slot.label,
                slot.description,
                slot.enabled as i64,
            ],
        )?;
        info!(
            weekday = slot.weekday.as_str(),
            label = %slot.label,
            "slot added"
        );
        Ok(())
    }

    /// Apply a partial update to the slot at `position` (0-based) within
    /// the weekday's ordered list.
    pub async fn update_slot(
        &self,
        weekday: Weekday,
        position: usize,
        update: &SlotUpdate,
    ) -> Result<()> {
        let db = self.db().lock().await;
        let current = db
            .query_row(
                "SELECT hour, minute, label, description, enabled FROM slots
                 WHERE weekday = ?1 AND position = ?2",
                params![weekday.as_str(), position as i64],
                |row| {
                    Ok((
                        row.get::<_, u8>(0)?,
                        row.get::<_, u8>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)? != 0,
                    ))
                },
            )
            .optional()?;
        let Some((hour, minute, label, description, enabled)) = current else {
            bail!("no slot at {} position {position}", weekday.as_str());
        };

        db.execute(
            "UPDATE slots SET hour = ?1, minute = ?2, label = ?3, description = ?4, enabled = ?5
             WHERE weekday = ?6 AND position = ?7",
            params![
                update.hour.unwrap_or(hour),
                update.minute.unwrap_or(minute),
                update.label.clone().unwrap_or(label),
                update.description.clone().unwrap_or(description),
                update.enabled.unwrap_or(enabled) as i64,
                weekday.as_str(),
                position as i64,
            ],
        )?;
        info!(weekday = weekday.as_str(), position, "slot updated");
        Ok(())
    }

    pub async fn remove_slot(&self, weekday: Weekday, position: usize) -> Result<()> {
        let db = self.db().lock().await;
        let removed = db.execute(
            "DELETE FROM slots WHERE weekday = ?1 AND position = ?2",
            params![weekday.as_str(), position as i64],
        )?;
        if removed == 0 {
            bail!("no slot at {} position {position}", weekday.as_str());
        }
        // Close the gap so positions stay contiguous.
        db.execute(
            "UPDATE slots SET position = position - 1
             WHERE weekday = ?1 AND position > ?2",
            params![weekday.as_str(), position as i64],
        )?;
        info!(weekday = weekday.as_str(), position, "slot removed");
        Ok(())
    }

    pub async fn list_slots(&self, weekday: Weekday) -> Result<Vec<Slot>> {
        let db = self.db().lock().await;
        let mut stmt = db.prepare(
            "SELECT weekday, hour, minute, label, description, enabled
             FROM slots WHERE weekday = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![weekday.as_str()], row_to_slot)?;
        collect(rows)
    }

    pub async fn list_all_slots(&self) -> Result<Vec<Slot>> {
        let db = self.db().lock().await;
        let mut stmt = db.prepare(
            "SELECT weekday, hour, minute, label, description, enabled
             FROM slots ORDER BY weekday, position",
        )?;
        let rows = stmt.query_map([], row_to_slot)?;
        collect(rows)
    }
}

fn row_to_slot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Slot> {
    let weekday_name: String = row.get(0)?;
    Ok(Slot {
        weekday: Weekday::from_name(&weekday_name).unwrap_or(Weekday::Monday),
        hour: row.get(1)?,
        minute: row.get(2)?,
        label: row.get(3)?,
        description: row.get(4)?,
        enabled: row.get::<_, i64>(5)? != 0,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<Slot>>,
) -> Result<Vec<Slot>> {
    let mut slots = Vec::new();
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(weekday: Weekday, hour: u8, label: &str) -> Slot {
        Slot {
            weekday,
            hour,
            minute: 0,
            label: label.to_string(),
            description: String::new(),
            enabled: true,
        }
    }

    async fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("pipeline.db")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn slots_keep_insertion_order() {
        let (_dir, storage) = temp_storage().await;
        storage.add_slot(&slot(Weekday::Monday, 9, "site_report")).await.unwrap();
        storage.add_slot(&slot(Weekday::Monday, 18, "weekly_review")).await.unwrap();

        let slots = storage.list_slots(Weekday::Monday).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].label, "site_report");
        assert_eq!(slots[1].label, "weekly_review");
    }

    #[tokio::test]
    async fn update_applies_only_given_fields() {
        let (_dir, storage) = temp_storage().await;
        storage.add_slot(&slot(Weekday::Tuesday, 10, "faq")).await.unwrap();

        storage
            .update_slot(
                Weekday::Tuesday,
                0,
                &SlotUpdate {
                    hour: Some(11),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let slots = storage.list_slots(Weekday::Tuesday).await.unwrap();
        assert_eq!(slots[0].hour, 11);
        assert_eq!(slots[0].minute, 0);
        assert_eq!(slots[0].label, "faq");
        assert!(!slots[0].enabled);
    }

    #[tokio::test]
    async fn update_missing_slot_errors() {
        let (_dir, storage) = temp_storage().await;
        assert!(
            storage
                .update_slot(Weekday::Sunday, 3, &SlotUpdate::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn remove_renumbers_remaining_positions() {
        let (_dir, storage) = temp_storage().await;
        storage.add_slot(&slot(Weekday::Friday, 9, "a")).await.unwrap();
        storage.add_slot(&slot(Weekday::Friday, 12, "b")).await.unwrap();
        storage.add_slot(&slot(Weekday::Friday, 15, "c")).await.unwrap();

        storage.remove_slot(Weekday::Friday, 1).await.unwrap();
        let slots = storage.list_slots(Weekday::Friday).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].label, "c");

        // Position 1 is valid again after renumbering.
        storage
            .update_slot(Weekday::Friday, 1, &SlotUpdate { minute: Some(30), ..Default::default() })
            .await
            .unwrap();
    }
}
