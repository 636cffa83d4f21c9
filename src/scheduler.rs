//! Slot-driven timer registration. Each enabled slot becomes one cron job;
//! editing slots takes effect through `reload`, which drops every
//! registered job and re-registers from the store.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use uuid::Uuid;

use crate::core::pipeline::PostPipeline;
use crate::store::Storage;
use crate::store::types::Slot;

pub struct SlotScheduler {
    scheduler: JobScheduler,
    pipeline: Arc<PostPipeline>,
    storage: Arc<Storage>,
    job_ids: Mutex<Vec<Uuid>>,
}

impl SlotScheduler {
    pub async fn new(pipeline: Arc<PostPipeline>, storage: Arc<Storage>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            pipeline,
            storage,
            job_ids: Mutex::new(Vec::new()),
        })
    }

    pub async fn start(&self) -> Result<()> {
        self.reload().await?;
        self.scheduler.start().await?;
        info!("slot scheduler started");
        Ok(())
    }

    /// Rebuild every timer from the slot store. Jobs for slots that were
    /// removed or disabled do not survive a reload.
    pub async fn reload(&self) -> Result<()> {
        let mut job_ids = self.job_ids.lock().await;
        for id in job_ids.drain(..) {
            if let Err(e) = self.scheduler.remove(&id).await {
                error!(job_id = %id, error = %e, "failed to remove slot job");
            }
        }

        let slots = self.storage.list_all_slots().await?;
        for slot in slots {
            if !slot.enabled {
                info!(
                    weekday = slot.weekday.as_str(),
                    label = %slot.label,
                    "slot disabled, not scheduling"
                );
                continue;
            }
            match self.register(&slot).await {
                Ok(id) => job_ids.push(id),
                Err(e) => error!(
                    weekday = slot.weekday.as_str(),
                    error = %e,
                    "failed to register slot job"
                ),
            }
        }
        info!(count = job_ids.len(), "slot timers registered");
        Ok(())
    }

    async fn register(&self, slot: &Slot) -> Result<Uuid> {
        let expression = cron_expression(slot);
        info!(
            weekday = slot.weekday.as_str(),
            label = %slot.label,
            cron = %expression,
            "scheduling slot"
        );

        let pipeline = self.pipeline.clone();
        let weekday = slot.weekday;
        let slot = slot.clone();
        let job = Job::new_async(expression.as_str(), move |_uuid, mut _l| {
            let pipeline = pipeline.clone();
            let slot = slot.clone();
            Box::pin(async move {
                if let Err(e) = pipeline.produce_or_flush(weekday, &slot).await {
                    error!(weekday = weekday.as_str(), error = %e, "slot fire failed");
                }
            })
        })?;
        let id = self.scheduler.add(job).await?;
        Ok(id)
    }

    /// Number of currently registered slot timers.
    pub async fn job_count(&self) -> usize {
        self.job_ids.lock().await.len()
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        Ok(())
    }
}

fn cron_expression(slot: &Slot) -> String {
    format!(
        "0 {} {} * * {}",
        slot.minute,
        slot.hour,
        slot.weekday.cron_token()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Weekday;

    fn slot(weekday: Weekday, hour: u8, minute: u8) -> Slot {
        Slot {
            weekday,
            hour,
            minute,
            label: "site_report".to_string(),
            description: String::new(),
            enabled: true,
        }
    }

    #[test]
    fn cron_expression_fires_weekly_at_slot_time() {
        assert_eq!(
            cron_expression(&slot(Weekday::Monday, 9, 30)),
            "0 30 9 * * MON"
        );
        assert_eq!(
            cron_expression(&slot(Weekday::Sunday, 0, 0)),
            "0 0 0 * * SUN"
        );
    }
}
