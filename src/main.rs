use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use postmill::config::Settings;
use postmill::core::approval::ApprovalFlow;
use postmill::core::orchestrator::GenerationOrchestrator;
use postmill::core::pipeline::{PostPipeline, Publisher, ReviewSink, WebhookPublisher};
use postmill::core::prompts::PromptLibrary;
use postmill::core::provider::media::ProviderMediaDescriber;
use postmill::core::provider::openai::OpenAiProvider;
use postmill::core::provider::{ChannelRotator, MediaDescriber};
use postmill::core::refine::RefinementEngine;
use postmill::logging;
use postmill::scheduler::SlotScheduler;
use postmill::store::Storage;
use postmill::store::types::{Slot, Weekday};

/// Holds drafts awaiting operator action. The operator-facing surface
/// (chat bot, web UI) lives outside this binary and drains this queue.
struct PendingReviewQueue {
    flows: tokio::sync::Mutex<Vec<ApprovalFlow>>,
}

#[async_trait]
impl ReviewSink for PendingReviewQueue {
    async fn offer(&self, flow: ApprovalFlow) {
        info!(
            chars = flow.draft().text.len(),
            target = ?flow.draft().target.map(|w| w.as_str()),
            "draft queued for review"
        );
        self.flows.lock().await.push(flow);
    }
}

/// First-run schedule matching the original operator rotation: one slot
/// per working day, each with its own post kind.
async fn seed_default_slots(storage: &Storage) -> Result<()> {
    if !storage.list_all_slots().await?.is_empty() {
        return Ok(());
    }
    let defaults = [
        (Weekday::Monday, "site_report", "progress on current sites"),
        (Weekday::Tuesday, "expert_article", "land-law topics"),
        (Weekday::Wednesday, "faq", "frequent client questions"),
        (Weekday::Thursday, "weekly_review", "projects of the week"),
        (Weekday::Friday, "services", "services overview"),
    ];
    for (weekday, label, description) in defaults {
        storage
            .add_slot(&Slot {
                weekday,
                hour: 10,
                minute: 0,
                label: label.to_string(),
                description: description.to_string(),
                enabled: true,
            })
            .await?;
    }
    info!("seeded default weekday slots");
    Ok(())
}

async fn run() -> Result<()> {
    let settings_path = std::env::args().nth(1).unwrap_or_else(|| "postmill.toml".to_string());
    let settings = Settings::load(&settings_path).await?;

    let storage = Arc::new(Storage::open(&settings.db_path).await?);
    seed_default_slots(&storage).await?;

    let prompts = Arc::new(PromptLibrary::load(&settings.prompts_path)?);
    let provider = Arc::new(OpenAiProvider::new(
        settings.provider.base_url.clone(),
        settings.provider.model.clone(),
    ));
    let rotator = Arc::new(ChannelRotator::new(
        settings.provider.api_keys.clone(),
        settings.provider.routes.clone(),
    ));

    let orchestrator = Arc::new(
        GenerationOrchestrator::new(
            provider.clone(),
            rotator.clone(),
            prompts.clone(),
            storage.clone(),
        )
        .with_timeouts(
            Duration::from_secs(settings.provider.direct_timeout_secs),
            Duration::from_secs(settings.provider.routed_timeout_secs),
        ),
    );
    let refiner = Arc::new(RefinementEngine::new(orchestrator.clone(), prompts.clone()));

    let publishers: Vec<Arc<dyn Publisher>> = settings
        .channels
        .iter()
        .map(|c| Arc::new(WebhookPublisher::new(c.name.clone(), c.url.clone())) as Arc<dyn Publisher>)
        .collect();
    let describer: Arc<dyn MediaDescriber> =
        Arc::new(ProviderMediaDescriber::new(provider, rotator));
    let review_queue = Arc::new(PendingReviewQueue {
        flows: tokio::sync::Mutex::new(Vec::new()),
    });

    let pipeline = Arc::new(PostPipeline::new(
        orchestrator,
        refiner,
        prompts,
        storage.clone(),
        publishers,
        review_queue,
        Some(describer),
        settings.history_context,
    ));

    let mut slot_scheduler = SlotScheduler::new(pipeline, storage).await?;
    slot_scheduler.start().await?;
    info!("postmill running, waiting for slot timers");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    slot_scheduler.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(e) = run().await {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}
