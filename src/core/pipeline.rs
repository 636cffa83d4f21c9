use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::approval::{ApprovalFlow, Draft};
use crate::core::orchestrator::{GenerateRequest, GenerationOrchestrator};
use crate::core::prompts::PromptLibrary;
use crate::core::provider::MediaDescriber;
use crate::core::refine::RefinementEngine;
use crate::store::Storage;
use crate::store::types::{RecordKind, RecordStatus, Slot, Weekday};

/// A distribution channel for approved posts. Implementations own the
/// transport; the pipeline only sees per-channel success or failure.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a channel-specific id for the published post.
    async fn publish(&self, text: &str, media: &[String]) -> Result<String>;
}

/// Receives drafts awaiting operator action. Implemented by the
/// conversation-session collaborator, which owns in-flight drafts.
#[async_trait]
pub trait ReviewSink: Send + Sync {
    async fn offer(&self, flow: ApprovalFlow);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: String,
    pub result: Result<String, String>,
}

/// Per-channel publication results. One channel failing does not hide
/// another channel's success.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublicationReport {
    pub outcomes: Vec<ChannelOutcome>,
}

#[derive(Debug, Error)]
#[error("publication failed on channels: {channels:?}")]
pub struct PublicationPartialFailure {
    pub channels: Vec<String>,
}

impl PublicationReport {
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.channel.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.channel.as_str())
            .collect()
    }

    pub fn as_error(&self) -> Option<PublicationPartialFailure> {
        let channels: Vec<String> = self.failed().iter().map(|s| s.to_string()).collect();
        if channels.is_empty() {
            None
        } else {
            Some(PublicationPartialFailure { channels })
        }
    }
}

/// Publish to every channel, collecting per-channel outcomes. Failures
/// are reported, never aggregated into a single error.
pub async fn publish_all(
    publishers: &[Arc<dyn Publisher>],
    text: &str,
    media: &[String],
) -> PublicationReport {
    let mut report = PublicationReport::default();
    for publisher in publishers {
        let outcome = match publisher.publish(text, media).await {
            Ok(id) => {
                info!(channel = publisher.name(), id, "post published");
                Ok(id)
            }
            Err(e) => {
                error!(channel = publisher.name(), error = %e, "publication failed");
                Err(e.to_string())
            }
        };
        report.outcomes.push(ChannelOutcome {
            channel: publisher.name().to_string(),
            result: outcome,
        });
    }
    report
}

/// Generic JSON-POST publication channel, so deployments can bridge to
/// any network without this core knowing its API.
pub struct WebhookPublisher {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookPublisher {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, text: &str, media: &[String]) -> Result<String> {
        let res = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text, "media": media }))
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("{} returned HTTP {}", self.name, status);
        }
        Ok(res.text().await.unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// A pre-approved post existed for the weekday and was published.
    Flushed(PublicationReport),
    /// A fresh draft was generated and handed to review.
    Drafted,
}

/// Wires the orchestrator, refinement engine, stores, and publication
/// channels into the slot-driven control flow.
pub struct PostPipeline {
    orchestrator: Arc<GenerationOrchestrator>,
    refiner: Arc<RefinementEngine>,
    prompts: Arc<PromptLibrary>,
    storage: Arc<Storage>,
    publishers: Arc<Vec<Arc<dyn Publisher>>>,
    review_sink: Arc<dyn ReviewSink>,
    media_describer: Option<Arc<dyn MediaDescriber>>,
    use_history_context: bool,
}

impl PostPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: Arc<GenerationOrchestrator>,
        refiner: Arc<RefinementEngine>,
        prompts: Arc<PromptLibrary>,
        storage: Arc<Storage>,
        publishers: Vec<Arc<dyn Publisher>>,
        review_sink: Arc<dyn ReviewSink>,
        media_describer: Option<Arc<dyn MediaDescriber>>,
        use_history_context: bool,
    ) -> Self {
        Self {
            orchestrator,
            refiner,
            prompts,
            storage,
            publishers: Arc::new(publishers),
            review_sink,
            media_describer,
            use_history_context,
        }
    }

    /// The slot-fire entry point: flush the weekday's pre-approved post if
    /// one is parked, otherwise generate a fresh draft for review. The
    /// flush path bypasses the approval machine entirely; that content was
    /// already approved.
    pub async fn produce_or_flush(&self, weekday: Weekday, slot: &Slot) -> Result<ProduceOutcome> {
        if let Some(post) = self.storage.get_scheduled_post(weekday).await? {
            info!(weekday = weekday.as_str(), "publishing pre-approved scheduled post");
            let record_id = Uuid::new_v4().to_string();
            let _ = self
                .storage
                .add_generation_record(&record_id, RecordKind::PublishNow, &post.text, None)
                .await;

            let report = publish_all(&self.publishers, &post.text, &post.media).await;
            self.storage.remove_scheduled_post(weekday).await?;

            let (status, error) = match report.as_error() {
                None => (RecordStatus::Completed, None),
                Some(e) => (RecordStatus::Failed, Some(e.to_string())),
            };
            let _ = self
                .storage
                .finish_generation_record(&record_id, status, Some(&post.text), error.as_deref())
                .await;
            return Ok(ProduceOutcome::Flushed(report));
        }

        info!(
            weekday = weekday.as_str(),
            label = %slot.label,
            "no scheduled post, generating fresh draft"
        );
        let template = self.prompts.for_label(&slot.label);
        let mut prompt = template.user.clone();
        if !slot.description.trim().is_empty() {
            prompt.push_str("\n\nSlot focus: ");
            prompt.push_str(slot.description.trim());
        }

        let context = if self.use_history_context {
            let recent = self.storage.recent_completed_results(3).await?;
            if recent.is_empty() {
                None
            } else {
                Some(format!("Recent posts for tone reference:\n{}", recent.join("\n---\n")))
            }
        } else {
            None
        };

        let text = self
            .orchestrator
            .generate(&GenerateRequest {
                template_key: slot.label.clone(),
                prompt,
                media_description: None,
                context,
            })
            .await;

        let mut flow = ApprovalFlow::new(
            Draft {
                text,
                media: Vec::new(),
                target: Some(weekday),
            },
            self.refiner.clone(),
            self.storage.clone(),
            self.publishers.clone(),
        );
        flow.submit().map_err(|e| anyhow::anyhow!(e.to_string()))?;
        self.review_sink.offer(flow).await;
        Ok(ProduceOutcome::Drafted)
    }

    /// Operator-initiated draft with optional attached media: each media
    /// reference is described through the media provider and the combined
    /// description feeds the prompt.
    pub async fn draft_from_prompt(
        &self,
        template_key: &str,
        prompt: &str,
        media: Vec<String>,
        target: Option<Weekday>,
    ) -> Result<()> {
        let media_description = match (&self.media_describer, media.is_empty()) {
            (Some(describer), false) => {
                let mut descriptions = Vec::new();
                for media_ref in &media {
                    match describer.describe(media_ref).await {
                        Ok(d) => descriptions.push(d),
                        Err(e) => {
                            warn!(media_ref, error = %e, "media description failed");
                            descriptions.push(format!("Attached photo: {media_ref}"));
                        }
                    }
                }
                Some(descriptions.join("\n"))
            }
            _ => None,
        };

        let text = self
            .orchestrator
            .generate(&GenerateRequest {
                template_key: template_key.to_string(),
                prompt: prompt.to_string(),
                media_description,
                context: None,
            })
            .await;

        let mut flow = ApprovalFlow::new(
            Draft { text, media, target },
            self.refiner.clone(),
            self.storage.clone(),
            self.publishers.clone(),
        );
        flow.submit().map_err(|e| anyhow::anyhow!(e.to_string()))?;
        self.review_sink.offer(flow).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::{
        ChannelRotator, CompletionRequest, ContentProvider, ProviderChannel, ProviderError,
    };
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct EchoProvider;

    #[async_trait]
    impl ContentProvider for EchoProvider {
        async fn complete(
            &self,
            request: &CompletionRequest,
            _channel: &ProviderChannel,
        ) -> Result<String, ProviderError> {
            Ok(format!("draft for: {}", request.user.lines().next().unwrap_or("")))
        }
    }

    struct CollectingSink {
        flows: AsyncMutex<Vec<ApprovalFlow>>,
    }

    #[async_trait]
    impl ReviewSink for CollectingSink {
        async fn offer(&self, flow: ApprovalFlow) {
            self.flows.lock().await.push(flow);
        }
    }

    struct OkPublisher {
        published: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Publisher for OkPublisher {
        fn name(&self) -> &str {
            "stub"
        }

        async fn publish(&self, text: &str, _media: &[String]) -> Result<String> {
            self.published.lock().unwrap().push(text.to_string());
            Ok("id".to_string())
        }
    }

    struct StubDescriber;

    #[async_trait]
    impl MediaDescriber for StubDescriber {
        async fn describe(&self, media_ref: &str) -> Result<String> {
            Ok(format!("photo of {media_ref}"))
        }
    }

    fn slot(weekday: Weekday) -> Slot {
        Slot {
            weekday,
            hour: 9,
            minute: 0,
            label: "site_report".to_string(),
            description: String::new(),
            enabled: true,
        }
    }

    struct Rig {
        _dir: tempfile::TempDir,
        storage: Arc<Storage>,
        sink: Arc<CollectingSink>,
        publisher: Arc<OkPublisher>,
        pipeline: PostPipeline,
    }

    async fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("p.db")).await.unwrap());
        let prompts = Arc::new(PromptLibrary::builtin());
        let rotator = Arc::new(ChannelRotator::new(vec!["k".into()], vec![]));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            Arc::new(EchoProvider),
            rotator,
            prompts.clone(),
            storage.clone(),
        ));
        let refiner = Arc::new(RefinementEngine::new(orchestrator.clone(), prompts.clone()));
        let sink = Arc::new(CollectingSink {
            flows: AsyncMutex::new(vec![]),
        });
        let publisher = Arc::new(OkPublisher {
            published: Mutex::new(vec![]),
        });
        let pipeline = PostPipeline::new(
            orchestrator,
            refiner,
            prompts,
            storage.clone(),
            vec![publisher.clone() as Arc<dyn Publisher>],
            sink.clone(),
            Some(Arc::new(StubDescriber)),
            false,
        );
        Rig {
            _dir: dir,
            storage,
            sink,
            publisher,
            pipeline,
        }
    }

    #[tokio::test]
    async fn fire_without_stored_post_drafts_for_review() {
        let rig = rig().await;
        let outcome = rig
            .pipeline
            .produce_or_flush(Weekday::Monday, &slot(Weekday::Monday))
            .await
            .unwrap();
        assert_eq!(outcome, ProduceOutcome::Drafted);

        let flows = rig.sink.flows.lock().await;
        assert_eq!(flows.len(), 1);
        assert_eq!(
            flows[0].state(),
            crate::core::approval::ReviewState::PendingReview
        );
        assert_eq!(flows[0].draft().target, Some(Weekday::Monday));
        assert!(rig.publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fire_with_stored_post_flushes_and_clears() {
        let rig = rig().await;
        rig.storage
            .put_scheduled_post(Weekday::Monday, "approved text", &[], "op")
            .await
            .unwrap();

        let outcome = rig
            .pipeline
            .produce_or_flush(Weekday::Monday, &slot(Weekday::Monday))
            .await
            .unwrap();
        let ProduceOutcome::Flushed(report) = outcome else {
            panic!("expected flush");
        };
        assert_eq!(report.succeeded(), vec!["stub"]);
        assert_eq!(
            rig.publisher.published.lock().unwrap().as_slice(),
            &["approved text".to_string()]
        );
        assert!(
            rig.storage
                .get_scheduled_post(Weekday::Monday)
                .await
                .unwrap()
                .is_none()
        );
        // No draft was offered for review on the flush path.
        assert!(rig.sink.flows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn draft_from_prompt_feeds_media_descriptions() {
        let rig = rig().await;
        rig.pipeline
            .draft_from_prompt("site_report", "write about the site", vec!["img1.jpg".into()], None)
            .await
            .unwrap();

        let flows = rig.sink.flows.lock().await;
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].draft().media, vec!["img1.jpg".to_string()]);
        assert_eq!(flows[0].draft().target, None);
    }

    #[tokio::test]
    async fn report_distinguishes_channels() {
        struct FailPublisher;
        #[async_trait]
        impl Publisher for FailPublisher {
            fn name(&self) -> &str {
                "down"
            }
            async fn publish(&self, _text: &str, _media: &[String]) -> Result<String> {
                anyhow::bail!("unreachable host")
            }
        }

        let publishers: Vec<Arc<dyn Publisher>> = vec![
            Arc::new(OkPublisher {
                published: Mutex::new(vec![]),
            }),
            Arc::new(FailPublisher),
        ];
        let report = publish_all(&publishers, "text", &[]).await;
        assert_eq!(report.succeeded(), vec!["stub"]);
        assert_eq!(report.failed(), vec!["down"]);
        assert_eq!(
            report.as_error().unwrap().channels,
            vec!["down".to_string()]
        );
    }
}
