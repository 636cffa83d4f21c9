use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::prompts::PromptLibrary;
use crate::core::provider::{
    ChannelRotator, CompletionRequest, ContentProvider, ProviderChannel, ProviderError,
};
use crate::store::Storage;
use crate::store::types::{RecordKind, RecordStatus};

const MAX_ROUTE_ROTATIONS: usize = 5;
const MAX_CREDENTIAL_ROTATIONS: usize = 2;
const MAX_OUTPUT_TOKENS: u32 = 2000;

/// One request for fresh post text.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Selects the system instruction from the prompt library.
    pub template_key: String,
    pub prompt: String,
    pub media_description: Option<String>,
    pub context: Option<String>,
}

/// Turns prompts into finished text via the external provider, with
/// channel failover. `generate` never fails: scheduled runs must not leave
/// a weekday silently unfilled, so exhausted failover ends in synthesized
/// fallback text instead of an error.
pub struct GenerationOrchestrator {
    provider: Arc<dyn ContentProvider>,
    rotator: Arc<ChannelRotator>,
    prompts: Arc<PromptLibrary>,
    storage: Arc<Storage>,
    /// Per-attempt bound without an egress route.
    direct_timeout: Duration,
    /// Per-attempt bound through a route; longer to absorb the extra hops.
    routed_timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        rotator: Arc<ChannelRotator>,
        prompts: Arc<PromptLibrary>,
        storage: Arc<Storage>,
    ) -> Self {
        Self {
            provider,
            rotator,
            prompts,
            storage,
            direct_timeout: Duration::from_secs(60),
            routed_timeout: Duration::from_secs(180),
        }
    }

    pub fn with_timeouts(mut self, direct: Duration, routed: Duration) -> Self {
        self.direct_timeout = direct;
        self.routed_timeout = routed;
        self
    }

    /// Generate post text. Always returns text; every failure path ends in
    /// `synthesize_fallback`.
    pub async fn generate(&self, request: &GenerateRequest) -> String {
        let system = self.prompts.for_label(&request.template_key).system.clone();
        let user = compose_user_content(request);

        let record_id = Uuid::new_v4().to_string();
        if let Err(e) = self
            .storage
            .add_generation_record(&record_id, RecordKind::Generate, &request.prompt, None)
            .await
        {
            warn!(error = %e, "failed to record generation request");
        }

        let completion = CompletionRequest {
            system,
            user,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            deterministic: false,
        };

        match self.run_with_failover(&completion).await {
            Ok(text) => {
                let cleaned = clean_response(&text);
                let _ = self
                    .storage
                    .finish_generation_record(
                        &record_id,
                        RecordStatus::Completed,
                        Some(&cleaned),
                        None,
                    )
                    .await;
                info!(len = cleaned.len(), "generation completed");
                cleaned
            }
            Err(e) => {
                error!(error = %e, "generation exhausted all channels, synthesizing fallback");
                let fallback = synthesize_fallback(
                    request.context.as_deref(),
                    request.media_description.as_deref(),
                );
                let _ = self
                    .storage
                    .finish_generation_record(
                        &record_id,
                        RecordStatus::Failed,
                        Some(&fallback),
                        Some(&e.to_string()),
                    )
                    .await;
                fallback
            }
        }
    }

    /// Same failover ladder, but surfaces the final error instead of
    /// substituting fallback text. Used for edits, where silently swapping
    /// in unrelated content would corrupt an already-reviewed draft.
    pub async fn generate_strict(
        &self,
        system: &str,
        user: &str,
        deterministic: bool,
        kind: RecordKind,
    ) -> Result<String, ProviderError> {
        let record_id = Uuid::new_v4().to_string();
        if let Err(e) = self
            .storage
            .add_generation_record(&record_id, kind, user, None)
            .await
        {
            warn!(error = %e, "failed to record generation request");
        }

        let completion = CompletionRequest {
            system: system.to_string(),
            user: user.to_string(),
            max_output_tokens: MAX_OUTPUT_TOKENS,
            deterministic,
        };

        match self.run_with_failover(&completion).await {
            Ok(text) => {
                let cleaned = clean_response(&text);
                let _ = self
                    .storage
                    .finish_generation_record(
                        &record_id,
                        RecordStatus::Completed,
                        Some(&cleaned),
                        None,
                    )
                    .await;
                Ok(cleaned)
            }
            Err(e) => {
                let _ = self
                    .storage
                    .finish_generation_record(
                        &record_id,
                        RecordStatus::Failed,
                        None,
                        Some(&e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// The failover ladder: current channel, then route rotations, then
    /// credential rotations (which shift the route too), then one direct
    /// attempt without any egress route. Rotation state is shared and
    /// sticky, so recovery from a degraded channel carries over to later
    /// calls.
    async fn run_with_failover(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let mut last_err = match self.attempt(request, &self.rotator.current()).await {
            Ok(text) => return Ok(text),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        let route_budget = MAX_ROUTE_ROTATIONS.min(self.rotator.route_count());
        for attempt_no in 1..=route_budget {
            if !self.rotator.rotate_route() {
                break;
            }
            info!(attempt = attempt_no, budget = route_budget, "retrying on next egress route");
            match self.attempt(request, &self.rotator.current()).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_err = e,
            }
        }

        let credential_budget = MAX_CREDENTIAL_ROTATIONS.min(self.rotator.credential_count());
        for attempt_no in 1..=credential_budget {
            if !self.rotator.rotate_credential() {
                break;
            }
            info!(
                attempt = attempt_no,
                budget = credential_budget,
                "retrying on next credential"
            );
            match self.attempt(request, &self.rotator.current()).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_err = e,
            }
        }

        info!("all rotations exhausted, final direct attempt");
        match self.attempt(request, &self.rotator.direct()).await {
            Ok(text) => Ok(text),
            Err(e) if !e.is_transient() => Err(e),
            Err(_) => Err(last_err),
        }
    }

    async fn attempt(
        &self,
        request: &CompletionRequest,
        channel: &ProviderChannel,
    ) -> Result<String, ProviderError> {
        let bound = if channel.is_routed() {
            self.routed_timeout
        } else {
            self.direct_timeout
        };
        match tokio::time::timeout(bound, self.provider.complete(request, channel)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(bound.as_secs())),
        }
    }
}

fn compose_user_content(request: &GenerateRequest) -> String {
    let mut user = request.prompt.clone();
    if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
        user.push_str("\n\nContext:\n");
        user.push_str(context);
    }
    if let Some(media) = request
        .media_description
        .as_deref()
        .filter(|m| !m.trim().is_empty())
    {
        user.push_str("\n\nMedia description:\n");
        user.push_str(media);
    }
    user
}

fn bold_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap())
}

const META_PREFIXES: &[&str] = &[
    "note:",
    "let me know",
    "i hope this",
    "feel free to",
    "here is",
    "here's",
    "---",
];

/// Strip provider chatter and normalize lightweight markup to the target
/// rich-text form.
pub fn clean_response(text: &str) -> String {
    let mut body = text.trim();

    // Unwrap a single fenced block if the whole reply is inside one.
    if body.starts_with("```") {
        body = body.trim_start_matches("```").trim_start_matches(|c| c != '\n');
        body = body.trim_end().trim_end_matches("```");
    }

    let mut lines: Vec<&str> = body.lines().collect();

    // Leading "Here is your post:" style framing.
    if let Some(first) = lines.first() {
        let lower = first.trim().to_lowercase();
        if (lower.starts_with("here is") || lower.starts_with("here's")) && lower.ends_with(':') {
            lines.remove(0);
        }
    }

    // Trailing meta-commentary.
    while let Some(last) = lines.last() {
        let lower = last.trim().to_lowercase();
        if lower.is_empty() || META_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            lines.pop();
        } else {
            break;
        }
    }

    let joined = lines.join("\n");
    let no_headings: String = joined
        .lines()
        .map(|line| line.trim_start_matches('#').trim_start())
        .collect::<Vec<_>>()
        .join("\n");

    bold_pattern()
        .replace_all(&no_headings, "<b>$1</b>")
        .trim()
        .to_string()
}

/// Deterministic placeholder used when generation is unavailable. Mirrors
/// the structure of real output but always carries an explicit disclaimer
/// sentence, and is never empty.
pub fn synthesize_fallback(context: Option<&str>, media_description: Option<&str>) -> String {
    let mut text = String::from("Status update from the team.\n\n");

    if let Some(media) = media_description.filter(|m| !m.trim().is_empty()) {
        text.push_str("Site photos are attached: ");
        text.push_str(&truncate_chars(media.trim(), 200));
        text.push_str("\n\n");
    } else if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        text.push_str(&truncate_chars(context.trim(), 300));
        text.push_str("\n\n");
    }

    text.push_str(
        "Our specialists continue to deliver on every active project, on schedule and to \
standard.\n\nNote: automated drafting was unavailable for this post, so this is a short \
placeholder. Contact the team for a full update.",
    );
    text
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
