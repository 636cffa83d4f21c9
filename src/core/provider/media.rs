//! Media descriptions sourced from the content provider itself. The
//! upstream models here take media by reference (URL or stored path), so a
//! caption request is just another completion call.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use super::{ChannelRotator, CompletionRequest, ContentProvider, MediaDescriber};

const CAPTION_SYSTEM: &str = "You describe photos from construction and survey \
sites in one or two factual sentences for use inside a social media post.";

pub struct ProviderMediaDescriber {
    provider: Arc<dyn ContentProvider>,
    rotator: Arc<ChannelRotator>,
}

impl ProviderMediaDescriber {
    pub fn new(provider: Arc<dyn ContentProvider>, rotator: Arc<ChannelRotator>) -> Self {
        Self { provider, rotator }
    }
}

#[async_trait]
impl MediaDescriber for ProviderMediaDescriber {
    async fn describe(&self, media_ref: &str) -> Result<String> {
        let request = CompletionRequest {
            system: CAPTION_SYSTEM.to_string(),
            user: format!("Describe the attached photo: {media_ref}"),
            max_output_tokens: 200,
            deterministic: true,
        };
        match self.provider.complete(&request, &self.rotator.current()).await {
            Ok(description) => Ok(description),
            Err(e) => {
                warn!(media_ref, error = %e, "media description failed, using caption");
                Ok(format!("Photo from the work site ({media_ref})"))
            }
        }
    }
}
