pub mod media;
pub mod openai;
pub mod rotation;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub use rotation::{ChannelRotator, ProviderChannel};

/// Failure classes of the content-generation provider. Transient classes
/// trigger channel rotation; fatal classes do not (retrying a malformed
/// response cannot succeed).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider request timed out after {0} seconds")]
    Timeout(u64),
    #[error("provider rate limit hit: {0}")]
    RateLimited(String),
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("provider connection failed: {0}")]
    Connection(String),
    #[error("provider API error: {0}")]
    Api(String),
    #[error("provider returned a malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Auth(_)
                | ProviderError::Connection(_)
        )
    }

    /// Map an HTTP status + body into the taxonomy, mirroring the
    /// signatures the upstream API actually emits.
    pub fn from_status(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        match status {
            401 | 403 => ProviderError::Auth(format!("HTTP {status}: {body}")),
            429 => ProviderError::RateLimited(body.to_string()),
            _ if lower.contains("rate limit") => ProviderError::RateLimited(body.to_string()),
            _ if lower.contains("timeout") || lower.contains("timed out") => {
                ProviderError::Timeout(0)
            }
            _ => ProviderError::Api(format!("HTTP {status}: {body}")),
        }
    }
}

/// One completion call, fully described. `deterministic` requests
/// low-temperature output for surgical edits where creative drift is
/// unwanted.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_output_tokens: u32,
    pub deterministic: bool,
}

/// External content-generation provider, reached through whichever
/// credential/egress pair the rotator currently selects.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        channel: &ProviderChannel,
    ) -> Result<String, ProviderError>;
}

/// Media-description collaborator. Descriptions feed generation prompts;
/// producing them is outside this core.
#[async_trait]
pub trait MediaDescriber: Send + Sync {
    async fn describe(&self, media_ref: &str) -> Result<String>;
}
