use async_trait::async_trait;
use reqwest::Client;
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionRequest, ContentProvider, ProviderChannel, ProviderError};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions provider. A fresh client is built
/// per call because the egress route is part of the channel, not of this
/// struct; rotation hands us a different proxy without re-wiring anything.
pub struct OpenAiProvider {
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn build_client(&self, channel: &ProviderChannel) -> Result<Client, ProviderError> {
        let mut builder = Client::builder();
        if let Some(route) = &channel.route {
            let proxy = reqwest::Proxy::all(route)
                .map_err(|e| ProviderError::Connection(format!("bad egress route: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ContentProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        channel: &ProviderChannel,
    ) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatRequestMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: if request.deterministic { 0.1 } else { 0.7 },
            max_tokens: request.max_output_tokens,
        };

        debug!(
            routed = channel.is_routed(),
            prompt_len = request.user.len(),
            "sending completion request"
        );

        let client = self.build_client(channel)?;
        let res = client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", channel.credential))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(0)
                } else if e.is_connect() {
                    ProviderError::Connection(e.to_string())
                } else {
                    ProviderError::Api(e.to_string())
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Malformed("response carried no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert!(matches!(
            ProviderError::from_status(401, "bad key"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "Rate limit reached for model"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(502, "upstream request timed out"),
            ProviderError::Timeout(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "boom"),
            ProviderError::Api(_)
        ));
    }

    #[test]
    fn transient_classes() {
        assert!(ProviderError::Timeout(60).is_transient());
        assert!(ProviderError::RateLimited(String::new()).is_transient());
        assert!(ProviderError::Auth(String::new()).is_transient());
        assert!(ProviderError::Connection(String::new()).is_transient());
        assert!(!ProviderError::Api(String::new()).is_transient());
        assert!(!ProviderError::Malformed(String::new()).is_transient());
    }
}
