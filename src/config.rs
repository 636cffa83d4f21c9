use anyhow::{Result, bail};
use serde_derive::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_prompts_path")]
    pub prompts_path: PathBuf,

    pub provider: ProviderSettings,

    /// Publication channels, tried in order on every publish.
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,

    /// Feed recent completed posts back into new generations as tone
    /// context.
    #[serde(default)]
    pub history_context: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    pub model: String,

    /// Credentials in rotation order.
    pub api_keys: Vec<String>,

    /// Egress proxy URLs in rotation order. Empty means every attempt
    /// goes direct.
    #[serde(default)]
    pub routes: Vec<String>,

    #[serde(default = "default_direct_timeout")]
    pub direct_timeout_secs: u64,

    #[serde(default = "default_routed_timeout")]
    pub routed_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    pub name: String,
    pub url: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/postmill.db")
}
fn default_prompts_path() -> PathBuf {
    PathBuf::from("prompts.toml")
}
fn default_direct_timeout() -> u64 {
    60
}
fn default_routed_timeout() -> u64 {
    180
}

impl Settings {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let settings: Settings = toml::from_str(&content)?;

        if settings.provider.api_keys.is_empty() {
            bail!("settings: provider.api_keys must contain at least one key");
        }
        if settings.provider.api_keys.iter().any(|k| k.trim().is_empty()) {
            bail!("settings: provider.api_keys contains an empty key");
        }

        info!(
            path = %path.display(),
            keys = settings.provider.api_keys.len(),
            routes = settings.provider.routes.len(),
            channels = settings.channels.len(),
            "settings loaded"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[provider]
base_url = "https://api.example.com/v1"
model = "gpt-4o-mini"
api_keys = ["k1", "k2"]
"#;

    #[tokio::test]
    async fn minimal_settings_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postmill.toml");
        tokio::fs::write(&path, MINIMAL).await.unwrap();

        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings.db_path, PathBuf::from("data/postmill.db"));
        assert_eq!(settings.provider.direct_timeout_secs, 60);
        assert_eq!(settings.provider.routed_timeout_secs, 180);
        assert!(settings.provider.routes.is_empty());
        assert!(settings.channels.is_empty());
        assert!(!settings.history_context);
    }

    #[tokio::test]
    async fn full_settings_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postmill.toml");
        tokio::fs::write(
            &path,
            r#"
db_path = "/var/lib/postmill/posts.db"
prompts_path = "/etc/postmill/prompts.toml"
history_context = true

[provider]
base_url = "https://api.example.com/v1"
model = "gpt-4o"
api_keys = ["k1"]
routes = ["http://proxy-a:3128", "http://proxy-b:3128"]
direct_timeout_secs = 30
routed_timeout_secs = 120

[[channels]]
name = "main"
url = "https://hooks.example.com/post"

[[channels]]
name = "backup"
url = "https://hooks.example.com/backup"
"#,
        )
        .await
        .unwrap();

        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings.provider.routes.len(), 2);
        assert_eq!(settings.provider.routed_timeout_secs, 120);
        assert_eq!(settings.channels[1].name, "backup");
        assert!(settings.history_context);
    }

    #[tokio::test]
    async fn empty_api_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postmill.toml");
        tokio::fs::write(
            &path,
            r#"
[provider]
base_url = "https://api.example.com/v1"
model = "m"
api_keys = []
"#,
        )
        .await
        .unwrap();
        assert!(Settings::load(&path).await.is_err());
    }
}
