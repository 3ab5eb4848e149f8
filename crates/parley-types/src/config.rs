//! Global configuration types for Parley.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! HTTP listener, title generation, configured providers, and model specs.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderType;
use crate::spec::ModelSpec;

/// Top-level configuration.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub title: TitleConfig,

    /// Provider backends available to the orchestrator.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Named model specifications.
    #[serde(default)]
    pub specs: Vec<ModelSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Background title generation and the cache handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Provider used for titles; defaults to the conversation's provider.
    #[serde(default)]
    pub provider: Option<ProviderType>,
    /// Model used for titles; defaults to the conversation's model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Wait between the two cache polls of a title request.
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    120
}

fn default_poll_delay_ms() -> u64 {
    2500
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: None,
            model: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            poll_delay_ms: default_poll_delay_ms(),
        }
    }
}

/// One configured provider backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override of the provider's API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Named OpenAI-compatible preset (`openai`, `mistral`, `gemini`, `groq`).
    #[serde(default)]
    pub preset: Option<String>,
    /// Model for background calls (titles) routed to this provider.
    #[serde(default)]
    pub default_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.server.port, 3080);
        assert!(config.title.enabled);
        assert_eq!(config.title.cache_ttl_secs, 120);
        assert_eq!(config.title.poll_delay_ms, 2500);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.specs.is_empty());
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[server]
port = 8080

[title]
enabled = false
poll_delay_ms = 500

[[providers]]
type = "anthropic"
api_key_env = "ANTHROPIC_API_KEY"
default_model = "claude-sonnet-4-20250514"

[[providers]]
type = "openai"
api_key_env = "MISTRAL_API_KEY"
preset = "mistral"

[[specs]]
name = "fast"
provider = "openai"
model = "mistral-small-latest"
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.title.enabled);
        assert_eq!(config.title.poll_delay_ms, 500);
        assert_eq!(config.title.cache_ttl_secs, 120);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].provider_type, ProviderType::Anthropic);
        assert_eq!(config.providers[1].preset.as_deref(), Some("mistral"));
        assert_eq!(config.specs[0].name, "fast");
    }
}
