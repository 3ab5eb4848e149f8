//! LLM provider implementations.
//!
//! Concrete implementations of the [`LlmProvider`](parley_core::llm::provider::LlmProvider)
//! trait defined in `parley-core`, plus the factory ([`create_provider`]) that
//! builds one from a [`ProviderConfig`] and the startup helper
//! ([`build_registry`]) that assembles the [`ProviderRegistry`].

pub mod anthropic;
pub mod openai_compat;

use secrecy::SecretString;
use tracing::{info, warn};

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_core::llm::registry::ProviderRegistry;
use parley_types::config::ProviderConfig;
use parley_types::llm::{LlmError, ProviderType};

use self::anthropic::AnthropicProvider;
use self::openai_compat::config::{self as oai_config, OpenAiCompatConfig};
use self::openai_compat::OpenAiCompatibleProvider;

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// `api_key` is the resolved secret value; every provider type requires one.
pub fn create_provider(config: &ProviderConfig, api_key: Option<&str>) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
        LlmError::AuthenticationFailed(format!("{} is not set", config.api_key_env))
    })?;
    let secret = SecretString::from(key.to_string());

    match config.provider_type {
        ProviderType::Anthropic => {
            let mut provider =
                AnthropicProvider::new(secret)?.with_default_model(config.default_model.clone());
            if let Some(base_url) = config.base_url.as_deref() {
                provider = provider.with_base_url(base_url);
            }
            Ok(BoxLlmProvider::new(provider))
        }
        ProviderType::OpenAi => {
            let preset_name = config.preset.as_deref().unwrap_or(oai_config::OPENAI.name);
            let mut oai = match (oai_config::preset(preset_name), config.base_url.as_deref()) {
                (Some(preset), _) => OpenAiCompatConfig::from_preset(preset, secret),
                (None, Some(_)) => OpenAiCompatConfig {
                    provider_name: preset_name.to_string(),
                    base_url: String::new(),
                    api_key: secret,
                    default_model: None,
                },
                (None, None) => {
                    return Err(LlmError::InvalidRequest(format!(
                        "unknown preset '{preset_name}' and no base_url"
                    )));
                }
            };
            if let Some(base_url) = config.base_url.as_deref() {
                oai = oai.with_base_url(base_url);
            }
            let oai = oai.with_default_model(config.default_model.clone());
            Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(oai)))
        }
    }
}

/// Build the provider registry, reading API keys from the environment.
pub fn build_registry(configs: &[ProviderConfig]) -> ProviderRegistry {
    build_registry_with(configs, |name| std::env::var(name).ok())
}

/// Build the provider registry with a custom key lookup.
///
/// Providers that fail to construct are logged and skipped. A later entry of
/// the same type replaces an earlier one.
pub fn build_registry_with(
    configs: &[ProviderConfig],
    lookup: impl Fn(&str) -> Option<String>,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    for config in configs {
        let key = lookup(&config.api_key_env);
        match create_provider(config, key.as_deref()) {
            Ok(provider) => {
                let name = provider.name().to_string();
                if registry.register(provider).is_some() {
                    warn!(
                        provider_type = %config.provider_type,
                        provider = %name,
                        "duplicate provider type, replacing earlier entry"
                    );
                } else {
                    info!(provider_type = %config.provider_type, provider = %name, "provider registered");
                }
            }
            Err(e) => warn!(
                provider_type = %config.provider_type,
                error = %e,
                "skipping provider"
            ),
        }
    }

    registry
}
