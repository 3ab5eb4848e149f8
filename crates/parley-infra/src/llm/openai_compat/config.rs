//! Configuration and presets for OpenAI-compatible providers.
//!
//! Every backend that speaks the Chat Completions protocol is one preset: a
//! name and a base URL. An explicit `base_url` in configuration wins over the
//! preset's.

use secrecy::SecretString;

/// Configuration for an OpenAI-compatible provider.
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g. "openai", "mistral").
    pub provider_name: String,
    /// API base URL including the version path.
    pub base_url: String,
    pub api_key: SecretString,
    /// Model used for background calls that do not name one.
    pub default_model: Option<String>,
}

/// A known OpenAI-compatible backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub base_url: &'static str,
}

pub const OPENAI: Preset = Preset {
    name: "openai",
    base_url: "https://api.openai.com/v1",
};

pub const MISTRAL: Preset = Preset {
    name: "mistral",
    base_url: "https://api.mistral.ai/v1",
};

pub const GEMINI: Preset = Preset {
    name: "gemini",
    base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
};

pub const GROQ: Preset = Preset {
    name: "groq",
    base_url: "https://api.groq.com/openai/v1",
};

const PRESETS: [Preset; 4] = [OPENAI, MISTRAL, GEMINI, GROQ];

/// Look up a preset by name, case-insensitively.
pub fn preset(name: &str) -> Option<Preset> {
    PRESETS
        .iter()
        .copied()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}

impl OpenAiCompatConfig {
    pub fn from_preset(preset: Preset, api_key: SecretString) -> Self {
        Self {
            provider_name: preset.name.to_string(),
            base_url: preset.base_url.to_string(),
            api_key,
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: Option<String>) -> Self {
        self.default_model = model;
        self
    }
}
