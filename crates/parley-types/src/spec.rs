//! Model specifications: named, administrator-defined bundles that resolve to
//! a concrete provider, model and default parameters.

use serde::{Deserialize, Serialize};

use crate::llm::{ProviderType, SamplingParams};

/// A named provider/model/parameter bundle.
///
/// Loaded from `[[specs]]` tables in `config.toml`. Read-only at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub provider: ProviderType,
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub sampling: SamplingParams,
    /// When set, request-level sampling overrides are ignored.
    #[serde(default)]
    pub enforce: bool,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
}
