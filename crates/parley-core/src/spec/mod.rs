//! Model resolution: turn a request's spec name or provider/model pair into a
//! concrete provider, model and parameter bundle.

use std::collections::HashMap;

use parley_types::error::ChatError;
use parley_types::llm::{ProviderType, SamplingParams};
use parley_types::request::AskRequest;
use parley_types::spec::ModelSpec;

use crate::llm::registry::ProviderRegistry;

/// Named model specifications, loaded once from configuration.
#[derive(Debug, Default)]
pub struct ModelSpecRegistry {
    specs: HashMap<String, ModelSpec>,
}

impl ModelSpecRegistry {
    pub fn new(specs: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.specs.get(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// The concrete target of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub provider: ProviderType,
    pub model: String,
    pub system_prompt: Option<String>,
    pub sampling: SamplingParams,
    pub spec_name: Option<String>,
    pub icon_url: Option<String>,
    pub greeting: Option<String>,
}

/// Resolve the model for a request.
///
/// A spec name wins over a direct model. A spec marked `enforce` ignores the
/// request's sampling overrides and prompt prefix. A direct model needs an
/// `endpoint` unless exactly one provider is configured.
pub fn resolve_model(
    request: &AskRequest,
    specs: &ModelSpecRegistry,
    providers: &ProviderRegistry,
) -> Result<ResolvedModel, ChatError> {
    let overrides = request.sampling_overrides();

    let resolved = if let Some(name) = request.spec.as_deref().filter(|s| !s.is_empty()) {
        let spec = specs
            .get(name)
            .ok_or_else(|| ChatError::Validation(format!("unknown model spec '{name}'")))?;
        let (sampling, system_prompt) = if spec.enforce {
            (spec.sampling.clone(), spec.system_prompt.clone())
        } else {
            (
                spec.sampling.merged_with(&overrides),
                request
                    .prompt_prefix
                    .clone()
                    .or_else(|| spec.system_prompt.clone()),
            )
        };
        ResolvedModel {
            provider: spec.provider,
            model: spec.model.clone(),
            system_prompt,
            sampling,
            spec_name: Some(spec.name.clone()),
            icon_url: spec.icon_url.clone(),
            greeting: spec.greeting.clone(),
        }
    } else if let Some(model) = request.model.as_deref().filter(|m| !m.is_empty()) {
        let provider = match request.endpoint {
            Some(provider) => provider,
            None => match providers.types().as_slice() {
                [only] => *only,
                _ => {
                    return Err(ChatError::Validation(
                        "endpoint is required when more than one provider is configured"
                            .to_string(),
                    ));
                }
            },
        };
        ResolvedModel {
            provider,
            model: model.to_string(),
            system_prompt: request.prompt_prefix.clone(),
            sampling: overrides,
            spec_name: None,
            icon_url: None,
            greeting: None,
        }
    } else {
        return Err(ChatError::Validation(
            "either a model or a spec is required".to_string(),
        ));
    };

    if !providers.contains(resolved.provider) {
        return Err(ChatError::Validation(format!(
            "provider '{}' is not configured",
            resolved.provider
        )));
    }

    Ok(resolved)
}
