//! Provider registry for runtime provider lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parley_types::llm::ProviderType;

use super::box_provider::BoxLlmProvider;

/// Registry of configured LLM providers, one per [`ProviderType`].
///
/// Built once at startup and shared read-only. Providers are held in `Arc` so
/// background tasks (title generation) can keep one alive past the request.
pub struct ProviderRegistry {
    providers: HashMap<ProviderType, Arc<BoxLlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its own type.
    ///
    /// If a provider of this type already exists, it is replaced and returned.
    pub fn register(&mut self, provider: BoxLlmProvider) -> Option<Arc<BoxLlmProvider>> {
        self.providers
            .insert(provider.provider_type(), Arc::new(provider))
    }

    pub fn get(&self, provider_type: ProviderType) -> Option<Arc<BoxLlmProvider>> {
        self.providers.get(&provider_type).cloned()
    }

    pub fn contains(&self, provider_type: ProviderType) -> bool {
        self.providers.contains_key(&provider_type)
    }

    /// Registered provider types, in a stable order.
    pub fn types(&self) -> Vec<ProviderType> {
        let mut types: Vec<_> = self.providers.keys().copied().collect();
        types.sort_by_key(|t| t.to_string());
        types
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
