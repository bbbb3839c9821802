//! LLM provider implementations.
//!
//! Providers implement the `Provider` port from `agentry-core` and are
//! collected in a [`ProviderRegistry`] keyed by name. The registry is
//! populated at startup from configuration and read-only afterwards.

pub mod ollama;

pub use ollama::OllamaProvider;

use std::collections::HashMap;
use std::sync::Arc;

use agentry_core::provider::Provider;

/// A name-keyed collection of providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its own name. Replaces any existing entry.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// All registered provider names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::error::ProviderError;
    use agentry_core::provider::{ChatRequest, ChatResponse};
    use async_trait::async_trait;

    struct StubProvider {
        name: &'static str,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "stub".into(),
                model: "stub-model".into(),
                usage: None,
                finish_reason: None,
                tool_calls: vec![],
                metadata: serde_json::Map::new(),
            })
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider { name: "stub" }));
        assert!(registry.get("stub").is_some());
        assert!(registry.get("other").is_none());
        assert_eq!(registry.list(), vec!["stub"]);
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider { name: "stub" }));
        registry.register(Arc::new(StubProvider { name: "stub" }));
        assert_eq!(registry.list().len(), 1);
    }
}
