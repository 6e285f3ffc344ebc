//! Provider router — selects the concrete adapter for a request.
//!
//! Resolution order: the request's explicit `provider`, else the default
//! derived from its purpose (`dev` → anthropic, everything else → grok).
//! Unknown providers raise; the router never silently falls back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use toolforge_core::error::ProviderError;
use toolforge_core::provider::{LlmProvider, LlmRequest, LlmResponse, Purpose};

use crate::anthropic::AnthropicProvider;
use crate::grok::GrokProvider;

/// The provider a purpose falls back to when the request names none.
pub fn default_provider_for(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Dev => "anthropic",
        _ => "grok",
    }
}

/// Routes requests to registered providers by name.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its name.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Resolve the adapter for a request. Exhaustive: an unresolvable
    /// name is an error, never a fallback.
    pub fn resolve(&self, request: &LlmRequest) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let name = request
            .provider
            .clone()
            .unwrap_or_else(|| default_provider_for(request.purpose).to_string());
        self.providers
            .get(&name)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(name))
    }

    /// List registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// The router itself satisfies the provider interface, so the scheduler
/// can hold either a concrete adapter or the full routing table.
#[async_trait]
impl LlmProvider for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let provider = self.resolve(request)?;
        provider.chat(request).await
    }
}

/// Build a router with both adapters from configuration.
pub fn build_from_config(config: &toolforge_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new();

    let mut grok = GrokProvider::new(config.grok.api_key.clone().unwrap_or_default())
        .with_default_model(&config.grok.model);
    if let Some(url) = &config.grok.base_url {
        grok = grok.with_base_url(url);
    }
    router.register(Arc::new(grok));

    let anthropic = AnthropicProvider::new(config.anthropic.api_key.clone().unwrap_or_default())
        .with_default_model(&config.anthropic.model);
    router.register(Arc::new(anthropic));

    router
}
