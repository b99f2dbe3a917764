//! Provider registry.
//!
//! Constructs and holds the configured LLM provider instances. At startup
//! the registry reads the [`LlmConfig`], resolves authentication (env
//! vars, direct keys), and instantiates the OpenAI-compatible adapter for
//! each configured provider — the one concrete `LlmProvider` kept as a
//! worked example.

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use sa_domain::config::LlmConfig;
use sa_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Holds all instantiated LLM providers.
///
/// Providers that fail to initialize (e.g. missing API key) are logged
/// and skipped rather than aborting the entire startup, unless that
/// leaves the registry with zero providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`]. The first
    /// successfully-initialized provider becomes the default.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut default_id = None;

        for pc in &config.providers {
            match OpenAiCompatProvider::from_config(pc, config.default_timeout_ms) {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, "registered LLM provider");
                    if default_id.is_none() {
                        default_id = Some(pc.id.clone());
                    }
                    providers.insert(pc.id.clone(), Arc::new(provider));
                }
                Err(e) => {
                    tracing::warn!(provider_id = %pc.id, error = %e, "failed to initialize LLM provider, skipping");
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            return Err(Error::Config(
                "all configured LLM providers failed to initialize".into(),
            ));
        }

        Ok(Self { providers, default_id })
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// The default provider (the first one configured), if any.
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.default_id.as_ref().and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
