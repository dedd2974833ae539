//! Backend catalog: maps known backend names to their loaders.

use std::sync::Arc;

use crate::config::BotConfig;
use crate::llm::inference::InferenceLoader;
use crate::llm::params::ModelParams;
use crate::llm::provider::{BackendLoader, StaticLoader};
use crate::llm::rig_adapter::{RigLoader, RigProvider};

/// Name of the always-available backend that disables generation.
pub const STATIC_BACKEND: &str = "static";

/// Hosted models offered out of the box.
pub const HOSTED_MODELS: &[&str] = &[
    "ai-forever/rugpt3medium_based_on_gpt2",
    "Vikhrmodels/Vikhr-Llama-3.2-1B-Instruct",
];

/// Find the item whose name matches trimmed user input, ignoring ASCII case.
pub fn find_by_name<'a, T>(
    items: &'a [T],
    name_of: fn(&T) -> &str,
    input: &str,
) -> Option<&'a T> {
    let input = input.trim();
    items.iter().find(|item| name_of(item).eq_ignore_ascii_case(input))
}

fn entry_name(entry: &(String, Arc<dyn BackendLoader>)) -> &str {
    &entry.0
}

/// Ordered registry of backend constructors. Unknown names are rejected
/// before any loading is attempted.
#[derive(Clone, Default)]
pub struct BackendCatalog {
    entries: Vec<(String, Arc<dyn BackendLoader>)>,
}

impl BackendCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader under a canonical name. A later registration with
    /// the same name (case-insensitive) replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, loader: Arc<dyn BackendLoader>) {
        let name = name.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            tracing::debug!(backend = %name, "Replacing backend registration");
            *entry = (name, loader);
            return;
        }
        tracing::debug!(backend = %name, "Registered backend");
        self.entries.push((name, loader));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, loader: Arc<dyn BackendLoader>) -> Self {
        self.register(name, loader);
        self
    }

    /// Loader for a canonical or case-variant name.
    pub fn loader(&self, name: &str) -> Option<(&str, Arc<dyn BackendLoader>)> {
        find_by_name(&self.entries, entry_name, name)
            .map(|(existing, loader)| (existing.as_str(), Arc::clone(loader)))
    }

    /// Canonical names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the catalog for a configuration: the static backend, the hosted
    /// models and any chat-model providers with credentials.
    pub fn from_config(config: &BotConfig, params: &ModelParams) -> Self {
        let mut catalog =
            Self::new().with(STATIC_BACKEND, Arc::new(StaticLoader::new(STATIC_BACKEND)));

        for model in HOSTED_MODELS {
            catalog.register(
                *model,
                Arc::new(InferenceLoader {
                    model: model.to_string(),
                    base_url: config.inference_url.clone(),
                    token: config.inference_token.clone(),
                    parameters: params.for_model(model),
                }),
            );
        }

        let providers = [
            (RigProvider::Anthropic, &config.anthropic),
            (RigProvider::OpenAi, &config.openai),
        ];
        for (provider, provider_config) in providers {
            if let Some(provider_config) = provider_config {
                let loader = RigLoader {
                    provider,
                    config: provider_config.clone(),
                };
                catalog.register(loader.backend_name(), Arc::new(loader));
            }
        }

        catalog
    }
}

impl std::fmt::Debug for BackendCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCatalog")
            .field("names", &self.names())
            .finish()
    }
}
