//! Chat-model backends via rig-core (Anthropic, OpenAI).

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::ExposeSecret;

use crate::config::ProviderConfig;
use crate::error::{BackendLoadError, LlmError};
use crate::llm::provider::{BackendLoader, GenerationBackend};

const PREAMBLE: &str = "You write short, friendly survey questions for a delivery service. \
Reply with the question text only.";

/// Supported rig providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigProvider {
    Anthropic,
    OpenAi,
}

impl RigProvider {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Wraps a rig agent behind the [`GenerationBackend`] trait.
pub struct RigBackend<A> {
    name: String,
    agent: A,
}

#[async_trait]
impl<A> GenerationBackend for RigBackend<A>
where
    A: Prompt + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.agent
            .prompt(prompt)
            .await
            .map(|text| text.trim().to_string())
            .map_err(|e| LlmError::RequestFailed {
                backend: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

/// Loader for rig-backed providers.
pub struct RigLoader {
    pub provider: RigProvider,
    pub config: ProviderConfig,
}

impl RigLoader {
    /// Catalog name, e.g. `anthropic/claude-sonnet-4-20250514`.
    pub fn backend_name(&self) -> String {
        format!("{}/{}", self.provider.prefix(), self.config.model)
    }
}

#[async_trait]
impl BackendLoader for RigLoader {
    async fn load(&self) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
        let name = self.backend_name();
        let load_failed = |reason: String| BackendLoadError::LoadFailed {
            name: name.clone(),
            reason,
        };

        let backend: Arc<dyn GenerationBackend> = match self.provider {
            RigProvider::Anthropic => {
                use rig::providers::anthropic;
                let client: rig::client::Client<anthropic::client::AnthropicExt> =
                    anthropic::Client::new(self.config.api_key.expose_secret())
                        .map_err(|e| load_failed(format!("Anthropic client: {e}")))?;
                let agent = client
                    .agent(&self.config.model)
                    .preamble(PREAMBLE)
                    .max_tokens(256)
                    .build();
                Arc::new(RigBackend {
                    name: name.clone(),
                    agent,
                })
            }
            RigProvider::OpenAi => {
                use rig::providers::openai;
                let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                    openai::Client::new(self.config.api_key.expose_secret())
                        .map_err(|e| load_failed(format!("OpenAI client: {e}")))?;
                let agent = client
                    .agent(&self.config.model)
                    .preamble(PREAMBLE)
                    .max_tokens(256)
                    .build();
                Arc::new(RigBackend {
                    name: name.clone(),
                    agent,
                })
            }
        };

        tracing::info!(backend = %name, "Chat-model backend ready");
        Ok(backend)
    }
}
