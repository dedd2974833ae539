//! Hosted text-generation backend.
//!
//! Talks to a Hugging Face style inference endpoint:
//! `POST {base_url}/models/{model}` with `{"inputs": ..., "parameters": ...}`,
//! answered by `[{"generated_text": ...}]`.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::{BackendLoadError, LlmError};
use crate::llm::provider::{BackendLoader, GenerationBackend};

/// A model served by a hosted inference endpoint.
pub struct InferenceBackend {
    model: String,
    base_url: String,
    token: Option<SecretString>,
    parameters: Value,
    client: reqwest::Client,
}

impl InferenceBackend {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        token: Option<SecretString>,
        parameters: Value,
    ) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            token,
            parameters,
            client: reqwest::Client::new(),
        }
    }

    fn model_url(&self) -> String {
        format!("{}/models/{}", self.base_url.trim_end_matches('/'), self.model)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Check that the endpoint knows this model.
    async fn probe(&self) -> Result<(), String> {
        let resp = self
            .authorize(self.client.get(self.model_url()))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("{} returned {}", self.model_url(), resp.status()))
        }
    }
}

#[async_trait]
impl GenerationBackend for InferenceBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": self.parameters,
        });

        let resp = self
            .authorize(self.client.post(self.model_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                backend: self.model.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            backend: self.model.clone(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(LlmError::RequestFailed {
                backend: self.model.clone(),
                reason: format!("{status}: {}", error_message(&data)),
            });
        }

        extract_generated_text(&data).ok_or_else(|| LlmError::InvalidResponse {
            backend: self.model.clone(),
            reason: "no generated_text in response".to_string(),
        })
    }
}

/// Pull the first `generated_text` out of either the list or object form.
fn extract_generated_text(data: &Value) -> Option<String> {
    let first = match data {
        Value::Array(items) => items.first()?,
        other => other,
    };
    first
        .get("generated_text")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn error_message(data: &Value) -> String {
    data.get("error")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| data.to_string())
}

/// Loader for [`InferenceBackend`]; probes the endpoint before installing.
pub struct InferenceLoader {
    pub model: String,
    pub base_url: String,
    pub token: Option<SecretString>,
    pub parameters: Value,
}

#[async_trait]
impl BackendLoader for InferenceLoader {
    async fn load(&self) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
        let backend = InferenceBackend::new(
            self.model.clone(),
            self.base_url.clone(),
            self.token.clone(),
            self.parameters.clone(),
        );
        backend
            .probe()
            .await
            .map_err(|reason| BackendLoadError::LoadFailed {
                name: self.model.clone(),
                reason,
            })?;
        tracing::info!(backend = %self.model, "Inference backend ready");
        Ok(Arc::new(backend))
    }
}
