//! The text-generation capability and the loader that constructs it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BackendLoadError, LlmError};

/// A pluggable text generator.
///
/// Implementations must be safe to call from many sessions at once; a swap
/// never mutates a backend, it only replaces which instance is active.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Canonical backend name, as listed in the catalog.
    fn name(&self) -> &str;

    /// Generate text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Constructs a backend. May be slow (network probes, model warm-up).
#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn GenerationBackend>, BackendLoadError>;
}

/// Backend used when no generator is configured. Steps with a prompt fall
/// back to their static text without a notice.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    name: String,
}

impl StaticBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl GenerationBackend for StaticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled {
            backend: self.name.clone(),
        })
    }
}

/// Loader for [`StaticBackend`]; never fails.
pub struct StaticLoader {
    name: String,
}

impl StaticLoader {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl BackendLoader for StaticLoader {
    async fn load(&self) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
        Ok(Arc::new(StaticBackend::new(self.name.clone())))
    }
}

/// Loader that hands out an already constructed backend.
pub struct PrebuiltLoader {
    backend: Arc<dyn GenerationBackend>,
}

impl PrebuiltLoader {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl BackendLoader for PrebuiltLoader {
    async fn load(&self) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
        Ok(Arc::clone(&self.backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_backend_reports_disabled() {
        let backend = StaticBackend::new("static");
        let err = backend.generate("anything").await.unwrap_err();
        assert!(err.is_disabled());
        assert_eq!(backend.name(), "static");
    }

    #[tokio::test]
    async fn static_loader_builds_named_backend() {
        let backend = StaticLoader::new("static").load().await.unwrap();
        assert_eq!(backend.name(), "static");
    }

    #[tokio::test]
    async fn prebuilt_loader_returns_same_instance() {
        let backend: Arc<dyn GenerationBackend> = Arc::new(StaticBackend::new("fixed"));
        let loaded = PrebuiltLoader::new(Arc::clone(&backend)).load().await.unwrap();
        assert!(Arc::ptr_eq(&backend, &loaded));
    }
}
