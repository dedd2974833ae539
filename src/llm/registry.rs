//! Backend registry: the single process-wide active backend.
//!
//! The slot holds an `Arc` snapshot. Readers clone the `Arc` under a
//! short read lock and release it before generating, so a slow `generate`
//! never blocks other sessions or a swap. A swap loads the new backend
//! with no lock held and only takes the write lock to replace the pointer;
//! callers that captured the old backend finish against it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::error::BackendLoadError;
use crate::llm::catalog::BackendCatalog;
use crate::llm::provider::{BackendLoader, GenerationBackend};

pub struct BackendRegistry {
    active: RwLock<Arc<dyn GenerationBackend>>,
    /// Bumped on every successful swap.
    version: AtomicU64,
    /// Serializes swaps so two loads never race to install.
    swap_lock: Mutex<()>,
    catalog: BackendCatalog,
    load_timeout: Duration,
}

impl BackendRegistry {
    pub fn new(
        initial: Arc<dyn GenerationBackend>,
        catalog: BackendCatalog,
        load_timeout: Duration,
    ) -> Self {
        Self {
            active: RwLock::new(initial),
            version: AtomicU64::new(0),
            swap_lock: Mutex::new(()),
            catalog,
            load_timeout,
        }
    }

    /// Load `default_name` from the catalog and make it the initial backend.
    pub async fn from_catalog(
        catalog: BackendCatalog,
        default_name: &str,
        load_timeout: Duration,
    ) -> Result<Self, BackendLoadError> {
        let (name, loader) =
            catalog
                .loader(default_name)
                .ok_or_else(|| BackendLoadError::UnknownBackend {
                    name: default_name.to_string(),
                })?;
        let initial = load_with_timeout(name, loader.as_ref(), load_timeout).await?;
        Ok(Self::new(initial, catalog, load_timeout))
    }

    /// Snapshot of the active backend. The returned reference may be stale
    /// as soon as this returns; it stays valid for the caller regardless.
    pub async fn current(&self) -> Arc<dyn GenerationBackend> {
        Arc::clone(&*self.active.read().await)
    }

    /// Name of the active backend.
    pub async fn current_name(&self) -> String {
        self.current().await.name().to_string()
    }

    /// Number of successful swaps so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn catalog(&self) -> &BackendCatalog {
        &self.catalog
    }

    /// Canonical names of every selectable backend.
    pub fn available(&self) -> Vec<String> {
        self.catalog.names()
    }

    /// Resolve a backend name from the catalog and install it.
    ///
    /// Unknown names are rejected without touching the active backend.
    pub async fn swap(&self, name: &str) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
        let Some((canonical, loader)) = self.catalog.loader(name) else {
            tracing::debug!(backend = %name, "Rejected swap to unknown backend");
            return Err(BackendLoadError::UnknownBackend {
                name: name.to_string(),
            });
        };
        let canonical = canonical.to_string();
        self.swap_with(&canonical, loader.as_ref()).await
    }

    /// Construct a backend with `loader` and, only once it is fully built,
    /// install it as the active one. On failure the previous backend stays.
    pub async fn swap_with(
        &self,
        name: &str,
        loader: &dyn BackendLoader,
    ) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
        let _swapping = self.swap_lock.lock().await;

        tracing::info!(backend = %name, "Loading backend");
        let backend = match load_with_timeout(name, loader, self.load_timeout).await {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(backend = %name, "Backend swap failed, keeping current: {e}");
                return Err(e);
            }
        };

        let previous = {
            let mut active = self.active.write().await;
            std::mem::replace(&mut *active, Arc::clone(&backend))
        };
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            backend = %backend.name(),
            previous = %previous.name(),
            version,
            "Active backend swapped"
        );
        Ok(backend)
    }
}

async fn load_with_timeout(
    name: &str,
    loader: &dyn BackendLoader,
    timeout: Duration,
) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
    match tokio::time::timeout(timeout, loader.load()).await {
        Ok(result) => result,
        Err(_) => Err(BackendLoadError::Timeout {
            name: name.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{StaticBackend, StaticLoader};

    /// Backend that echoes its name, optionally waiting for a gate first.
    struct NamedBackend {
        name: String,
        gate: Option<Arc<Notify>>,
        started: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl GenerationBackend for NamedBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            if let Some(started) = &self.started {
                started.notify_one();
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(format!("{}: {prompt}", self.name))
        }
    }

    struct NamedLoader {
        name: String,
        calls: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl NamedLoader {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl BackendLoader for NamedLoader {
        async fn load(&self) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Arc::new(NamedBackend {
                name: self.name.clone(),
                gate: None,
                started: None,
            }))
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl BackendLoader for FailingLoader {
        async fn load(&self) -> Result<Arc<dyn GenerationBackend>, BackendLoadError> {
            Err(BackendLoadError::LoadFailed {
                name: "broken".to_string(),
                reason: "weights missing".to_string(),
            })
        }
    }

    fn registry(catalog: BackendCatalog) -> BackendRegistry {
        BackendRegistry::new(
            Arc::new(StaticBackend::new("static")),
            catalog,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn swap_installs_new_backend_for_next_current() {
        let catalog = BackendCatalog::new().with("alpha", Arc::new(NamedLoader::new("alpha")));
        let registry = registry(catalog);
        assert_eq!(registry.current_name().await, "static");

        let installed = registry.swap("ALPHA").await.unwrap();
        assert_eq!(installed.name(), "alpha");
        assert_eq!(registry.current_name().await, "alpha");
        assert_eq!(registry.version(), 1);
    }

    #[tokio::test]
    async fn failing_loader_keeps_previous_backend() {
        let registry = registry(BackendCatalog::new());
        let before = registry.current().await;

        let err = registry.swap_with("broken", &FailingLoader).await.err().unwrap();
        assert!(matches!(err, BackendLoadError::LoadFailed { .. }));

        let after = registry.current().await;
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(registry.version(), 0);
    }

    #[tokio::test]
    async fn unknown_name_is_rejected_before_loading() {
        let loader = NamedLoader::new("alpha");
        let calls = Arc::clone(&loader.calls);
        let registry = registry(BackendCatalog::new().with("alpha", Arc::new(loader)));

        let err = registry.swap("beta").await.err().unwrap();
        assert!(matches!(err, BackendLoadError::UnknownBackend { ref name } if name == "beta"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.current_name().await, "static");
    }

    #[tokio::test]
    async fn slow_loader_times_out_and_keeps_previous() {
        let mut loader = NamedLoader::new("slow");
        loader.delay = Some(Duration::from_secs(60));
        let registry = BackendRegistry::new(
            Arc::new(StaticBackend::new("static")),
            BackendCatalog::new().with("slow", Arc::new(loader)),
            Duration::from_millis(20),
        );

        let err = registry.swap("slow").await.err().unwrap();
        assert!(matches!(err, BackendLoadError::Timeout { .. }));
        assert_eq!(registry.current_name().await, "static");
    }

    #[tokio::test]
    async fn in_flight_generate_finishes_on_captured_backend() {
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let old: Arc<dyn GenerationBackend> = Arc::new(NamedBackend {
            name: "old".to_string(),
            gate: Some(Arc::clone(&gate)),
            started: Some(Arc::clone(&started)),
        });
        let registry = Arc::new(BackendRegistry::new(
            old,
            BackendCatalog::new().with("new", Arc::new(NamedLoader::new("new"))),
            Duration::from_secs(5),
        ));

        let captured = registry.current().await;
        let in_flight = tokio::spawn(async move { captured.generate("q").await });
        started.notified().await;

        // The swap completes while the old backend is still generating.
        registry.swap("new").await.unwrap();
        assert_eq!(registry.current_name().await, "new");

        gate.notify_one();
        let text = in_flight.await.unwrap().unwrap();
        assert_eq!(text, "old: q");
    }

    #[tokio::test]
    async fn reads_are_not_blocked_by_a_slow_load() {
        let mut loader = NamedLoader::new("slow");
        loader.delay = Some(Duration::from_millis(300));
        let registry = Arc::new(registry(BackendCatalog::new().with("slow", Arc::new(loader))));

        let swapping = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.swap("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let read = tokio::time::timeout(Duration::from_millis(50), registry.current()).await;
        assert_eq!(read.unwrap().name(), "static");

        swapping.await.unwrap().unwrap();
        assert_eq!(registry.current_name().await, "slow");
    }

    #[tokio::test]
    async fn from_catalog_loads_default() {
        let catalog = BackendCatalog::new().with("static", Arc::new(StaticLoader::new("static")));
        let registry = BackendRegistry::from_catalog(catalog, "Static", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(registry.current_name().await, "static");
        assert_eq!(registry.available(), vec!["static"]);
    }

    #[tokio::test]
    async fn from_catalog_rejects_unknown_default() {
        let result =
            BackendRegistry::from_catalog(BackendCatalog::new(), "nope", Duration::from_secs(1))
                .await;
        assert!(matches!(
            result.err(),
            Some(BackendLoadError::UnknownBackend { .. })
        ));
    }
}
