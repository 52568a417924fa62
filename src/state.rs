//! Application state management

use std::sync::Arc;

use parking_lot::Mutex;

use crate::admission::{Admission, RateLimiter, RatePolicy};
use crate::artifacts::{ArtifactStore, CleanupHandle, CleanupScheduler};
use crate::config::{Config, DomainConfig};
use crate::convert::{ConversionPipeline, Dispatcher, TimeoutGuard};
use crate::codecs::DocumentConverter;
use crate::formats::{ConversionDomain, ConverterFamily};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to create artifact directory {path}: {source}")]
    ArtifactDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared application state
///
/// Owns both conversion pipelines, the probe limiter and the cleanup loop.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    images: ConversionPipeline,
    documents: ConversionPipeline,
    probe_limiter: RateLimiter,
    cleanup: Mutex<Option<CleanupHandle>>,
}

impl AppState {
    /// Create the state and the per-domain artifact directories
    ///
    /// The cleanup loop is not running until [`AppState::start_cleanup`].
    pub async fn new(config: Config) -> Result<Self, StateError> {
        let dispatcher = Dispatcher::new(config.alpha_policy).with_converter(
            ConverterFamily::Document,
            Arc::new(DocumentConverter::new(config.max_inflated_bytes)),
        );

        let images = pipeline(
            ConversionDomain::Image,
            &config,
            &config.image,
            ArtifactStore::new(&config.storage.image_dir),
            dispatcher.clone(),
        );
        let documents = pipeline(
            ConversionDomain::Document,
            &config,
            &config.document,
            ArtifactStore::new(&config.storage.document_dir),
            dispatcher,
        );

        for store in [images.store(), documents.store()] {
            store.ensure_root().await.map_err(|source| StateError::ArtifactDir {
                path: store.root().display().to_string(),
                source,
            })?;
        }

        let probe_limiter = RateLimiter::new(RatePolicy {
            quota: config.probe_rate_limit,
            window: config.rate_window(),
        });

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                images,
                documents,
                probe_limiter,
                cleanup: Mutex::new(None),
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Pipeline serving a conversion domain
    pub fn pipeline(&self, domain: ConversionDomain) -> &ConversionPipeline {
        match domain {
            ConversionDomain::Image => &self.inner.images,
            ConversionDomain::Document => &self.inner.documents,
        }
    }

    /// Rate limiter for the diagnostic probe
    pub fn probe_limiter(&self) -> &RateLimiter {
        &self.inner.probe_limiter
    }

    /// Start the background cleanup loop; a second call is a no-op
    pub fn start_cleanup(&self) {
        let mut cleanup = self.inner.cleanup.lock();
        if cleanup.is_some() {
            return;
        }

        let scheduler = CleanupScheduler::new(
            vec![self.inner.images.store().clone(), self.inner.documents.store().clone()],
            self.inner.config.retention(),
        )
        .with_interval(self.inner.config.cleanup_interval());
        *cleanup = Some(scheduler.start());
    }

    /// Stop background work
    ///
    /// Called after the server has drained so no cleanup cycle runs past exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        let handle = self.inner.cleanup.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}

fn pipeline(
    domain: ConversionDomain,
    config: &Config,
    limits: &DomainConfig,
    store: ArtifactStore,
    dispatcher: Dispatcher,
) -> ConversionPipeline {
    let policy = RatePolicy {
        quota: limits.rate_limit,
        window: config.rate_window(),
    };

    ConversionPipeline::new(
        domain,
        Admission::new(limits.max_bytes, policy),
        dispatcher,
        TimeoutGuard::new(limits.timeout()),
        store,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.image_dir = dir.path().join("images");
        config.storage.document_dir = dir.path().join("documents");
        config
    }

    #[tokio::test]
    async fn test_new_creates_namespaces() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(test_config(&dir)).await.unwrap();

        assert!(dir.path().join("images").is_dir());
        assert!(dir.path().join("documents").is_dir());
        assert_eq!(state.pipeline(ConversionDomain::Image).domain(), ConversionDomain::Image);
        assert_eq!(state.pipeline(ConversionDomain::Document).admission().max_payload(), 10 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_cleanup_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(test_config(&dir)).await.unwrap();

        state.start_cleanup();
        state.start_cleanup();
        state.shutdown().await;
        // Idempotent
        state.shutdown().await;
    }
}
