//! Cache client factory
//!
//! A [`CacheClient`] bundles the index and blob store handles. It is built
//! once at startup and cloned into every component that talks to the cache.

use crate::cache::blob::BlobStore;
use crate::cache::http::HttpStore;
use crate::cache::index::CacheIndex;
use crate::cache::local::LocalStore;
use crate::config::{BackendConfig, BackendKind, ConfigManager};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shared handles to the cache backend
#[derive(Clone)]
pub struct CacheClient {
    pub index: Arc<dyn CacheIndex>,
    pub blobs: Arc<dyn BlobStore>,
}

impl CacheClient {
    /// Combine separate index and blob store implementations
    pub fn new(index: Arc<dyn CacheIndex>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { index, blobs }
    }

    /// Use one backend object for both roles
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: CacheIndex + BlobStore + 'static,
    {
        Self {
            index: backend.clone(),
            blobs: backend,
        }
    }

    /// Build the client described by the backend configuration
    pub fn from_config(config: &BackendConfig) -> Self {
        match config.kind {
            BackendKind::Local => {
                let root = config
                    .path
                    .clone()
                    .unwrap_or_else(ConfigManager::local_cache_dir);
                debug!("Using local cache at {}", root.display());
                Self::shared(Arc::new(LocalStore::new(root)))
            }
            BackendKind::Http => {
                debug!("Using http cache at {}", config.url);
                Self::shared(Arc::new(HttpStore::new(
                    &config.url,
                    Duration::from_secs(config.timeout_secs),
                )))
            }
        }
    }
}
