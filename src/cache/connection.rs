//! Memoized handle to the backing key-value store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::StoreSettings;

use super::kv::{KeyValueStore, RedisStore, StoreError};

/// Owns the single store connection for the process.
///
/// The first successful acquisition is cached and handed out as a shared
/// handle on every later call. A connection failure is not cached, so the
/// next caller retries from scratch. When the store is disabled or has no
/// host configured, acquisition yields `None` and every cache layer above
/// degrades to pass-through.
pub struct ConnectionManager {
    settings: StoreSettings,
    store: Mutex<Option<Arc<dyn KeyValueStore>>>,
    logged_unconfigured: AtomicBool,
}

impl ConnectionManager {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            store: Mutex::new(None),
            logged_unconfigured: AtomicBool::new(false),
        }
    }

    /// Wraps an existing store, bypassing connection setup. Test seam.
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            settings: StoreSettings {
                enabled: true,
                host: Some("preconnected".to_owned()),
                port: crate::config::DEFAULT_STORE_PORT,
            },
            store: Mutex::new(Some(store)),
            logged_unconfigured: AtomicBool::new(false),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// Returns the shared store handle, connecting on first use.
    pub async fn acquire(&self) -> Result<Option<Arc<dyn KeyValueStore>>, StoreError> {
        if !self.settings.is_configured() {
            if !self.logged_unconfigured.swap(true, Ordering::Relaxed) {
                info!("store disabled or unconfigured, caching is a no-op");
            }
            return Ok(None);
        }
        let mut guard = self.store.lock().await;
        if let Some(store) = guard.as_ref() {
            return Ok(Some(Arc::clone(store)));
        }
        let host = self.settings.host.as_deref().unwrap_or_default();
        let port = self.settings.port;
        match RedisStore::connect(host, port).await {
            Ok(store) => {
                info!(host, port, "connected to cache store");
                let store: Arc<dyn KeyValueStore> = Arc::new(store);
                *guard = Some(Arc::clone(&store));
                Ok(Some(store))
            }
            Err(err) => {
                warn!(host, port, error = %err, "cache store connection failed");
                Err(err)
            }
        }
    }

    /// Drops the memoized handle (and the once-logged flag) so the next
    /// acquisition starts from scratch.
    pub async fn reset(&self) {
        let mut guard = self.store.lock().await;
        *guard = None;
        self.logged_unconfigured.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::kv::ScanPage;

    struct NullStore;

    #[async_trait]
    impl KeyValueStore for NullStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn scan(
            &self,
            _cursor: &str,
            _pattern: &str,
            _page_size: usize,
        ) -> Result<ScanPage, StoreError> {
            Ok(ScanPage {
                cursor: "0".to_owned(),
                keys: Vec::new(),
            })
        }

        async fn del(&self, _keys: &[String]) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn unconfigured_manager_yields_no_store() {
        let manager = ConnectionManager::new(StoreSettings {
            enabled: true,
            host: None,
            port: crate::config::DEFAULT_STORE_PORT,
        });
        assert!(!manager.is_configured());
        let store = manager.acquire().await.unwrap();
        assert!(store.is_none());
    }

    #[tokio::test]
    async fn disabled_manager_yields_no_store() {
        let manager = ConnectionManager::new(StoreSettings {
            enabled: false,
            host: Some("localhost".to_owned()),
            port: crate::config::DEFAULT_STORE_PORT,
        });
        let store = manager.acquire().await.unwrap();
        assert!(store.is_none());
    }

    #[tokio::test]
    async fn preconnected_store_is_handed_back() {
        let manager = ConnectionManager::with_store(Arc::new(NullStore));
        let store = manager.acquire().await.unwrap();
        assert!(store.is_some());
    }

    #[tokio::test]
    async fn reset_clears_the_memoized_handle() {
        let manager = ConnectionManager::with_store(Arc::new(NullStore));
        assert!(manager.acquire().await.unwrap().is_some());
        manager.reset().await;
        // Settings point at a fake host, so the reconnect path is not taken
        // here; the memoized handle alone must be gone.
        let guard = manager.store.lock().await;
        assert!(guard.is_none());
    }
}
