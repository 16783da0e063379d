//! Cached response envelopes, bulk invalidation, and the version marker.

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::telemetry::{
    METRIC_CACHE_DELETED_KEYS_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
};

use super::connection::ConnectionManager;
use super::keys::VERSION_MARKER_KEY;
use super::kv::{KeyValueStore, StoreError};

/// Keys enumerated per SCAN round during bulk invalidation.
const SCAN_COUNT: usize = 500;

/// A fully rendered upstream response, serialized as JSON in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status: u16,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
    pub body: String,
}

impl ResponseEnvelope {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: std::collections::BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(stored, _)| stored.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Read-through/write-through cache for one response domain.
///
/// Store trouble is never allowed to surface as a request failure: a broken
/// or absent store reads as a miss and writes as a no-op, with a warning on
/// the first class of failure.
pub struct ResponseCache {
    manager: Arc<ConnectionManager>,
    domain: &'static str,
    prefix: &'static str,
}

impl ResponseCache {
    pub fn new(
        manager: Arc<ConnectionManager>,
        domain: &'static str,
        prefix: &'static str,
    ) -> Self {
        Self {
            manager,
            domain,
            prefix,
        }
    }

    /// Deletes every entry in this domain, returning the count removed.
    pub async fn clear_all(&self) -> Result<u64, StoreError> {
        let store = match self.manager.acquire().await {
            Ok(Some(store)) => store,
            Ok(None) => return Ok(0),
            Err(err) => return Err(err),
        };
        clear_prefix(store.as_ref(), self.prefix).await
    }

    pub async fn read(&self, key: &str) -> Option<ResponseEnvelope> {
        let store = match self.manager.acquire().await {
            Ok(Some(store)) => store,
            Ok(None) => return None,
            Err(err) => {
                warn!(domain = self.domain, error = %err, "cache read skipped, store unavailable");
                return None;
            }
        };
        let raw = match store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                counter!(METRIC_CACHE_MISS_TOTAL, "domain" => self.domain).increment(1);
                return None;
            }
            Err(err) => {
                warn!(domain = self.domain, key, error = %err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<ResponseEnvelope>(&raw) {
            Ok(envelope) => {
                counter!(METRIC_CACHE_HIT_TOTAL, "domain" => self.domain).increment(1);
                debug!(domain = self.domain, key, "cache hit");
                Some(envelope)
            }
            Err(err) => {
                // A corrupt entry is treated as a miss; the next write repairs it.
                warn!(domain = self.domain, key, error = %err, "cache entry undecodable");
                None
            }
        }
    }

    pub async fn write(&self, key: &str, envelope: &ResponseEnvelope) {
        let store = match self.manager.acquire().await {
            Ok(Some(store)) => store,
            Ok(None) => return,
            Err(err) => {
                warn!(domain = self.domain, error = %err, "cache write skipped, store unavailable");
                return;
            }
        };
        let raw = match serde_json::to_string(envelope) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(domain = self.domain, key, error = %err, "cache entry unencodable");
                return;
            }
        };
        if let Err(err) = store.set(key, &raw).await {
            warn!(domain = self.domain, key, error = %err, "cache write failed");
        }
    }
}

/// Deletes every key under `prefix`, returning the number removed.
///
/// SCAN cursors come from the server and a misbehaving one could cycle
/// forever, so each observed cursor is remembered and the walk stops the
/// first time a cursor repeats. Keys from the repeated round are still
/// deleted before the walk stops.
pub async fn clear_prefix(
    store: &dyn KeyValueStore,
    prefix: &str,
) -> Result<u64, StoreError> {
    let pattern = format!("{prefix}:*");
    let mut seen = std::collections::HashSet::new();
    let mut cursor = "0".to_owned();
    let mut deleted = 0u64;
    loop {
        let page = store.scan(&cursor, &pattern, SCAN_COUNT).await?;
        if !page.keys.is_empty() {
            deleted += store.del(&page.keys).await?;
        }
        if !seen.insert(page.cursor.clone()) {
            warn!(prefix, cursor = %page.cursor, "scan cursor repeated, stopping early");
            break;
        }
        if page.cursor == "0" {
            break;
        }
        cursor = page.cursor;
    }
    counter!(METRIC_CACHE_DELETED_KEYS_TOTAL, "prefix" => prefix.to_owned()).increment(deleted);
    debug!(prefix, deleted, "cleared key prefix");
    Ok(deleted)
}

pub async fn read_version_marker(store: &dyn KeyValueStore) -> Result<Option<String>, StoreError> {
    store.get(VERSION_MARKER_KEY).await
}

pub async fn write_version_marker(
    store: &dyn KeyValueStore,
    marker: &str,
) -> Result<(), StoreError> {
    store.set(VERSION_MARKER_KEY, marker).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::kv::ScanPage;

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KeyValueStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        }

        async fn scan(
            &self,
            cursor: &str,
            pattern: &str,
            _page_size: usize,
        ) -> Result<ScanPage, StoreError> {
            assert_eq!(cursor, "0");
            let prefix = pattern.trim_end_matches('*');
            let keys = self
                .entries
                .lock()
                .unwrap()
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            Ok(ScanPage {
                cursor: "0".to_owned(),
                keys,
            })
        }

        async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
            let mut entries = self.entries.lock().unwrap();
            let mut removed = 0;
            for key in keys {
                if entries.remove(key).is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        }
    }

    /// Serves a fixed cursor sequence and records the cursor of each request.
    struct PagedStore {
        pages: Vec<(&'static str, Vec<String>)>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KeyValueStore for PagedStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn scan(
            &self,
            cursor: &str,
            _pattern: &str,
            _page_size: usize,
        ) -> Result<ScanPage, StoreError> {
            let mut requested = self.requested.lock().unwrap();
            let round = requested.len();
            requested.push(cursor.to_owned());
            let (next, keys) = &self.pages[round];
            Ok(ScanPage {
                cursor: (*next).to_owned(),
                keys: keys.clone(),
            })
        }

        async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
            Ok(keys.len() as u64)
        }
    }

    /// Always hands back a fresh non-terminal cursor, then repeats one.
    struct CyclingStore {
        rounds: Mutex<u32>,
        deleted: Mutex<u64>,
    }

    #[async_trait]
    impl KeyValueStore for CyclingStore {
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
            let mut rounds = self.rounds.lock().unwrap();
            *rounds += 1;
            // Rounds 1 and 2 advance, round 3 replays cursor "7".
            let cursor = match *rounds {
                1 => "7",
                2 => "13",
                _ => "7",
            };
            Ok(ScanPage {
                cursor: cursor.to_owned(),
                keys: vec![format!("kms:concept:stale:{rounds}", rounds = *rounds)],
            })
        }

        async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
            let mut deleted = self.deleted.lock().unwrap();
            *deleted += keys.len() as u64;
            Ok(keys.len() as u64)
        }
    }

    fn envelope(body: &str) -> ResponseEnvelope {
        ResponseEnvelope::new(200, body).with_header("Content-Type", "application/rdf+xml")
    }

    #[tokio::test]
    async fn write_then_read_returns_the_envelope() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let manager = Arc::new(ConnectionManager::with_store(Arc::clone(&store)));
        let cache = ResponseCache::new(manager, "concept", crate::cache::keys::CONCEPT_KEY_PREFIX);

        cache.write("kms:concept:published:::rdf:abc::::", &envelope("<rdf/>")).await;
        let read = cache.read("kms:concept:published:::rdf:abc::::").await;
        assert_eq!(read, Some(envelope("<rdf/>")));
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let manager = Arc::new(ConnectionManager::with_store(store));
        let cache = ResponseCache::new(manager, "concept", crate::cache::keys::CONCEPT_KEY_PREFIX);
        assert!(cache.read("kms:concept:absent").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_miss() {
        let store = Arc::new(MemoryStore::default());
        store.set("kms:tree:published:sciencekeywords:", "not json").await.unwrap();
        let manager = Arc::new(ConnectionManager::with_store(
            store as Arc<dyn KeyValueStore>,
        ));
        let cache = ResponseCache::new(manager, "tree", crate::cache::keys::TREE_KEY_PREFIX);
        assert!(cache.read("kms:tree:published:sciencekeywords:").await.is_none());
    }

    #[tokio::test]
    async fn clear_prefix_removes_only_matching_keys() {
        let store = MemoryStore::default();
        store.set("kms:concept:published:a", "1").await.unwrap();
        store.set("kms:concept:published:b", "2").await.unwrap();
        store.set("kms:tree:published:x", "3").await.unwrap();

        let deleted = clear_prefix(&store, "kms:concept").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get("kms:tree:published:x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_all_scopes_to_the_domain_prefix() {
        let store = Arc::new(MemoryStore::default());
        store.set("kms:tree:published:a", "1").await.unwrap();
        store.set("kms:tree:published:b", "2").await.unwrap();
        store.set("kms:concept:published:c", "3").await.unwrap();

        let manager = Arc::new(ConnectionManager::with_store(
            Arc::clone(&store) as Arc<dyn KeyValueStore>
        ));
        let cache = ResponseCache::new(manager, "tree", crate::cache::keys::TREE_KEY_PREFIX);
        assert_eq!(cache.clear_all().await.unwrap(), 2);
        assert!(store.get("kms:concept:published:c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_prefix_walks_every_cursor_until_the_terminal_page() {
        let store = PagedStore {
            pages: vec![
                ("9", vec!["kms:concept:a".into(), "kms:concept:b".into()]),
                ("4", vec!["kms:concept:c".into()]),
                ("0", vec!["kms:concept:d".into()]),
            ],
            requested: Mutex::new(Vec::new()),
        };
        let deleted = clear_prefix(&store, "kms:concept").await.unwrap();
        // Each round is asked with the cursor the previous round returned.
        assert_eq!(*store.requested.lock().unwrap(), vec!["0", "9", "4"]);
        assert_eq!(deleted, 4);
    }

    #[tokio::test]
    async fn clear_prefix_stops_on_repeated_cursor() {
        let store = CyclingStore {
            rounds: Mutex::new(0),
            deleted: Mutex::new(0),
        };
        let deleted = clear_prefix(&store, "kms:concept").await.unwrap();
        // Three rounds run: two distinct cursors plus the replayed one, and
        // the replayed round's key still counts.
        assert_eq!(*store.rounds.lock().unwrap(), 3);
        assert_eq!(deleted, 3);
    }

    #[tokio::test]
    async fn version_marker_round_trips() {
        let store = MemoryStore::default();
        assert!(read_version_marker(&store).await.unwrap().is_none());
        write_version_marker(&store, "20.6").await.unwrap();
        assert_eq!(
            read_version_marker(&store).await.unwrap().as_deref(),
            Some("20.6")
        );
    }
}
