//! Read-through cache in front of the remote facade.
//!
//! Every read first checks whether its namespace is stale relative to the
//! remote index's last-modified time and clears it if so. Hits are served
//! from the store; misses are populated from the remote facade and stored
//! unless the result was absent.
//!
//! No lock is held across check, clear and populate. Concurrent readers of a
//! stale namespace may each clear it and each fetch the same key; the writes
//! are overwrites of the same key, so the outcome is the same.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::DEFAULT_COLLECTION;
use crate::error::Result;
use crate::model::types::VIDEO_URI_FIELD;
use crate::model::{Asset, Document, VersionInfo};
use crate::remote::RemoteFacade;
use crate::remote::facade::compose_asset;
use crate::search::{Options, StructuredQuery};
use crate::storage::{CacheNamespace, CacheStore, now_secs};

/// Hooks fired on every cached read.
pub trait CacheObserver: Send + Sync {
    fn on_hit(&self, ns: CacheNamespace, key: &str) {
        debug!(namespace = %ns, key, "cache hit");
    }

    fn on_miss(&self, ns: CacheNamespace, key: &str) {
        debug!(namespace = %ns, key, "cache miss");
    }
}

/// Observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CacheObserver for LogObserver {}

/// Counts hits and misses.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl CacheObserver for CacheStats {
    fn on_hit(&self, ns: CacheNamespace, key: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(namespace = %ns, key, "cache hit");
    }

    fn on_miss(&self, ns: CacheNamespace, key: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(namespace = %ns, key, "cache miss");
    }
}

/// Remote facade with a per-namespace local cache.
pub struct CachedFacade<S> {
    remote: RemoteFacade,
    store: S,
    fail_open: bool,
    default_collection: String,
    observer: Arc<dyn CacheObserver>,
}

impl<S: CacheStore> CachedFacade<S> {
    pub fn new(remote: RemoteFacade, store: S) -> Self {
        Self {
            remote,
            store,
            fail_open: true,
            default_collection: DEFAULT_COLLECTION.to_string(),
            observer: Arc::new(LogObserver),
        }
    }

    /// When false, a failed last-modified check fails the read instead of
    /// serving from cache.
    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Key under which collection statistics are cached.
    pub fn with_default_collection(mut self, collection: impl Into<String>) -> Self {
        self.default_collection = collection.into();
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn remote(&self) -> &RemoteFacade {
        &self.remote
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `ns` is older than the remote index's last change.
    ///
    /// A namespace with no recorded age is stale. If the last-modified time
    /// cannot be fetched and fail-open is on, the namespace is treated as
    /// valid.
    pub fn cache_is_invalid(&self, ns: CacheNamespace) -> Result<bool> {
        let last_modified = match self.remote.get_last_update_time() {
            Ok(t) => t,
            Err(err) if self.fail_open => {
                error!(namespace = %ns, error = %err, "last-modified check failed, serving cached data");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        Ok(match self.store.age(ns)? {
            Some(age) => age < last_modified,
            None => true,
        })
    }

    pub fn clear_cache_if_invalid(&self, ns: CacheNamespace) -> Result<()> {
        if self.cache_is_invalid(ns)? {
            info!(namespace = %ns, "clearing cache");
            self.store.clear(ns, now_secs())?;
        }
        Ok(())
    }

    /// Drop every entry in each namespace and reset its age. Returns the
    /// namespaces cleared.
    pub fn clear_caches(&self, namespaces: &[CacheNamespace]) -> Result<Vec<CacheNamespace>> {
        let namespaces = if namespaces.is_empty() {
            CacheNamespace::ALL.to_vec()
        } else {
            namespaces.to_vec()
        };
        for ns in &namespaces {
            self.store.clear(*ns, now_secs())?;
        }
        info!(count = namespaces.len(), "cleared caches");
        Ok(namespaces)
    }

    /// Read `key` from `ns`, populating it on a miss.
    ///
    /// An absent result is returned without being stored, so the next read
    /// asks the remote index again.
    pub fn cached<T, F>(&self, ns: CacheNamespace, key: &str, populate: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<Option<T>>,
    {
        if let Some(value) = self.read(ns, key)? {
            return Ok(Some(value));
        }
        let value = populate()?;
        if let Some(value) = &value {
            self.write(ns, key, value)?;
        }
        Ok(value)
    }

    /// Like [`cached`](Self::cached) for operations that always produce a value.
    pub fn cached_required<T, F>(&self, ns: CacheNamespace, key: &str, populate: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.read(ns, key)? {
            return Ok(value);
        }
        let value = populate()?;
        self.write(ns, key, &value)?;
        Ok(value)
    }

    fn read<T: DeserializeOwned>(&self, ns: CacheNamespace, key: &str) -> Result<Option<T>> {
        self.clear_cache_if_invalid(ns)?;
        match self.store.get(ns, key)? {
            Some(document) => {
                self.observer.on_hit(ns, key);
                Ok(Some(serde_json::from_value(document)?))
            }
            None => {
                self.observer.on_miss(ns, key);
                Ok(None)
            }
        }
    }

    fn write<T: Serialize>(&self, ns: CacheNamespace, key: &str, value: &T) -> Result<()> {
        self.store.put(ns, key, &serde_json::to_value(value)?)?;
        Ok(())
    }

    pub fn lookup_video(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        let key = self.remote.fix_uri(uri);
        self.cached(CacheNamespace::Videos, &key, || {
            self.remote.lookup_video(&key, overrides)
        })
    }

    pub fn lookup_segment(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        let key = self.remote.fix_uri(uri);
        self.cached(CacheNamespace::Segments, &key, || {
            self.remote.lookup_segment(&key, overrides)
        })
    }

    /// Resolves through the cached segment and video lookups, so it warms
    /// those namespaces too.
    pub fn lookup_asset(&self, uri: &str, overrides: &Options) -> Result<Asset> {
        let key = self.remote.fix_uri(uri);
        self.cached_required(CacheNamespace::Assets, &key, || {
            let asset = compose_asset(
                key.clone(),
                |u| self.lookup_segment(u, overrides),
                |u| self.lookup_video(u, overrides),
            )?;
            Ok(self.remote.postprocess_asset(asset))
        })
    }

    pub fn search(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        let encoded = self.remote.encode_search(query, overrides)?;
        let results = self.cached_required(CacheNamespace::Results, &encoded.cache_key(), || {
            self.remote.search_encoded(&encoded)
        })?;
        self.store_search_documents(&results)?;
        Ok(results)
    }

    /// Write the videos and segments embedded in a search result into their
    /// own namespaces so later lookups hit.
    fn store_search_documents(&self, results: &Document) -> Result<()> {
        for (ns, field) in [
            (CacheNamespace::Segments, "segments"),
            (CacheNamespace::Videos, "videos"),
        ] {
            let Some(Value::Object(documents)) = results.get(field) else {
                continue;
            };
            for (uri, document) in documents {
                let key = self.remote.fix_uri(uri);
                let mut document = document.clone();
                if ns == CacheNamespace::Videos
                    && let Some(obj) = document.as_object_mut()
                {
                    obj.insert(VIDEO_URI_FIELD.to_string(), Value::String(key.clone()));
                }
                self.store.put(ns, &key, &document)?;
            }
            debug!(namespace = %ns, count = documents.len(), "stored search documents");
        }
        Ok(())
    }

    pub fn suggest(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        let encoded = self.remote.encode_suggest(query, overrides)?;
        self.cached_required(CacheNamespace::Suggestions, &encoded.cache_key(), || {
            self.remote.suggest_encoded(&encoded)
        })
    }

    pub fn find_related_videos(&self, uri: &str, overrides: &Options) -> Result<Document> {
        let key = self.remote.fix_uri(uri);
        self.cached_required(CacheNamespace::RelatedVideos, &key, || {
            self.remote.find_related_videos(&key, overrides)
        })
    }

    pub fn find_related_segments(&self, uri: &str, overrides: &Options) -> Result<Document> {
        let key = self.remote.fix_uri(uri);
        self.cached_required(CacheNamespace::RelatedSegments, &key, || {
            self.remote.find_related_segments(&key, overrides)
        })
    }

    pub fn get_keyframes(&self, uri: &str) -> Result<Document> {
        let key = self.remote.fix_uri(uri);
        self.cached_required(CacheNamespace::Keyframes, &key, || {
            self.remote.get_keyframes(&key)
        })
    }

    pub fn get_transcript(&self, uri: &str) -> Result<Document> {
        let key = self.remote.fix_uri(uri);
        self.cached_required(CacheNamespace::Transcripts, &key, || {
            self.remote.get_transcript(&key)
        })
    }

    pub fn get_face_tracks(&self, uri: &str) -> Result<Document> {
        let key = self.remote.fix_uri(uri);
        self.cached_required(CacheNamespace::FaceTracks, &key, || {
            self.remote.get_face_tracks(&key)
        })
    }

    pub fn get_collection_statistics(&self) -> Result<Document> {
        self.cached_required(CacheNamespace::CollectionStats, &self.default_collection, || {
            self.remote.get_collection_statistics()
        })
    }

    pub fn submit_feedback(&self, query_id: &str, value: &str, first: u64, count: u64) -> Result<()> {
        self.remote.submit_feedback(query_id, value, first, count)
    }

    pub fn get_last_update_time(&self) -> Result<f64> {
        Ok(self.remote.get_last_update_time()?)
    }

    pub fn get_service_info(&self) -> Result<Document> {
        self.remote.get_service_info()
    }

    pub fn get_version_info(&self) -> Result<VersionInfo> {
        self.remote.get_version_info()
    }

    pub fn get_available_services(&self) -> Result<Vec<String>> {
        self.remote.get_available_services()
    }
}
