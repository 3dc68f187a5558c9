//! Common interface over the direct and cached facades.

use serde::Serialize;

use crate::cache::CachedFacade;
use crate::config::Settings;
use crate::error::Result;
use crate::model::{Asset, Document, VersionInfo};
use crate::remote::RemoteFacade;
use crate::search::{Options, StructuredQuery};
use crate::storage::{CacheNamespace, CacheStore, SqliteCacheStore};

/// Entry count and age of one cache namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceStatus {
    pub namespace: CacheNamespace,
    pub entries: usize,
    /// Last clear time in seconds since the epoch; `None` if never cleared.
    pub age: Option<f64>,
}

/// Operations offered by the remote index, cached or not.
pub trait IndexService: Send + Sync {
    fn lookup_video(&self, uri: &str, overrides: &Options) -> Result<Option<Document>>;
    fn lookup_segment(&self, uri: &str, overrides: &Options) -> Result<Option<Document>>;
    fn lookup_asset(&self, uri: &str, overrides: &Options) -> Result<Asset>;
    fn search(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document>;
    fn suggest(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document>;
    fn find_related_videos(&self, uri: &str, overrides: &Options) -> Result<Document>;
    fn find_related_segments(&self, uri: &str, overrides: &Options) -> Result<Document>;
    fn get_keyframes(&self, uri: &str) -> Result<Document>;
    fn get_transcript(&self, uri: &str) -> Result<Document>;
    fn get_face_tracks(&self, uri: &str) -> Result<Document>;
    fn get_collection_statistics(&self) -> Result<Document>;
    fn submit_feedback(&self, query_id: &str, value: &str, first: u64, count: u64) -> Result<()>;
    fn get_last_update_time(&self) -> Result<f64>;
    fn get_service_info(&self) -> Result<Document>;
    fn get_version_info(&self) -> Result<VersionInfo>;
    fn get_available_services(&self) -> Result<Vec<String>>;

    /// Clear the given namespaces (all when empty). Uncached services have
    /// nothing to clear.
    fn clear_caches(&self, _namespaces: &[CacheNamespace]) -> Result<Vec<CacheNamespace>> {
        Ok(Vec::new())
    }

    fn cache_status(&self) -> Result<Vec<NamespaceStatus>> {
        Ok(Vec::new())
    }
}

impl IndexService for RemoteFacade {
    fn lookup_video(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        RemoteFacade::lookup_video(self, uri, overrides)
    }

    fn lookup_segment(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        RemoteFacade::lookup_segment(self, uri, overrides)
    }

    fn lookup_asset(&self, uri: &str, overrides: &Options) -> Result<Asset> {
        RemoteFacade::lookup_asset(self, uri, overrides)
    }

    fn search(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        RemoteFacade::search(self, query, overrides)
    }

    fn suggest(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        RemoteFacade::suggest(self, query, overrides)
    }

    fn find_related_videos(&self, uri: &str, overrides: &Options) -> Result<Document> {
        RemoteFacade::find_related_videos(self, uri, overrides)
    }

    fn find_related_segments(&self, uri: &str, overrides: &Options) -> Result<Document> {
        RemoteFacade::find_related_segments(self, uri, overrides)
    }

    fn get_keyframes(&self, uri: &str) -> Result<Document> {
        RemoteFacade::get_keyframes(self, uri)
    }

    fn get_transcript(&self, uri: &str) -> Result<Document> {
        RemoteFacade::get_transcript(self, uri)
    }

    fn get_face_tracks(&self, uri: &str) -> Result<Document> {
        RemoteFacade::get_face_tracks(self, uri)
    }

    fn get_collection_statistics(&self) -> Result<Document> {
        RemoteFacade::get_collection_statistics(self)
    }

    fn submit_feedback(&self, query_id: &str, value: &str, first: u64, count: u64) -> Result<()> {
        RemoteFacade::submit_feedback(self, query_id, value, first, count)
    }

    fn get_last_update_time(&self) -> Result<f64> {
        Ok(RemoteFacade::get_last_update_time(self)?)
    }

    fn get_service_info(&self) -> Result<Document> {
        RemoteFacade::get_service_info(self)
    }

    fn get_version_info(&self) -> Result<VersionInfo> {
        RemoteFacade::get_version_info(self)
    }

    fn get_available_services(&self) -> Result<Vec<String>> {
        RemoteFacade::get_available_services(self)
    }
}

impl<S: CacheStore> IndexService for CachedFacade<S> {
    fn lookup_video(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        CachedFacade::lookup_video(self, uri, overrides)
    }

    fn lookup_segment(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        CachedFacade::lookup_segment(self, uri, overrides)
    }

    fn lookup_asset(&self, uri: &str, overrides: &Options) -> Result<Asset> {
        CachedFacade::lookup_asset(self, uri, overrides)
    }

    fn search(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        CachedFacade::search(self, query, overrides)
    }

    fn suggest(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        CachedFacade::suggest(self, query, overrides)
    }

    fn find_related_videos(&self, uri: &str, overrides: &Options) -> Result<Document> {
        CachedFacade::find_related_videos(self, uri, overrides)
    }

    fn find_related_segments(&self, uri: &str, overrides: &Options) -> Result<Document> {
        CachedFacade::find_related_segments(self, uri, overrides)
    }

    fn get_keyframes(&self, uri: &str) -> Result<Document> {
        CachedFacade::get_keyframes(self, uri)
    }

    fn get_transcript(&self, uri: &str) -> Result<Document> {
        CachedFacade::get_transcript(self, uri)
    }

    fn get_face_tracks(&self, uri: &str) -> Result<Document> {
        CachedFacade::get_face_tracks(self, uri)
    }

    fn get_collection_statistics(&self) -> Result<Document> {
        CachedFacade::get_collection_statistics(self)
    }

    fn submit_feedback(&self, query_id: &str, value: &str, first: u64, count: u64) -> Result<()> {
        CachedFacade::submit_feedback(self, query_id, value, first, count)
    }

    fn get_last_update_time(&self) -> Result<f64> {
        CachedFacade::get_last_update_time(self)
    }

    fn get_service_info(&self) -> Result<Document> {
        CachedFacade::get_service_info(self)
    }

    fn get_version_info(&self) -> Result<VersionInfo> {
        CachedFacade::get_version_info(self)
    }

    fn get_available_services(&self) -> Result<Vec<String>> {
        CachedFacade::get_available_services(self)
    }

    fn clear_caches(&self, namespaces: &[CacheNamespace]) -> Result<Vec<CacheNamespace>> {
        CachedFacade::clear_caches(self, namespaces)
    }

    fn cache_status(&self) -> Result<Vec<NamespaceStatus>> {
        CacheNamespace::ALL
            .into_iter()
            .map(|namespace| {
                Ok(NamespaceStatus {
                    namespace,
                    entries: self.store().len(namespace)?,
                    age: self.store().age(namespace)?,
                })
            })
            .collect()
    }
}

/// Build the service described by `settings`: cached over SQLite when
/// `cache_enabled`, otherwise the bare remote facade.
///
/// No connection is made and no file is opened until the first call.
pub fn open_service(settings: &Settings) -> Result<Box<dyn IndexService>> {
    let remote = RemoteFacade::over_http(
        settings.transport_config(),
        settings.facade_settings(),
        settings.postprocessor()?,
    );
    if !settings.cache_enabled {
        return Ok(Box::new(remote));
    }
    let store = SqliteCacheStore::new(settings.cache_db_path());
    Ok(Box::new(
        CachedFacade::new(remote, store)
            .with_fail_open(settings.cache_fail_open)
            .with_default_collection(settings.default_collection.clone()),
    ))
}
