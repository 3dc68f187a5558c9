//! Local cache storage.
//!
//! The cache is split into a fixed set of namespaces, one per entity kind.
//! Each namespace maps keys (normalized URIs or query hashes) to documents
//! and carries an `age`: the time it was last cleared, in seconds since the
//! epoch. A namespace that was never cleared has no age.

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::model::Document;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheNamespace {
    Videos,
    Segments,
    Assets,
    RelatedVideos,
    RelatedSegments,
    Keyframes,
    Transcripts,
    FaceTracks,
    CollectionStats,
    Suggestions,
    Results,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 11] = [
        CacheNamespace::Videos,
        CacheNamespace::Segments,
        CacheNamespace::Assets,
        CacheNamespace::RelatedVideos,
        CacheNamespace::RelatedSegments,
        CacheNamespace::Keyframes,
        CacheNamespace::Transcripts,
        CacheNamespace::FaceTracks,
        CacheNamespace::CollectionStats,
        CacheNamespace::Suggestions,
        CacheNamespace::Results,
    ];

    /// Name used for the namespace's table and `cacheinfo` row.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheNamespace::Videos => "videos",
            CacheNamespace::Segments => "segments",
            CacheNamespace::Assets => "assets",
            CacheNamespace::RelatedVideos => "relatedvideos",
            CacheNamespace::RelatedSegments => "relatedsegments",
            CacheNamespace::Keyframes => "keyframes",
            CacheNamespace::Transcripts => "transcripts",
            CacheNamespace::FaceTracks => "facetracks",
            CacheNamespace::CollectionStats => "collectionstats",
            CacheNamespace::Suggestions => "suggestions",
            CacheNamespace::Results => "results",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheNamespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown cache namespace `{s}`"))
    }
}

/// Key/document storage partitioned by namespace.
///
/// Writes to an existing key overwrite it. Implementations are shared across
/// request threads.
pub trait CacheStore: Send + Sync {
    fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<Document>, CacheError>;

    fn put(&self, ns: CacheNamespace, key: &str, document: &Document) -> Result<(), CacheError>;

    /// Drop every entry in `ns` and record `age` as its last clear time.
    fn clear(&self, ns: CacheNamespace, age: f64) -> Result<(), CacheError>;

    fn age(&self, ns: CacheNamespace) -> Result<Option<f64>, CacheError>;

    fn len(&self, ns: CacheNamespace) -> Result<usize, CacheError>;

    fn is_empty(&self, ns: CacheNamespace) -> Result<bool, CacheError> {
        Ok(self.len(ns)? == 0)
    }
}

impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<Document>, CacheError> {
        (**self).get(ns, key)
    }

    fn put(&self, ns: CacheNamespace, key: &str, document: &Document) -> Result<(), CacheError> {
        (**self).put(ns, key, document)
    }

    fn clear(&self, ns: CacheNamespace, age: f64) -> Result<(), CacheError> {
        (**self).clear(ns, age)
    }

    fn age(&self, ns: CacheNamespace) -> Result<Option<f64>, CacheError> {
        (**self).age(ns)
    }

    fn len(&self, ns: CacheNamespace) -> Result<usize, CacheError> {
        (**self).len(ns)
    }
}

/// Current time in seconds since the epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
