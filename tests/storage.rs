mod util;

use remote_index_cache::cache::CachedFacade;
use remote_index_cache::search::Options;
use remote_index_cache::storage::{CacheNamespace, CacheStore, SqliteCacheStore};
use serde_json::json;
use tempfile::TempDir;
use util::{MockTransport, remote_facade};

#[test]
fn cache_survives_process_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let mock = MockTransport::new().with_documents(json!({
        "/video/1": {"videoUri": "/video/1", "title": "persisted", "tags": ["a", "b"], "duration": 61.5},
    }));

    let first = CachedFacade::new(remote_facade(&mock), SqliteCacheStore::new(&path));
    let video = first.lookup_video("/video/1", &Options::new()).unwrap();
    drop(first);

    let second = CachedFacade::new(remote_facade(&mock), SqliteCacheStore::new(&path));
    assert_eq!(second.lookup_video("/video/1", &Options::new()).unwrap(), video);
    assert_eq!(mock.count("lookup"), 1);
}

#[test]
fn store_is_lazy_until_first_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lazy").join("cache.db");
    let mock = MockTransport::new();
    let cached = CachedFacade::new(remote_facade(&mock), SqliteCacheStore::new(&path));
    assert!(!cached.store().is_open());
    assert!(!path.exists());

    cached.clear_caches(&[CacheNamespace::Results]).unwrap();
    assert!(cached.store().is_open());
    assert!(path.exists());
}

#[test]
fn every_namespace_has_its_own_table() {
    let dir = TempDir::new().unwrap();
    let store = SqliteCacheStore::open(dir.path().join("cache.db")).unwrap();
    for (i, ns) in CacheNamespace::ALL.into_iter().enumerate() {
        store.put(ns, "key", &json!({"n": i})).unwrap();
    }
    for (i, ns) in CacheNamespace::ALL.into_iter().enumerate() {
        assert_eq!(store.len(ns).unwrap(), 1);
        assert_eq!(store.get(ns, "key").unwrap(), Some(json!({"n": i})));
    }

    let conn = rusqlite::Connection::open(store.path()).unwrap();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('videos', 'facetracks', 'cacheinfo', 'meta')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 4);
}
