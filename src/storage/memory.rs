//! In-process cache store.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{CacheNamespace, CacheStore};
use crate::error::CacheError;
use crate::model::Document;

#[derive(Debug, Default)]
struct Partition {
    entries: HashMap<String, Document>,
    age: Option<f64>,
}

/// Cache store held in memory; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    partitions: RwLock<HashMap<CacheNamespace, Partition>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<Document>, CacheError> {
        Ok(self
            .partitions
            .read()
            .get(&ns)
            .and_then(|p| p.entries.get(key))
            .cloned())
    }

    fn put(&self, ns: CacheNamespace, key: &str, document: &Document) -> Result<(), CacheError> {
        self.partitions
            .write()
            .entry(ns)
            .or_default()
            .entries
            .insert(key.to_string(), document.clone());
        Ok(())
    }

    fn clear(&self, ns: CacheNamespace, age: f64) -> Result<(), CacheError> {
        let mut partitions = self.partitions.write();
        let partition = partitions.entry(ns).or_default();
        partition.entries.clear();
        partition.age = Some(age);
        Ok(())
    }

    fn age(&self, ns: CacheNamespace) -> Result<Option<f64>, CacheError> {
        Ok(self.partitions.read().get(&ns).and_then(|p| p.age))
    }

    fn len(&self, ns: CacheNamespace) -> Result<usize, CacheError> {
        Ok(self
            .partitions
            .read()
            .get(&ns)
            .map_or(0, |p| p.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_overwrites_existing_key() {
        let store = MemoryCacheStore::new();
        store.put(CacheNamespace::Videos, "/v1", &json!({"n": 1})).unwrap();
        store.put(CacheNamespace::Videos, "/v1", &json!({"n": 2})).unwrap();
        assert_eq!(store.len(CacheNamespace::Videos).unwrap(), 1);
        assert_eq!(
            store.get(CacheNamespace::Videos, "/v1").unwrap(),
            Some(json!({"n": 2}))
        );
    }

    #[test]
    fn namespaces_are_isolated() {
        let store = MemoryCacheStore::new();
        store.put(CacheNamespace::Videos, "k", &json!(1)).unwrap();
        assert!(store.get(CacheNamespace::Segments, "k").unwrap().is_none());
        store.clear(CacheNamespace::Segments, 10.0).unwrap();
        assert_eq!(store.len(CacheNamespace::Videos).unwrap(), 1);
    }

    #[test]
    fn clear_drops_entries_and_sets_age() {
        let store = MemoryCacheStore::new();
        assert_eq!(store.age(CacheNamespace::Results).unwrap(), None);
        store.put(CacheNamespace::Results, "q", &json!({})).unwrap();
        store.clear(CacheNamespace::Results, 1234.5).unwrap();
        assert!(store.is_empty(CacheNamespace::Results).unwrap());
        assert_eq!(store.age(CacheNamespace::Results).unwrap(), Some(1234.5));
    }
}
