//! `SQLite` cache backend: schema, pragmas, and migrations.
//!
//! One table per namespace holds `key -> document` rows, with documents
//! stored as MessagePack blobs. The `cacheinfo` table records when each
//! namespace was last cleared.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{CacheNamespace, CacheStore};
use crate::error::CacheError;
use crate::model::Document;

const SCHEMA_VERSION: i64 = 1;

/// A cache store backed by a single SQLite file.
///
/// Constructing a `SqliteCacheStore` is cheap (no I/O). The database is
/// created, migrated and opened on first access, and the connection is then
/// reused for the lifetime of the store.
pub struct SqliteCacheStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl SqliteCacheStore {
    /// Create a lazy handle pointing at `path`. No I/O is performed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    /// Open (creating if needed) the database right away.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let store = Self::new(path);
        store.with_conn("open", |_| Ok(()))?;
        Ok(store)
    }

    /// Path to the database file (even if not yet opened).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the connection has been opened.
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Run `f` against the connection, opening the database on first access.
    ///
    /// `reason` is logged alongside the open duration.
    fn with_conn<T>(
        &self,
        reason: &str,
        f: impl FnOnce(&mut Connection) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut guard = self.conn.lock();
        let conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect(reason)?,
        };
        f(guard.insert(conn))
    }

    fn connect(&self, reason: &str) -> Result<Connection, CacheError> {
        let start = Instant::now();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(&self.path).map_err(|source| CacheError::OpenFailed {
            path: self.path.clone(),
            source,
        })?;
        apply_pragmas(&conn)?;
        init_meta(&conn)?;
        migrate(&mut conn)?;
        info!(
            path = %self.path.display(),
            elapsed_ms = start.elapsed().as_millis(),
            reason,
            "lazily opened cache database"
        );
        Ok(conn)
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<Document>, CacheError> {
        self.with_conn("get", |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    &format!("SELECT document FROM \"{ns}\" WHERE key = ?1"),
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            bytes.map(|b| decode_document(&b)).transpose()
        })
    }

    fn put(&self, ns: CacheNamespace, key: &str, document: &Document) -> Result<(), CacheError> {
        let bytes = encode_document(document)?;
        self.with_conn("put", |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO \"{ns}\"(key, document) VALUES(?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET document = excluded.document"
                ),
                params![key, bytes],
            )?;
            Ok(())
        })
    }

    fn clear(&self, ns: CacheNamespace, age: f64) -> Result<(), CacheError> {
        self.with_conn("clear", |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(&format!("DELETE FROM \"{ns}\""), [])?;
            tx.execute(
                "INSERT INTO cacheinfo(namespace, age) VALUES(?1, ?2)
                 ON CONFLICT(namespace) DO UPDATE SET age = excluded.age",
                params![ns.as_str(), age],
            )?;
            tx.commit()?;
            debug!(namespace = %ns, removed, age, "cleared cache namespace");
            Ok(())
        })
    }

    fn age(&self, ns: CacheNamespace) -> Result<Option<f64>, CacheError> {
        self.with_conn("age", |conn| {
            Ok(conn
                .query_row(
                    "SELECT age FROM cacheinfo WHERE namespace = ?1",
                    params![ns.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn len(&self, ns: CacheNamespace) -> Result<usize, CacheError> {
        self.with_conn("len", |conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{ns}\""), [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }
}

// -------------------------------------------------------------------------
// Document serialization
// -------------------------------------------------------------------------

fn encode_document(document: &Document) -> Result<Vec<u8>, CacheError> {
    Ok(rmp_serde::to_vec(document)?)
}

fn decode_document(bytes: &[u8]) -> Result<Document, CacheError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

// -------------------------------------------------------------------------
// Schema
// -------------------------------------------------------------------------

fn apply_pragmas(conn: &Connection) -> Result<(), CacheError> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        r"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        ",
    )?;
    Ok(())
}

fn init_meta(conn: &Connection) -> Result<(), CacheError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    // Start at version 0 so migrate() applies the full schema on first open.
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES('schema_version', '0')",
        [],
    )?;
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i64, CacheError> {
    Ok(conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .optional()?
        .unwrap_or(0))
}

fn migration_v1() -> String {
    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS cacheinfo (namespace TEXT PRIMARY KEY, age REAL NOT NULL);\n",
    );
    for ns in CacheNamespace::ALL {
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS \"{ns}\" (key TEXT PRIMARY KEY, document BLOB NOT NULL);\n"
        ));
    }
    sql
}

fn migrate(conn: &mut Connection) -> Result<(), CacheError> {
    let current = schema_version(conn)?;
    if current == SCHEMA_VERSION {
        return Ok(());
    }
    if current > SCHEMA_VERSION {
        return Err(CacheError::UnsupportedSchema {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    let tx = conn.transaction()?;
    if current < 1 {
        tx.execute_batch(&migration_v1())?;
    }
    tx.execute(
        "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
        params![SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;
    info!(from = current, to = SCHEMA_VERSION, "migrated cache schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn store_not_open_before_first_use() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCacheStore::new(dir.path().join("cache.db"));
        assert!(!store.is_open());
        assert!(!store.path().exists());
    }

    #[test]
    fn opens_and_creates_parent_dirs_on_first_use() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let store = SqliteCacheStore::new(&path);
        assert_eq!(store.len(CacheNamespace::Videos).unwrap(), 0);
        assert!(store.is_open());
        assert!(path.exists());
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        let doc = json!({"uri": "/video/1", "title": "Nieuws", "duration": 12.5, "tags": ["a", "b"]});
        {
            let store = SqliteCacheStore::open(&path).unwrap();
            store.put(CacheNamespace::Videos, "/video/1", &doc).unwrap();
            store.clear(CacheNamespace::Results, 42.0).unwrap();
        }
        let store = SqliteCacheStore::new(&path);
        assert_eq!(store.get(CacheNamespace::Videos, "/video/1").unwrap(), Some(doc));
        assert_eq!(store.age(CacheNamespace::Results).unwrap(), Some(42.0));
        assert_eq!(store.age(CacheNamespace::Videos).unwrap(), None);
    }

    #[test]
    fn put_upserts() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCacheStore::new(dir.path().join("cache.db"));
        store.put(CacheNamespace::Segments, "/s/1", &json!({"v": 1})).unwrap();
        store.put(CacheNamespace::Segments, "/s/1", &json!({"v": 2})).unwrap();
        assert_eq!(store.len(CacheNamespace::Segments).unwrap(), 1);
        assert_eq!(
            store.get(CacheNamespace::Segments, "/s/1").unwrap(),
            Some(json!({"v": 2}))
        );
    }

    #[test]
    fn clear_only_touches_one_namespace() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCacheStore::new(dir.path().join("cache.db"));
        store.put(CacheNamespace::Videos, "a", &json!(1)).unwrap();
        store.put(CacheNamespace::Keyframes, "a", &json!(2)).unwrap();
        store.clear(CacheNamespace::Videos, 100.0).unwrap();
        store.clear(CacheNamespace::Videos, 200.0).unwrap();
        assert!(store.is_empty(CacheNamespace::Videos).unwrap());
        assert_eq!(store.len(CacheNamespace::Keyframes).unwrap(), 1);
        assert_eq!(store.age(CacheNamespace::Videos).unwrap(), Some(200.0));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        SqliteCacheStore::open(&path).unwrap();
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("UPDATE meta SET value = '99' WHERE key = 'schema_version'", [])
                .unwrap();
        }
        let err = SqliteCacheStore::open(&path).unwrap_err();
        assert!(matches!(
            err,
            CacheError::UnsupportedSchema { found: 99, supported: SCHEMA_VERSION }
        ));
    }
}
