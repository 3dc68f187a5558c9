//! Error types shared by the facades, the cache store and the encoder.

use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to the remote index at the transport/protocol level.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote index returned HTTP {0}")]
    Status(u16),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// A failed call against the remote index.
///
/// Carries the operation that failed and the call arguments so the log line
/// alone is enough to reproduce the request.
#[derive(Debug, Error)]
#[error("{operation} error cause: {cause} args: {context}")]
pub struct RemoteError {
    pub operation: &'static str,
    #[source]
    pub cause: TransportError,
    pub context: serde_json::Value,
}

impl RemoteError {
    pub fn new(
        operation: &'static str,
        cause: TransportError,
        context: serde_json::Value,
    ) -> Self {
        let err = Self {
            operation,
            cause,
            context,
        };
        tracing::error!(operation, error = %err, "remote index call failed");
        err
    }
}

/// Malformed structured query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("query is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("query field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Failure reading or writing the local cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to open cache database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i64, supported: i64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode cached document: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode cached document: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Invalid or unreadable settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid post-processing rule for `{field}`: {source}")]
    InvalidRule {
        field: String,
        source: regex::Error,
    },
}

/// Error returned by facade operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to decode document: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
