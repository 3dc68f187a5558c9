//! Runtime settings.
//!
//! Settings come from a TOML file (by default `config.toml` in the platform
//! config directory) and are then overridden by `RICACHE_*` environment
//! variables. A `.env` file in the working directory is honored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::remote::{FacadeSettings, HttpTransportConfig, RegexPostprocessor, RuleSet};

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8080/json-rpc";
pub const DEFAULT_COLLECTION: &str = "abc";
pub const DEFAULT_STAT_LIMIT: u64 = 100;
const CONFIG_FILE_NAME: &str = "config.toml";
const CACHE_DB_NAME: &str = "cache.db";

/// Collection statistics fetched when none are configured.
pub fn default_stats() -> BTreeMap<String, u64> {
    [
        "entities",
        "contributors",
        "Keywords",
        "Genre",
        "publicationYear",
        "persons",
    ]
    .into_iter()
    .map(|name| (name.to_string(), DEFAULT_STAT_LIMIT))
    .collect()
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "remote-index-cache", "ricache")
}

pub fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().to_path_buf())
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// JSON-RPC endpoint of the remote index.
    pub service_url: String,
    pub request_timeout_secs: Option<u64>,
    pub prepend_uri_slash: bool,
    /// Serve reads through the local cache.
    pub cache_enabled: bool,
    /// Keep serving cached entries when the last-modified check fails.
    pub cache_fail_open: bool,
    pub cache_db: Option<PathBuf>,
    pub default_collection: String,
    /// Statistic name → sample limit.
    pub stats: BTreeMap<String, u64>,
    /// Field name → `[[pattern, replacement], ...]`.
    pub postprocess: RuleSet,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout_secs: None,
            prepend_uri_slash: true,
            cache_enabled: true,
            cache_fail_open: true,
            cache_db: None,
            default_collection: DEFAULT_COLLECTION.to_string(),
            stats: default_stats(),
            postprocess: RuleSet::new(),
            log_file: None,
        }
    }
}

impl Settings {
    /// Load settings and apply environment overrides.
    ///
    /// An explicit `path` must exist. Without one, the default config file is
    /// read if present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Override fields from `RICACHE_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(url) = dotenvy::var("RICACHE_SERVICE_URL") {
            self.service_url = url;
        }

        if let Ok(val) = dotenvy::var("RICACHE_REQUEST_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            self.request_timeout_secs = Some(secs);
        }

        if let Ok(val) = dotenvy::var("RICACHE_PREPEND_URI_SLASH") {
            self.prepend_uri_slash = parse_flag(&val);
        }

        if let Ok(val) = dotenvy::var("RICACHE_CACHE_ENABLED") {
            self.cache_enabled = parse_flag(&val);
        }

        if let Ok(val) = dotenvy::var("RICACHE_CACHE_FAIL_OPEN") {
            self.cache_fail_open = parse_flag(&val);
        }

        if let Ok(path) = dotenvy::var("RICACHE_CACHE_DB") {
            self.cache_db = Some(PathBuf::from(path));
        }

        if let Ok(path) = dotenvy::var("RICACHE_LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.cache_db
            .clone()
            .unwrap_or_else(|| default_data_dir().join(CACHE_DB_NAME))
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            service_url: self.service_url.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn facade_settings(&self) -> FacadeSettings {
        FacadeSettings {
            prepend_uri_slash: self.prepend_uri_slash,
            stats: self.stats.clone(),
        }
    }

    /// Compile the post-processing rules. Bad patterns fail here, not per request.
    pub fn postprocessor(&self) -> Result<RegexPostprocessor, ConfigError> {
        RegexPostprocessor::new(&self.postprocess)
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_KEYS: [&str; 7] = [
        "RICACHE_SERVICE_URL",
        "RICACHE_REQUEST_TIMEOUT_SECS",
        "RICACHE_PREPEND_URI_SLASH",
        "RICACHE_CACHE_ENABLED",
        "RICACHE_CACHE_FAIL_OPEN",
        "RICACHE_CACHE_DB",
        "RICACHE_LOG_FILE",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: tests touching the environment are #[serial].
            unsafe { std::env::remove_var(key) };
        }
    }

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.service_url, DEFAULT_SERVICE_URL);
        assert!(settings.prepend_uri_slash);
        assert!(settings.cache_enabled);
        assert!(settings.cache_fail_open);
        assert_eq!(settings.default_collection, "abc");
        assert_eq!(settings.stats.len(), 6);
        assert_eq!(settings.stats["publicationYear"], 100);
        assert!(settings.postprocess.is_empty());
        assert_eq!(settings.transport_config().request_timeout, None);
    }

    #[test]
    #[serial]
    fn file_values_fill_in_over_defaults() {
        clear_env();
        let file = write_config(
            r#"
service_url = "http://index.example/rpc"
cache_fail_open = false
request_timeout_secs = 30

[stats]
persons = 10

[postprocess]
title = [["^\\s+", ""], ["foo", "bar"]]
"#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.service_url, "http://index.example/rpc");
        assert!(!settings.cache_fail_open);
        assert!(settings.cache_enabled);
        assert_eq!(settings.stats.len(), 1);
        assert_eq!(settings.postprocess["title"].len(), 2);
        assert_eq!(
            settings.transport_config().request_timeout,
            Some(Duration::from_secs(30))
        );
        assert!(!settings.postprocessor().unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn env_overrides_file() {
        clear_env();
        let file = write_config("cache_enabled = true\nprepend_uri_slash = true\n");
        unsafe {
            std::env::set_var("RICACHE_CACHE_ENABLED", "0");
            std::env::set_var("RICACHE_PREPEND_URI_SLASH", "TRUE");
            std::env::set_var("RICACHE_CACHE_DB", "/tmp/ricache-test.db");
            std::env::set_var("RICACHE_REQUEST_TIMEOUT_SECS", "not-a-number");
        }
        let settings = Settings::load(Some(file.path())).unwrap();
        clear_env();
        assert!(!settings.cache_enabled);
        assert!(settings.prepend_uri_slash);
        assert_eq!(settings.cache_db_path(), PathBuf::from("/tmp/ricache-test.db"));
        assert_eq!(settings.request_timeout_secs, None);
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        clear_env();
        let err = Settings::load(Some(Path::new("/nonexistent/ricache.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let file = write_config("service_url = [");
        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_rule_pattern_is_rejected() {
        let mut settings = Settings::default();
        settings
            .postprocess
            .insert("title".into(), vec![("(unclosed".into(), String::new())]);
        let err = settings.postprocessor().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { ref field, .. } if field == "title"));
    }
}
