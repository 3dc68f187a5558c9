pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod search;
pub mod service;
pub mod storage;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing::warn;

pub use config::{Settings, default_data_dir};
pub use error::{Error, Result};

use search::{EncodedQuery, Options, StructuredQuery};
use service::{IndexService, open_service};
use storage::CacheNamespace;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "ricache",
    version,
    about = "Cached client and query encoder for a remote video search index"
)]
pub struct Cli {
    /// Settings file (defaults to config.toml in the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drop cached entries and reset namespace ages
    ClearCaches {
        /// Namespace to clear; repeat for several. Clears all when omitted.
        #[arg(long = "namespace", short = 'n')]
        namespaces: Vec<CacheNamespace>,
    },
    /// Encode a structured query (JSON file, or - for stdin) without contacting the index
    Encode { input: PathBuf },
    /// Look up a video, segment or asset by URI
    Lookup {
        uri: String,
        #[arg(long, value_enum, default_value_t = LookupKind::Asset)]
        kind: LookupKind,
    },
    /// Run a structured query (JSON file, or - for stdin)
    Search { input: PathBuf },
    /// Related videos (or segments) for a URI
    Related {
        uri: String,
        /// Rank related segments instead of videos
        #[arg(long)]
        segments: bool,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Show settings, remote index status and cache contents
    Info,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupKind {
    Video,
    Segment,
    Asset,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let _log_guard = init_tracing(settings.log_file.as_deref())?;

    match cli.command {
        Commands::ClearCaches { namespaces } => {
            if !settings.cache_enabled {
                warn!("caching is disabled; nothing to clear");
            }
            let service = open_service(&settings)?;
            for ns in service.clear_caches(&namespaces)? {
                println!("{ns}");
            }
        }
        Commands::Encode { input } => {
            let query = read_query(&input)?;
            let encoded = EncodedQuery::new(&query, Options::new())?;
            print_json(&json!({
                "encodedText": encoded.encoded_text,
                "displayText": encoded.display_text,
                "isMagic": encoded.is_magic,
                "cacheKey": encoded.cache_key(),
                "queryObject": encoded.to_query_object(),
            }))?;
        }
        Commands::Lookup { uri, kind } => {
            let service = open_service(&settings)?;
            let options = Options::new();
            let found = match kind {
                LookupKind::Video => service.lookup_video(&uri, &options)?,
                LookupKind::Segment => service.lookup_segment(&uri, &options)?,
                LookupKind::Asset => Some(serde_json::to_value(service.lookup_asset(&uri, &options)?)?),
            };
            match found {
                Some(document) => print_json(&document)?,
                None => bail!("no {kind:?} found for {uri}"),
            }
        }
        Commands::Search { input } => {
            let query = read_query(&input)?;
            let service = open_service(&settings)?;
            print_json(&service.search(&query, &Options::new())?)?;
        }
        Commands::Related {
            uri,
            segments,
            limit,
        } => {
            let service = open_service(&settings)?;
            let mut options = Options::new();
            if let Some(limit) = limit {
                options.insert("limit".into(), json!(limit));
            }
            let related = if segments {
                service.find_related_segments(&uri, &options)?
            } else {
                service.find_related_videos(&uri, &options)?
            };
            print_json(&related)?;
        }
        Commands::Info => {
            let service = open_service(&settings)?;
            print_json(&info_report(&settings, service.as_ref())?)?;
        }
    }
    Ok(())
}

/// Install the stderr subscriber, plus a file layer when `log_file` is set.
///
/// The returned guard flushes the file writer on drop.
pub fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_env("RICACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).try_init()?;
        return Ok(None);
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("log file {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()?;
    Ok(Some(guard))
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading query from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Parse a query file: either a full query record or a bare `data` object.
fn read_query(path: &Path) -> anyhow::Result<StructuredQuery> {
    let raw = read_input(path)?;
    let value: Value = serde_json::from_str(&raw).context("query is not valid JSON")?;
    if value.get("data").is_some() {
        return serde_json::from_value(value).context("query record is malformed");
    }
    Ok(StructuredQuery::new(String::new(), value))
}

fn info_report(settings: &Settings, service: &dyn IndexService) -> anyhow::Result<Value> {
    let remote = match service.get_version_info() {
        Ok(version) => json!({
            "version": version.to_string(),
            "lastUpdate": service.get_last_update_time().ok(),
            "services": service.get_available_services().ok(),
        }),
        Err(err) => json!({"error": err.to_string()}),
    };
    let cache = if settings.cache_enabled {
        json!({
            "path": settings.cache_db_path(),
            "failOpen": settings.cache_fail_open,
            "namespaces": service.cache_status()?,
        })
    } else {
        Value::Null
    };
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "built": option_env!("VERGEN_BUILD_TIMESTAMP"),
        "target": option_env!("VERGEN_CARGO_TARGET_TRIPLE"),
        "serviceUrl": settings.service_url,
        "remote": remote,
        "cache": cache,
    }))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
