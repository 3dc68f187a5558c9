//! Uncached facade over the remote index.
//!
//! One method per remote capability. URIs are normalized before they reach
//! the transport, responses are post-processed, and every transport failure
//! is re-raised as a [`RemoteError`] naming the failed method and its
//! arguments. The transport is created on first use and then reused for the
//! lifetime of the facade.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::client::{HttpTransport, HttpTransportConfig};
use super::postprocess::RegexPostprocessor;
use super::protocol::{Transport, method};
use crate::error::{EncodeError, RemoteError, Result, TransportError};
use crate::model::{Asset, AssetKind, Document, VersionInfo};
use crate::model::types::VIDEO_URI_FIELD;
use crate::search::{EncodedQuery, Options, StructuredQuery};
use crate::search::query::query_id_token;

/// Creates the transport on first use.
pub type Connector = Box<dyn Fn() -> Result<Arc<dyn Transport>, TransportError> + Send + Sync>;

pub const DEFAULT_FEEDBACK_COUNT: u64 = 50;
const FEEDBACK_ANNOTATION: &str = "feedback";

#[derive(Debug, Clone)]
pub struct FacadeSettings {
    /// Prepend `/` to URIs that lack one (front-end proxies collapse `//`).
    pub prepend_uri_slash: bool,
    /// Collection statistics to fetch: name → sample limit.
    pub stats: BTreeMap<String, u64>,
}

impl Default for FacadeSettings {
    fn default() -> Self {
        Self {
            prepend_uri_slash: true,
            stats: crate::config::default_stats(),
        }
    }
}

/// Normalize a URI for the remote index: no trailing `/`, and optionally a
/// leading one. Idempotent.
pub fn fix_uri(uri: &str, prepend_slash: bool) -> String {
    let trimmed = uri.trim_end_matches('/');
    if prepend_slash && !trimmed.starts_with('/') {
        format!("/{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Merge caller overrides on top of an operation's default options.
pub fn merge_options(defaults: Value, overrides: &Options) -> Options {
    let mut options = match defaults {
        Value::Object(map) => map,
        _ => Options::new(),
    };
    for (key, value) in overrides {
        options.insert(key.clone(), value.clone());
    }
    options
}

fn lookup_defaults() -> Value {
    json!({"spokenWords": true, "metadata": true, "entityOccurrences": true})
}

fn search_defaults() -> Value {
    json!({"spokenWords": true, "metadata": true, "limit": 200})
}

fn suggest_defaults() -> Value {
    json!({"spokenWords": false, "metadata": true})
}

fn related_defaults() -> Value {
    json!({"metadata": true, "limit": 10})
}

pub struct RemoteFacade {
    settings: FacadeSettings,
    postprocessor: RegexPostprocessor,
    connector: Connector,
    transport: OnceCell<Arc<dyn Transport>>,
}

impl RemoteFacade {
    pub fn new(
        settings: FacadeSettings,
        postprocessor: RegexPostprocessor,
        connector: Connector,
    ) -> Self {
        Self {
            settings,
            postprocessor,
            connector,
            transport: OnceCell::new(),
        }
    }

    /// Facade speaking JSON-RPC over HTTP.
    pub fn over_http(
        config: HttpTransportConfig,
        settings: FacadeSettings,
        postprocessor: RegexPostprocessor,
    ) -> Self {
        let connector: Connector = Box::new(move || {
            let transport = HttpTransport::connect(config.clone())?;
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        });
        Self::new(settings, postprocessor, connector)
    }

    pub fn settings(&self) -> &FacadeSettings {
        &self.settings
    }

    /// Whether the transport has been created yet.
    pub fn is_connected(&self) -> bool {
        self.transport.get().is_some()
    }

    pub fn fix_uri(&self, uri: &str) -> String {
        fix_uri(uri, self.settings.prepend_uri_slash)
    }

    pub fn postprocess(&self, value: Value) -> Value {
        self.postprocessor.process(value)
    }

    fn transport(&self) -> std::result::Result<&Arc<dyn Transport>, TransportError> {
        self.transport.get_or_try_init(|| {
            info!("connecting to remote index");
            (self.connector)()
        })
    }

    fn call(
        &self,
        operation: &'static str,
        params: Vec<Value>,
        context: Value,
    ) -> std::result::Result<Value, RemoteError> {
        debug!(operation, "remote call");
        self.transport()
            .and_then(|transport| transport.call(operation, params))
            .map_err(|cause| RemoteError::new(operation, cause, context))
    }

    fn lookup_first(&self, uri: &str, options: &Options) -> Result<Option<Document>> {
        let context = json!({"uri": uri, "options": options});
        let result = self.call(method::LOOKUP, vec![json!([uri]), json!(options)], context.clone())?;
        match result {
            Value::Array(items) => Ok(items.into_iter().next().filter(|doc| !doc.is_null())),
            Value::Null => Ok(None),
            other => Err(unexpected(method::LOOKUP, "an array", &other, context).into()),
        }
    }

    pub fn lookup_video(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        let uri = self.fix_uri(uri);
        let options = merge_options(lookup_defaults(), overrides);
        let Some(mut video) = self.lookup_first(&uri, &options)? else {
            return Ok(None);
        };
        match video.get(VIDEO_URI_FIELD).cloned().unwrap_or(Value::Null) {
            Value::String(own) if own == uri => {}
            Value::Null => {
                // Some records omit their own URI.
                if let Some(obj) = video.as_object_mut() {
                    obj.insert(VIDEO_URI_FIELD.to_string(), Value::String(uri.clone()));
                }
            }
            _ => return Ok(None),
        }
        Ok(Some(self.postprocess(video)))
    }

    pub fn lookup_segment(&self, uri: &str, overrides: &Options) -> Result<Option<Document>> {
        let uri = self.fix_uri(uri);
        let options = merge_options(lookup_defaults(), overrides);
        let Some(segment) = self.lookup_first(&uri, &options)? else {
            return Ok(None);
        };
        // A record that is its own parent, or has none, is a video.
        let is_video = match segment.get(VIDEO_URI_FIELD) {
            None | Some(Value::Null) => true,
            Some(Value::String(parent)) => *parent == uri,
            // A parent that is not a URI cannot be resolved.
            Some(_) => true,
        };
        if is_video {
            return Ok(None);
        }
        Ok(Some(self.postprocess(segment)))
    }

    pub fn lookup_asset(&self, uri: &str, overrides: &Options) -> Result<Asset> {
        let uri = self.fix_uri(uri);
        let asset = compose_asset(
            uri,
            |u| self.lookup_segment(u, overrides),
            |u| self.lookup_video(u, overrides),
        )?;
        Ok(self.postprocess_asset(asset))
    }

    /// The `type` tag is kept out of the rewrite so the asset stays decodable.
    pub(crate) fn postprocess_asset(&self, asset: Asset) -> Asset {
        if self.postprocessor.is_empty() {
            return asset;
        }
        Asset {
            uri: self.postprocessor.process_field("uri", &asset.uri),
            kind: asset.kind,
            video: asset.video.map(|doc| self.postprocess(doc)),
            segment: asset.segment.map(|doc| self.postprocess(doc)),
        }
    }

    pub fn encode_search(
        &self,
        query: &StructuredQuery,
        overrides: &Options,
    ) -> std::result::Result<EncodedQuery, EncodeError> {
        EncodedQuery::new(query, merge_options(search_defaults(), overrides))
    }

    pub fn encode_suggest(
        &self,
        query: &StructuredQuery,
        overrides: &Options,
    ) -> std::result::Result<EncodedQuery, EncodeError> {
        EncodedQuery::new(query, merge_options(suggest_defaults(), overrides))
    }

    pub fn search(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        let encoded = self.encode_search(query, overrides)?;
        self.search_encoded(&encoded)
    }

    pub fn search_encoded(&self, query: &EncodedQuery) -> Result<Document> {
        let query_object = query.to_query_object();
        let context = json!({"query": query_object});
        let mut results = self.call(method::SEARCH, vec![query_object], context.clone())?;
        if !results.is_object() {
            return Err(unexpected(method::SEARCH, "an object", &results, context).into());
        }
        if let Some(obj) = results.as_object_mut() {
            obj.insert("queryId".to_string(), Value::String(query.query_id.clone()));
        }
        Ok(self.postprocess(results))
    }

    pub fn suggest(&self, query: &StructuredQuery, overrides: &Options) -> Result<Document> {
        let encoded = self.encode_suggest(query, overrides)?;
        self.suggest_encoded(&encoded)
    }

    pub fn suggest_encoded(&self, query: &EncodedQuery) -> Result<Document> {
        let query_object = query.to_query_object();
        let context = json!({"query": query_object});
        let scores = self.call(method::SUGGEST_ENTITIES, vec![query_object], context.clone())?;
        let uris: Vec<String> = match &scores {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(unexpected(method::SUGGEST_ENTITIES, "an object", other, context).into());
            }
        };
        let entities = self.call(
            method::LOOKUP_ENTITY,
            vec![json!(uris), json!(query.options)],
            json!({"uris": uris, "options": query.options}),
        )?;
        let response = json!({"entities": entities, "queryId": query.query_id});
        Ok(self.postprocess(response))
    }

    pub fn find_related_videos(&self, uri: &str, overrides: &Options) -> Result<Document> {
        self.find_related(method::FIND_RELATED_VIDEOS, uri, overrides)
    }

    pub fn find_related_segments(&self, uri: &str, overrides: &Options) -> Result<Document> {
        self.find_related(method::FIND_RELATED_SEGMENTS, uri, overrides)
    }

    fn find_related(
        &self,
        operation: &'static str,
        uri: &str,
        overrides: &Options,
    ) -> Result<Document> {
        let uri = self.fix_uri(uri);
        let options = merge_options(related_defaults(), overrides);
        let limit = related_limit(&options)?;
        let context = json!({"uri": uri, "options": options});
        let mut related = self.call(operation, vec![json!(uri), json!(options)], context.clone())?;
        if !related.is_object() {
            return Err(unexpected(operation, "an object", &related, context).into());
        }
        // The backend ignores `limit` for related content, so enforce it here.
        if let Some(limit) = limit
            && let Some(Value::Array(ranking)) = related.get_mut("ranking")
        {
            ranking.truncate(limit);
        }
        Ok(self.postprocess(related))
    }

    pub fn get_keyframes(&self, uri: &str) -> Result<Document> {
        let uri = self.fix_uri(uri);
        let keyframes = self.call(method::GET_KEYFRAMES, vec![json!(uri)], json!({"uri": uri}))?;
        Ok(self.postprocess(json!({"keyframes": keyframes})))
    }

    pub fn get_transcript(&self, uri: &str) -> Result<Document> {
        let uri = self.fix_uri(uri);
        let speech = self.call(method::GET_SPEECH_SEGMENTS, vec![json!(uri)], json!({"uri": uri}))?;
        Ok(self.postprocess(json!({"transcript": speech})))
    }

    /// Face tracks are returned as-is, without post-processing.
    pub fn get_face_tracks(&self, uri: &str) -> Result<Document> {
        let uri = self.fix_uri(uri);
        let tracks = self.call(method::GET_FACE_TRACKS, vec![json!(uri)], json!({"uri": uri}))?;
        Ok(json!({"tracks": tracks}))
    }

    pub fn get_collection_statistics(&self) -> Result<Document> {
        let mut stats = serde_json::Map::new();
        for (name, limit) in &self.settings.stats {
            let value = self.call(
                method::LOOKUP_STAT,
                vec![json!(name), json!(limit)],
                json!({"name": name, "limit": limit}),
            )?;
            stats.insert(name.clone(), value);
        }
        Ok(self.postprocess(json!({"stats": stats})))
    }

    pub fn submit_feedback(&self, query_id: &str, value: &str, first: u64, count: u64) -> Result<()> {
        let token = query_id_token(query_id);
        self.call(
            method::SUBMIT_ANNOTATION_FOR_RESULTS,
            vec![json!(token), json!(first), json!(count), json!(FEEDBACK_ANNOTATION), json!(value)],
            json!({"query_id": token, "first": first, "count": count, "value": value}),
        )?;
        Ok(())
    }

    /// Time the remote index was last modified, in seconds since the epoch.
    pub fn get_last_update_time(&self) -> std::result::Result<f64, RemoteError> {
        let millis = self.call(method::GET_LAST_CHANGE, vec![], Value::Null)?;
        millis
            .as_f64()
            .map(|ms| ms / 1000.0)
            .ok_or_else(|| unexpected(method::GET_LAST_CHANGE, "a number", &millis, Value::Null))
    }

    pub fn get_service_info(&self) -> Result<Document> {
        let info = self.call(method::GET_SERVICE_INFO, vec![], Value::Null)?;
        Ok(self.postprocess(info))
    }

    pub fn get_version_info(&self) -> Result<VersionInfo> {
        let info = self.call(method::GET_VERSION_INFO, vec![], Value::Null)?;
        Ok(serde_json::from_value(self.postprocess(info))?)
    }

    pub fn get_available_services(&self) -> Result<Vec<String>> {
        let services = self.call(method::GET_AVAILABLE_SERVICES, vec![], Value::Null)?;
        match services {
            Value::Array(items) => Ok(items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()),
            other => Err(unexpected(method::GET_AVAILABLE_SERVICES, "an array", &other, Value::Null).into()),
        }
    }
}

/// Resolve a URI as a segment first, falling back to a video.
/// `limit` as a whole, non-negative count. JSON clients may send `5.0`.
fn related_limit(options: &Options) -> std::result::Result<Option<usize>, EncodeError> {
    let invalid = EncodeError::InvalidField {
        field: "limit",
        expected: "a non-negative integer",
    };
    match options.get("limit") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(whole) = n.as_u64() {
                return Ok(Some(usize::try_from(whole).unwrap_or(usize::MAX)));
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as usize)),
                _ => Err(invalid),
            }
        }
        Some(_) => Err(invalid),
    }
}

pub(crate) fn compose_asset<S, V>(uri: String, lookup_segment: S, lookup_video: V) -> Result<Asset>
where
    S: FnOnce(&str) -> Result<Option<Document>>,
    V: FnOnce(&str) -> Result<Option<Document>>,
{
    let segment = lookup_segment(&uri)?;
    let (kind, video) = match &segment {
        Some(seg) => {
            let parent = seg
                .get(VIDEO_URI_FIELD)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            (AssetKind::Segment, lookup_video(&parent)?)
        }
        None => (AssetKind::Video, lookup_video(&uri)?),
    };
    Ok(Asset {
        uri,
        kind,
        video,
        segment,
    })
}

fn unexpected(operation: &'static str, expected: &str, got: &Value, context: Value) -> RemoteError {
    let kind = match got {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    RemoteError::new(
        operation,
        TransportError::Protocol(format!("expected {expected}, got {kind}")),
        context,
    )
}
