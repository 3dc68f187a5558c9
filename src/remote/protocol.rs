//! JSON-RPC 2.0 envelopes spoken by the remote index, and the transport seam.
//!
//! The remote index is a request/response RPC service. Every capability is a
//! named method taking positional parameters; the method names below are the
//! full surface this crate consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

pub const JSONRPC_VERSION: &str = "2.0";

pub mod method {
    pub const LOOKUP: &str = "lookup";
    pub const SEARCH: &str = "search";
    pub const SUGGEST_ENTITIES: &str = "suggestEntities";
    pub const LOOKUP_ENTITY: &str = "lookupEntity";
    pub const FIND_RELATED_VIDEOS: &str = "findRelatedVideos";
    pub const FIND_RELATED_SEGMENTS: &str = "findRelatedSegments";
    pub const GET_KEYFRAMES: &str = "getKeyframes";
    pub const GET_SPEECH_SEGMENTS: &str = "getSpeechSegments";
    pub const GET_FACE_TRACKS: &str = "getFaceTracks";
    pub const LOOKUP_STAT: &str = "lookupStat";
    pub const SUBMIT_ANNOTATION_FOR_RESULTS: &str = "submitAnnotationForResults";
    pub const GET_LAST_CHANGE: &str = "getLastChange";
    pub const GET_SERVICE_INFO: &str = "getServiceInfo";
    pub const GET_VERSION_INFO: &str = "getVersionInfo";
    pub const GET_AVAILABLE_SERVICES: &str = "getAvailableServices";
}

/// A single blocking RPC round trip to the remote index.
///
/// Implementations must be shareable across request threads; the facade
/// holds one per instance for its whole lifetime.
pub trait Transport: Send + Sync {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcResponse {
    /// Unwrap the result, turning an error object into a `TransportError`.
    /// A missing result is a JSON `null` (void methods return nothing).
    pub fn into_result(self) -> Result<Value, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}
