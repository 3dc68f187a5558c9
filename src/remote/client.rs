//! Blocking JSON-RPC client for the remote index over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use super::protocol::{RpcRequest, RpcResponse, Transport};
use crate::error::TransportError;

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// JSON-RPC endpoint of the remote index.
    pub service_url: String,
    /// Per-request timeout. `None` leaves requests unbounded; callers that
    /// need bounded latency wrap the facade themselves.
    pub request_timeout: Option<Duration>,
}

impl HttpTransportConfig {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            request_timeout: None,
        }
    }
}

pub struct HttpTransport {
    config: HttpTransportConfig,
    client: reqwest::blocking::Client,
    request_counter: AtomicU64,
}

impl HttpTransport {
    /// Build the HTTP client. No request is sent until the first call.
    pub fn connect(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("ricache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect {
                url: config.service_url.clone(),
                message: e.to_string(),
            })?;
        info!(url = %config.service_url, "created remote index transport");
        Ok(Self {
            config,
            client,
            request_counter: AtomicU64::new(0),
        })
    }

    pub fn service_url(&self) -> &str {
        &self.config.service_url
    }
}

impl Transport for HttpTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        debug!(request_id = id, method, "remote index request");

        let response = self
            .client
            .post(&self.config.service_url)
            .header("Accept", "application/json")
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: RpcResponse = response.json()?;
        body.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_no_timeout() {
        let config = HttpTransportConfig::new("http://localhost:8080/json-rpc");
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn connect_does_not_touch_the_network() {
        let transport =
            HttpTransport::connect(HttpTransportConfig::new("http://127.0.0.1:9/json-rpc"))
                .expect("client builds offline");
        assert_eq!(transport.service_url(), "http://127.0.0.1:9/json-rpc");
    }

    #[test]
    fn unreachable_service_surfaces_http_error() {
        let config = HttpTransportConfig {
            service_url: "http://127.0.0.1:9/json-rpc".into(),
            request_timeout: Some(Duration::from_secs(2)),
        };
        let transport = HttpTransport::connect(config).unwrap();
        let err = transport.call("getLastChange", vec![]).unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }

    #[test]
    fn request_counter_increments() {
        let transport = HttpTransport::connect(HttpTransportConfig::new("http://x/")).unwrap();
        let first = transport.request_counter.fetch_add(1, Ordering::Relaxed);
        let second = transport.request_counter.fetch_add(1, Ordering::Relaxed);
        assert_eq!(second, first + 1);
    }
}
