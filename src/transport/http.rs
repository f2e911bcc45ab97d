//! Request/reply transport over HTTP.
//!
//! Every call is one `POST` of a JSON-RPC frame to the endpoint. The substrate
//! cannot push, so subscriptions are reported as unsupported.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::config::TransportConfig;
use crate::observability::metrics;
use crate::transport::types::{RpcRequest, RpcResponse, TransportError, TransportResult};
use crate::transport::RpcTransport;

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    label: String,
    timeout_duration: Duration,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport for `config.endpoint_url`.
    ///
    /// No connection is made until the first request.
    pub fn new(config: &TransportConfig) -> TransportResult<Self> {
        url::Url::parse(&config.endpoint_url).map_err(|e| TransportError::Connection {
            endpoint: config.endpoint_url.clone(),
            reason: format!("invalid URL: {}", e),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TransportError::Connection {
                endpoint: config.endpoint_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint_url.clone(),
            label: config.label.clone(),
            timeout_duration: config.timeout(),
            next_id: AtomicU64::new(1),
        })
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout {
            endpoint: self.endpoint.clone(),
            timeout_secs: self.timeout_duration.as_secs(),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> TransportError {
        TransportError::Malformed {
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            self.timeout_error()
        } else if e.is_decode() || e.is_body() {
            self.malformed(e.to_string())
        } else {
            TransportError::Connection {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }
        }
    }

    async fn round_trip(&self, method: &str, params: &Value) -> TransportResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        let fut = async {
            let resp = self
                .client
                .post(&self.endpoint)
                .json(&request)
                .send()
                .await
                .map_err(|e| self.map_reqwest_error(e))?;

            let status = resp.status();
            let text = resp.text().await.map_err(|e| self.map_reqwest_error(e))?;

            if !status.is_success() {
                return Err(self.malformed(format!("HTTP status {}: {}", status, text)));
            }

            let frame: RpcResponse = serde_json::from_str(&text)
                .map_err(|e| self.malformed(format!("invalid JSON-RPC frame: {}", e)))?;

            if frame.id != Some(id) {
                return Err(self.malformed(format!(
                    "response id {:?} does not match request id {}",
                    frame.id, id
                )));
            }
            frame.into_result()
        };

        match timeout(self.timeout_duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, method: &str, params: Value) -> TransportResult<Value> {
        let start = Instant::now();
        let result = self.round_trip(method, &params).await;

        match &result {
            Ok(_) => {
                tracing::trace!(transport = %self.label, method, "RPC ok");
                metrics::record_rpc(&self.label, method, "ok", start);
            }
            Err(e) => {
                tracing::debug!(transport = %self.label, method, error = %e, "RPC failed");
                metrics::record_rpc(&self.label, method, e.kind(), start);
            }
        }
        result
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("label", &self.label)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
