//! JSON-RPC framing and transport error definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Method name used by the node for subscription notifications.
pub const NOTIFICATION_METHOD: &str = "subscription";

/// Errors that can occur at the transport boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// Endpoint refused or dropped the connection.
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// No response within the configured timeout.
    #[error("Request to {endpoint} timed out after {timeout_secs} seconds")]
    Timeout { endpoint: String, timeout_secs: u64 },

    /// Response was not a valid JSON-RPC frame.
    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    /// Node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Operation not available on this substrate.
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
}

impl TransportError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connection { .. } => "connection",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Malformed { .. } => "malformed",
            TransportError::Rpc { .. } => "rpc_error",
            TransportError::Unsupported(_) => "unsupported",
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Outgoing JSON-RPC request.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Incoming frame: either a response (has `id`) or a notification (has `method`).
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcResponse {
    /// Whether this frame is a subscription push rather than a reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.as_deref() == Some(NOTIFICATION_METHOD)
    }

    /// Convert into the call result; an absent result is JSON `null`.
    pub fn into_result(self) -> TransportResult<Value> {
        match self.error {
            Some(err) => Err(TransportError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Payload of a subscription notification.
#[derive(Debug, Deserialize)]
pub struct SubscriptionNotification {
    pub subscription: String,
    pub result: RawEvent,
}

/// An event exactly as the node pushed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Emitting contract, hex.
    #[serde(default)]
    pub contract: String,
    /// Log topics, hex; the first is the event signature hash.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Non-indexed payload, hex.
    #[serde(default)]
    pub data: String,
    /// Height of the block that emitted the event.
    #[serde(default)]
    pub block_height: u64,
}

/// A live push subscription.
#[derive(Debug)]
pub struct EventSubscription {
    /// Node-assigned subscription id.
    pub id: String,
    /// Events in arrival order; closes when the subscription or socket ends.
    pub events: mpsc::UnboundedReceiver<RawEvent>,
}
