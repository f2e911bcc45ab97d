//! RPC transport subsystem.
//!
//! # Data Flow
//! ```text
//! TransportConfig {endpoint_url, label, substrate, timeout_secs}
//!     → connect() picks the substrate
//!         http      → http.rs (JSON-RPC over HTTP POST, request/reply only)
//!         websocket → websocket.rs (persistent JSON-RPC socket, request/reply + push)
//!     → Box<dyn RpcTransport> owned by ChainClient
//! ```
//!
//! # Design Decisions
//! - One async call contract regardless of substrate; the caller suspends until
//!   a full response or a transport failure
//! - Connection, timeout and malformed-frame failures are distinct error kinds
//! - No retries at this layer; retry policy belongs to the caller

pub mod http;
pub mod types;
pub mod websocket;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Substrate, TransportConfig};

pub use http::HttpTransport;
pub use types::{EventSubscription, RawEvent, TransportError, TransportResult};
pub use websocket::WsTransport;

/// A request/response channel to a DAppChain endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Endpoint URL this transport talks to.
    fn endpoint(&self) -> &str;

    /// Label used in logs and metrics.
    fn label(&self) -> &str;

    /// Send one JSON-RPC request and wait for its result.
    async fn send(&self, method: &str, params: Value) -> TransportResult<Value>;

    /// Open a push subscription for events matching `topics`.
    async fn subscribe(&self, _topics: Vec<String>) -> TransportResult<EventSubscription> {
        Err(TransportError::Unsupported("subscribe"))
    }

    /// Cancel a subscription previously returned by [`RpcTransport::subscribe`].
    async fn unsubscribe(&self, _subscription: &str) -> TransportResult<()> {
        Err(TransportError::Unsupported("unsubscribe"))
    }
}

/// Build a transport for the configured substrate.
pub async fn connect(config: &TransportConfig) -> TransportResult<Box<dyn RpcTransport>> {
    let transport: Box<dyn RpcTransport> = match config.substrate {
        Substrate::Http => Box::new(HttpTransport::new(config)?),
        Substrate::WebSocket => Box::new(WsTransport::connect(config).await?),
    };

    tracing::info!(
        transport = %config.label,
        endpoint = %config.endpoint_url,
        substrate = %config.substrate,
        "Transport ready"
    );
    Ok(transport)
}
