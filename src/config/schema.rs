//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Root configuration for a DAppChain client session.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Submission endpoint (signed transactions).
    #[serde(deserialize_with = "deserialize_writer")]
    pub writer: TransportConfig,

    /// Query endpoint (static calls, nonce, registry, events).
    #[serde(deserialize_with = "deserialize_reader")]
    pub reader: TransportConfig,

    /// Retry policy for nonce conflicts.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Contracts used by the demo binary.
    pub contracts: ContractsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::local_http()
    }
}

impl ClientConfig {
    /// Quickstart layout: both endpoints over HTTP on a local node.
    pub fn local_http() -> Self {
        Self::local(Substrate::Http)
    }

    /// Quickstart layout: both endpoints over WebSocket on a local node.
    pub fn local_websocket() -> Self {
        Self::local(Substrate::WebSocket)
    }

    fn local(substrate: Substrate) -> Self {
        Self {
            writer: TransportConfig::local_writer(substrate),
            reader: TransportConfig::local_reader(substrate),
            retries: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
            contracts: ContractsConfig::default(),
        }
    }
}

/// A `[writer]` or `[reader]` table as written; absent keys keep the role's defaults.
#[derive(Debug, Default, Deserialize)]
struct TransportSection {
    endpoint_url: Option<String>,
    label: Option<String>,
    substrate: Option<Substrate>,
    timeout_secs: Option<u64>,
}

impl TransportSection {
    fn merge(self, role_default: fn(Substrate) -> TransportConfig) -> TransportConfig {
        let mut config = role_default(self.substrate.unwrap_or_default());
        if let Some(endpoint_url) = self.endpoint_url {
            config.endpoint_url = endpoint_url;
        }
        if let Some(label) = self.label {
            config.label = label;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        config
    }
}

fn deserialize_writer<'de, D: Deserializer<'de>>(de: D) -> Result<TransportConfig, D::Error> {
    Ok(TransportSection::deserialize(de)?.merge(TransportConfig::local_writer))
}

fn deserialize_reader<'de, D: Deserializer<'de>>(de: D) -> Result<TransportConfig, D::Error> {
    Ok(TransportSection::deserialize(de)?.merge(TransportConfig::local_reader))
}

/// Which channel a transport runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Substrate {
    /// Request/reply JSON-RPC over HTTP POST.
    #[default]
    Http,
    /// Persistent JSON-RPC socket.
    #[serde(alias = "ws", alias = "socket")]
    WebSocket,
}

impl Substrate {
    /// URL schemes this substrate accepts.
    pub fn schemes(&self) -> &'static [&'static str] {
        match self {
            Substrate::Http => &["http", "https"],
            Substrate::WebSocket => &["ws", "wss"],
        }
    }
}

impl std::fmt::Display for Substrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Substrate::Http => f.write_str("http"),
            Substrate::WebSocket => f.write_str("websocket"),
        }
    }
}

/// Immutable settings for one RPC transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Endpoint URL (e.g., "http://127.0.0.1:46658/rpc").
    pub endpoint_url: String,

    /// Name attached to every log line and metric from this transport.
    pub label: String,

    /// Channel type.
    pub substrate: Substrate,

    /// Per-request timeout in seconds. Also bounds the socket handshake.
    pub timeout_secs: u64,
}

impl TransportConfig {
    /// Create a config for an endpoint; label defaults to "rpc".
    pub fn new(endpoint_url: impl Into<String>, substrate: Substrate) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            substrate,
            ..Self::default()
        }
    }

    /// Submission endpoint of a local node.
    pub fn local_writer(substrate: Substrate) -> Self {
        let url = match substrate {
            Substrate::Http => "http://127.0.0.1:46658/rpc",
            Substrate::WebSocket => "ws://127.0.0.1:46658/websocket",
        };
        Self::new(url, substrate).with_label("writer")
    }

    /// Query endpoint of a local node.
    pub fn local_reader(substrate: Substrate) -> Self {
        let url = match substrate {
            Substrate::Http => "http://127.0.0.1:46658/query",
            Substrate::WebSocket => "ws://127.0.0.1:46658/queryws",
        };
        Self::new(url, substrate).with_label("reader")
    }

    /// Set the log/metric label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:46658/rpc".to_string(),
            label: "rpc".to_string(),
            substrate: Substrate::Http,
            timeout_secs: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries on nonce conflict.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Contracts the demo binary talks to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractsConfig {
    /// Registry name of the key/value contract.
    pub plain_name: String,

    /// Literal address of the tile-map EVM contract.
    pub evm_address: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            plain_name: "BluePrint".to_string(),
            evm_address: "0xf420fbbb810698a74120df3723315ee06f472870".to_string(),
        }
    }
}
