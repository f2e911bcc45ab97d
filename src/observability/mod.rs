//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Transports, middleware, client, contract listeners produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional, installed by the binary)
//! ```
//!
//! # Design Decisions
//! - Every transport event carries the transport label and RPC method
//! - Key material never appears in log fields
//! - Metric updates are fire-and-forget; with no recorder installed they are no-ops

pub mod logging;
pub mod metrics;
