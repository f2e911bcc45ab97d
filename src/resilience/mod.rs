//! Resilience helpers for transaction submission.
//!
//! # Data Flow
//! ```text
//! call_with_retry:
//!     → retries.rs (run submission, inspect error)
//!     → NonceConflict: backoff.rs delay, resubmit with a fresh nonce
//!     → anything else: surface unchanged
//! ```
//!
//! # Design Decisions
//! - Only nonce conflicts are retried; a rejected or failed tx is final
//! - Retry is opt-in through `RetryConfig::enabled`

pub mod backoff;
pub mod retries;
