//! DAppChain client subsystem.
//!
//! # Data Flow
//! ```text
//! Mutating call:
//!     CallTx → middleware (nonce, sign) → writer transport "broadcast_tx_commit"
//!     → TxResult code → TxReceipt | NonceConflict | TxRejected
//!
//! Static call:
//!     input → reader transport "query" → hex output → typed decode
//!     (no nonce, no signature)
//! ```
//!
//! # Design Decisions
//! - Writer and reader transports are owned exclusively by the client
//! - Submissions are serialized per client so nonces are assigned in order
//! - Every failure surfaces as a distinct `ChainError` variant

pub mod chain;
pub mod codec;
pub mod types;

pub use chain::ChainClient;
pub use types::{ChainError, ChainResult, TxReceipt};
