//! Client-level types, wire constants and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::AccountError;
use crate::middleware::MiddlewareError;
use crate::transport::TransportError;

/// JSON-RPC method names spoken by the DAppChain node.
pub mod methods {
    pub const RESOLVE: &str = "resolve";
    pub const NONCE: &str = "nonce";
    pub const BROADCAST_TX_COMMIT: &str = "broadcast_tx_commit";
    pub const QUERY: &str = "query";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
}

/// Result code of a committed transaction.
pub const CODE_OK: u32 = 0;

/// Result code the node uses when the transaction's sequence is not the next one.
pub const CODE_INVALID_NONCE: u32 = 2;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport failed (connection, timeout, malformed frame, RPC error).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Registry has no contract under this name.
    #[error("Contract '{0}' not found in registry")]
    NotFound(String),

    /// A middleware stage aborted the submission.
    #[error("Middleware error: {0}")]
    Middleware(#[from] MiddlewareError),

    /// Response does not have the expected shape or type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Static call returned nothing.
    #[error("Static call '{method}' returned no value")]
    EmptyResult { method: String },

    /// Chain rejected the sequence number; retry with a fresh nonce.
    #[error("Nonce conflict (sequence {sequence:?}): {log}")]
    NonceConflict { sequence: Option<u64>, log: String },

    /// Chain rejected the transaction for another reason.
    #[error("Transaction rejected with code {code}: {log}")]
    TxRejected { code: u32, log: String },

    /// Arguments do not fit the contract ABI.
    #[error("ABI error: {0}")]
    Abi(String),

    /// Key or address problem.
    #[error("Account error: {0}")]
    Account(#[from] AccountError),
}

impl ChainError {
    /// Whether resubmitting with a freshly fetched nonce may succeed.
    pub fn is_nonce_conflict(&self) -> bool {
        matches!(
            self,
            ChainError::NonceConflict { .. }
                | ChainError::Middleware(MiddlewareError::StaleNonce { .. })
        )
    }
}

/// Result type for client operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Node reply to `broadcast_tx_commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResult {
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub height: u64,
}

/// Proof that the chain committed a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash reported by the node.
    pub hash: String,
    /// Sequence number assigned by the nonce stage.
    pub sequence: Option<u64>,
    /// Block height of inclusion.
    pub height: u64,
}
