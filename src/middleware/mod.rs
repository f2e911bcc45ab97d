//! Transaction middleware subsystem.
//!
//! # Data Flow
//! ```text
//! CallTx bytes (unsigned call descriptor)
//!     → nonce.rs   (query chain nonce, wrap in NonceTx { sequence = current + 1 })
//!     → signing.rs (sign keccak256(bytes), wrap in SignedTx)
//!     → bytes ready for broadcast
//! ```
//!
//! # Design Decisions
//! - Each stage is `(bytes, context) -> bytes`, testable on its own
//! - Stages run strictly in order; the first failure aborts the chain and no
//!   partially processed bytes leave it
//! - Stages own no transport: the nonce query arrives through `TxContext`

pub mod nonce;
pub mod signing;
pub mod tx;

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::account::KeyPair;

pub use nonce::NonceTxMiddleware;
pub use signing::SignedTxMiddleware;
pub use tx::{CallTx, NonceTx, SignedTx, VmType};

/// Errors raised by middleware stages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MiddlewareError {
    /// Chain nonce could not be fetched.
    #[error("Nonce fetch failed: {0}")]
    NonceFetch(String),

    /// The chain reported a nonce at or below one this client already used.
    #[error("Stale nonce: chain reported {reported}, sequence {last_assigned} already assigned")]
    StaleNonce { reported: u64, last_assigned: u64 },

    /// More than one stage tried to assign a nonce to the same transaction.
    #[error("Nonce already assigned ({0}) for this transaction")]
    NonceAlreadyAssigned(u64),

    /// Private key could not produce a signature.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Envelope could not be encoded.
    #[error("Envelope encoding failed: {0}")]
    Envelope(String),
}

/// Result type for middleware stages.
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;

/// Chain-side account nonce lookup.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Last committed sequence number for the account owning `public_key`.
    async fn current_nonce(&self, public_key: &[u8]) -> Result<u64, String>;
}

/// Per-transaction context handed to every stage.
pub struct TxContext<'a> {
    nonces: &'a dyn NonceSource,
    sequence: OnceLock<u64>,
}

impl<'a> TxContext<'a> {
    pub fn new(nonces: &'a dyn NonceSource) -> Self {
        Self {
            nonces,
            sequence: OnceLock::new(),
        }
    }

    /// Nonce lookup for this transaction.
    pub fn nonces(&self) -> &dyn NonceSource {
        self.nonces
    }

    /// Record the sequence assigned to this transaction. Allowed once.
    pub fn assign_sequence(&self, sequence: u64) -> MiddlewareResult<()> {
        self.sequence
            .set(sequence)
            .map_err(|_| MiddlewareError::NonceAlreadyAssigned(self.sequence().unwrap_or(sequence)))
    }

    /// Sequence assigned so far, if a nonce stage has run.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence.get().copied()
    }
}

/// One transformation applied to an outgoing transaction.
#[async_trait]
pub trait TxMiddlewareHandler: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Transform the transaction bytes.
    async fn handle(&self, tx: Vec<u8>, ctx: &TxContext<'_>) -> MiddlewareResult<Vec<u8>>;

    /// The transaction carrying `sequence` was not committed.
    fn release(&self, _sequence: u64) {}
}

/// Ordered pipeline of middleware stages.
pub struct TxMiddleware {
    handlers: Vec<Box<dyn TxMiddlewareHandler>>,
}

impl TxMiddleware {
    /// Build a pipeline from stages, applied in the given order.
    pub fn new(handlers: Vec<Box<dyn TxMiddlewareHandler>>) -> Self {
        Self { handlers }
    }

    /// The required pipeline: nonce stamping, then signing.
    pub fn standard(keys: Arc<KeyPair>) -> Self {
        Self::new(vec![
            Box::new(NonceTxMiddleware::new(keys.clone())),
            Box::new(SignedTxMiddleware::new(keys)),
        ])
    }

    /// Names of the stages in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every stage in order.
    pub async fn handle(&self, tx: Vec<u8>, ctx: &TxContext<'_>) -> MiddlewareResult<Vec<u8>> {
        let mut current = tx;
        for handler in &self.handlers {
            current = match handler.handle(current, ctx).await {
                Ok(next) => next,
                Err(e) => {
                    tracing::debug!(stage = handler.name(), error = %e, "Middleware stage failed");
                    return Err(e);
                }
            };
        }
        Ok(current)
    }

    /// Tell every stage that the transaction carrying `sequence` did not commit.
    pub fn release(&self, sequence: u64) {
        for handler in &self.handlers {
            handler.release(sequence);
        }
    }
}

impl std::fmt::Debug for TxMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxMiddleware")
            .field("stages", &self.stage_names())
            .finish()
    }
}
