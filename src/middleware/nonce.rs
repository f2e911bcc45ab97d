//! Nonce stamping stage.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::account::KeyPair;
use crate::middleware::tx::NonceTx;
use crate::middleware::{MiddlewareError, MiddlewareResult, TxContext, TxMiddlewareHandler};

/// Wraps a transaction in a `NonceTx` carrying the next account sequence.
///
/// The chain reports the last committed sequence; this stage assigns the one
/// after it. Sequential submissions that each wait for commit therefore get
/// consecutive sequences.
///
/// A sequence is never handed out twice: a chain value that would repeat or
/// go below the last assigned sequence fails with `StaleNonce`. Released
/// sequences (transactions that did not commit) may be assigned again.
pub struct NonceTxMiddleware {
    keys: Arc<KeyPair>,
    /// Highest sequence assigned so far; 0 before the first transaction.
    last_assigned: AtomicU64,
}

impl NonceTxMiddleware {
    pub fn new(keys: Arc<KeyPair>) -> Self {
        Self {
            keys,
            last_assigned: AtomicU64::new(0),
        }
    }

    /// Highest sequence currently held by this stage.
    pub fn last_assigned(&self) -> u64 {
        self.last_assigned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxMiddlewareHandler for NonceTxMiddleware {
    fn name(&self) -> &'static str {
        "nonce"
    }

    async fn handle(&self, tx: Vec<u8>, ctx: &TxContext<'_>) -> MiddlewareResult<Vec<u8>> {
        let current = ctx
            .nonces()
            .current_nonce(self.keys.public_key())
            .await
            .map_err(MiddlewareError::NonceFetch)?;

        let sequence = current
            .checked_add(1)
            .ok_or_else(|| MiddlewareError::NonceFetch("account nonce exhausted".to_string()))?;

        let last_assigned = self.last_assigned();
        if sequence <= last_assigned {
            tracing::warn!(
                address = %self.keys.address(),
                reported = current,
                last_assigned,
                "Chain nonce behind local sequence"
            );
            return Err(MiddlewareError::StaleNonce {
                reported: current,
                last_assigned,
            });
        }

        ctx.assign_sequence(sequence)?;
        self.last_assigned.fetch_max(sequence, Ordering::SeqCst);

        tracing::debug!(address = %self.keys.address(), sequence, "Nonce assigned");

        NonceTx { inner: tx, sequence }
            .encode()
            .map_err(|e| MiddlewareError::Envelope(e.to_string()))
    }

    fn release(&self, sequence: u64) {
        // Only the newest assignment can be rolled back.
        let _ = self.last_assigned.compare_exchange(
            sequence,
            sequence.saturating_sub(1),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}
