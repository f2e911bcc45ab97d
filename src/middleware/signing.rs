//! Signing stage.

use alloy::primitives::keccak256;
use async_trait::async_trait;
use std::sync::Arc;

use crate::account::KeyPair;
use crate::middleware::tx::SignedTx;
use crate::middleware::{MiddlewareError, MiddlewareResult, TxContext, TxMiddlewareHandler};

/// Signs `keccak256(bytes)` and wraps the bytes in a `SignedTx`.
pub struct SignedTxMiddleware {
    keys: Arc<KeyPair>,
}

impl SignedTxMiddleware {
    pub fn new(keys: Arc<KeyPair>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl TxMiddlewareHandler for SignedTxMiddleware {
    fn name(&self) -> &'static str {
        "sign"
    }

    async fn handle(&self, tx: Vec<u8>, _ctx: &TxContext<'_>) -> MiddlewareResult<Vec<u8>> {
        let signature = self
            .keys
            .sign_hash(keccak256(&tx))
            .await
            .map_err(|e| MiddlewareError::Signing(e.to_string()))?;

        SignedTx {
            inner: tx,
            signature: signature.as_bytes().to_vec(),
            public_key: self.keys.public_key().to_vec(),
        }
        .encode()
        .map_err(|e| MiddlewareError::Envelope(e.to_string()))
    }
}
