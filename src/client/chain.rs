//! DAppChain client.
//!
//! # Responsibilities
//! - Resolve contract names through the chain registry
//! - Submit mutating calls: envelope → middleware → writer transport → commit
//! - Run static calls over the reader transport, bypassing middleware
//! - Serve the account-nonce query used by the nonce stage
//! - Open event subscriptions on the reader transport

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::account::{Address, KeyPair};
use crate::client::codec;
use crate::client::types::{
    methods, ChainError, ChainResult, TxReceipt, TxResult, CODE_INVALID_NONCE, CODE_OK,
};
use crate::config::{ClientConfig, RetryConfig};
use crate::middleware::{
    CallTx, MiddlewareError, NonceSource, TxContext, TxMiddleware, VmType,
};
use crate::observability::metrics;
use crate::resilience::retries::retry_on_conflict;
use crate::transport::{self, EventSubscription, RpcTransport};

/// Client for one DAppChain, owning its writer and reader transports.
pub struct ChainClient {
    /// Submission endpoint.
    writer: Box<dyn RpcTransport>,
    /// Query endpoint.
    reader: Box<dyn RpcTransport>,
    /// Pipeline applied to every outgoing transaction.
    middleware: TxMiddleware,
    /// Held across nonce → sign → commit so submissions never race for a sequence.
    submit_lock: Mutex<()>,
}

impl ChainClient {
    /// Create a client from already-built transports.
    pub fn new(
        writer: Box<dyn RpcTransport>,
        reader: Box<dyn RpcTransport>,
        middleware: TxMiddleware,
    ) -> Self {
        Self {
            writer,
            reader,
            middleware,
            submit_lock: Mutex::new(()),
        }
    }

    /// Connect both transports from config and install the standard middleware.
    pub async fn connect(config: &ClientConfig, keys: Arc<KeyPair>) -> ChainResult<Self> {
        let writer = transport::connect(&config.writer).await?;
        let reader = transport::connect(&config.reader).await?;

        tracing::info!(
            writer = %writer.endpoint(),
            reader = %reader.endpoint(),
            caller = %keys.address(),
            "Chain client initialized"
        );

        Ok(Self::new(writer, reader, TxMiddleware::standard(keys)))
    }

    /// The submission transport.
    pub fn writer(&self) -> &dyn RpcTransport {
        self.writer.as_ref()
    }

    /// The query transport.
    pub fn reader(&self) -> &dyn RpcTransport {
        self.reader.as_ref()
    }

    /// The installed middleware pipeline.
    pub fn middleware(&self) -> &TxMiddleware {
        &self.middleware
    }

    /// Look up a contract address by its registered name.
    pub async fn resolve_contract_address(&self, name: &str) -> ChainResult<Address> {
        let result = self
            .reader
            .send(methods::RESOLVE, json!({ "name": name }))
            .await?;

        match result {
            Value::Null => Err(ChainError::NotFound(name.to_string())),
            Value::String(hex) if hex.is_empty() => Err(ChainError::NotFound(name.to_string())),
            Value::String(hex) => {
                let address = Address::from_hex(&hex)?;
                tracing::debug!(name, contract = %address, "Contract resolved");
                Ok(address)
            }
            other => Err(ChainError::Decode(format!(
                "registry entry for '{}' must be a hex string, got {}",
                name, other
            ))),
        }
    }

    /// Last committed sequence for the account owning `public_key`.
    pub async fn get_nonce(&self, public_key: &[u8]) -> ChainResult<u64> {
        let result = self
            .reader
            .send(methods::NONCE, json!({ "key": codec::to_hex(public_key) }))
            .await?;

        // Nodes may render the counter as a number or a decimal string.
        result
            .as_u64()
            .or_else(|| result.as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| ChainError::Decode(format!("nonce must be an integer, got {}", result)))
    }

    /// Sign and submit a mutating call, waiting until the chain commits or rejects it.
    pub async fn call_async(
        &self,
        contract: Address,
        caller: Address,
        vm: VmType,
        input: Vec<u8>,
    ) -> ChainResult<TxReceipt> {
        let _guard = self.submit_lock.lock().await;

        let unsigned = CallTx {
            vm,
            contract,
            caller,
            input,
        }
        .encode()
        .map_err(|e| MiddlewareError::Envelope(e.to_string()))?;

        let ctx = TxContext::new(self);
        let signed = match self.middleware.handle(unsigned, &ctx).await {
            Ok(signed) => signed,
            Err(e) => {
                if let Some(sequence) = ctx.sequence() {
                    self.middleware.release(sequence);
                }
                return Err(e.into());
            }
        };
        let sequence = ctx.sequence();

        let result = self.broadcast(contract, &signed, sequence).await;
        if let (Err(_), Some(sequence)) = (&result, sequence) {
            self.middleware.release(sequence);
        }
        result
    }

    /// Submit a signed transaction and map the chain's verdict.
    async fn broadcast(
        &self,
        contract: Address,
        signed: &[u8],
        sequence: Option<u64>,
    ) -> ChainResult<TxReceipt> {
        let reply = match self
            .writer
            .send(
                methods::BROADCAST_TX_COMMIT,
                json!({ "tx": codec::to_hex(signed) }),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                metrics::record_tx("transport_error");
                return Err(e.into());
            }
        };

        let result: TxResult = serde_json::from_value(reply)
            .map_err(|e| ChainError::Decode(format!("broadcast result: {}", e)))?;

        match result.code {
            CODE_OK => {
                metrics::record_tx("committed");
                tracing::info!(
                    contract = %contract,
                    sequence = ?sequence,
                    hash = %result.hash,
                    height = result.height,
                    "Transaction committed"
                );
                Ok(TxReceipt {
                    hash: result.hash,
                    sequence,
                    height: result.height,
                })
            }
            CODE_INVALID_NONCE => {
                metrics::record_tx("nonce_conflict");
                tracing::warn!(contract = %contract, sequence = ?sequence, log = %result.log, "Nonce conflict");
                Err(ChainError::NonceConflict {
                    sequence,
                    log: result.log,
                })
            }
            code => {
                metrics::record_tx("rejected");
                tracing::warn!(contract = %contract, code, log = %result.log, "Transaction rejected");
                Err(ChainError::TxRejected {
                    code,
                    log: result.log,
                })
            }
        }
    }

    /// [`ChainClient::call_async`], resubmitting on nonce conflict per `retry`.
    pub async fn call_with_retry(
        &self,
        retry: &RetryConfig,
        contract: Address,
        caller: Address,
        vm: VmType,
        input: Vec<u8>,
    ) -> ChainResult<TxReceipt> {
        retry_on_conflict(retry, |_attempt| {
            self.call_async(contract, caller, vm, input.clone())
        })
        .await
    }

    /// Run a read-only query and return the raw output bytes.
    ///
    /// `method` names the call in errors; the node only sees `input`.
    pub async fn query_raw(
        &self,
        contract: Address,
        caller: Address,
        vm: VmType,
        method: &str,
        input: &[u8],
    ) -> ChainResult<Vec<u8>> {
        let result = self
            .reader
            .send(
                methods::QUERY,
                json!({
                    "contract": contract,
                    "caller": caller,
                    "vm": vm,
                    "input": codec::to_hex(input),
                }),
            )
            .await?;

        codec::query_output(method, result)
    }

    /// Read-only call on a plain contract, decoded into `T`.
    pub async fn static_call_async<A, T>(
        &self,
        contract: Address,
        caller: Address,
        method: &str,
        args: &A,
    ) -> ChainResult<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let input = codec::encode_plain_call(method, args)?;
        let output = self
            .query_raw(contract, caller, VmType::Plain, method, &input)
            .await?;
        codec::decode_plain_result(method, &output)
    }

    /// Open a push subscription for events emitted by `contract`.
    pub async fn subscribe(&self, contract: Address) -> ChainResult<EventSubscription> {
        Ok(self.reader.subscribe(vec![contract.to_hex()]).await?)
    }

    /// Cancel a subscription.
    pub async fn unsubscribe(&self, subscription: &str) -> ChainResult<()> {
        Ok(self.reader.unsubscribe(subscription).await?)
    }
}

#[async_trait]
impl NonceSource for ChainClient {
    async fn current_nonce(&self, public_key: &[u8]) -> Result<u64, String> {
        self.get_nonce(public_key).await.map_err(|e| e.to_string())
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("writer", &self.writer.endpoint())
            .field("reader", &self.reader.endpoint())
            .field("middleware", &self.middleware)
            .finish()
    }
}
