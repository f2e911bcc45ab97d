//! Proxy for ABI-described EVM contracts.

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::U256;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::account::Address;
use crate::client::{ChainClient, ChainError, ChainResult, TxReceipt};
use crate::config::RetryConfig;
use crate::contract::event::{ChainEvent, EventRegistry};
use crate::middleware::VmType;
use crate::observability::metrics;
use crate::transport::RawEvent;

/// Handle to an EVM contract with a parsed ABI.
#[derive(Debug, Clone)]
pub struct EvmContract {
    client: Arc<ChainClient>,
    address: Address,
    caller: Address,
    abi: JsonAbi,
    events: Arc<EventRegistry>,
}

impl EvmContract {
    /// Bind to `address` using the JSON ABI in `abi_json`.
    pub fn new(
        client: Arc<ChainClient>,
        address: Address,
        caller: Address,
        abi_json: &str,
    ) -> ChainResult<Self> {
        let abi: JsonAbi = serde_json::from_str(abi_json)
            .map_err(|e| ChainError::Abi(format!("invalid ABI JSON: {}", e)))?;
        let events = Arc::new(EventRegistry::from_abi(&abi));
        Ok(Self {
            client,
            address,
            caller,
            abi,
            events,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// The overload of `method` taking `args.len()` inputs.
    fn function(&self, method: &str, args: &[DynSolValue]) -> ChainResult<&Function> {
        let overloads = self
            .abi
            .function(method)
            .ok_or_else(|| ChainError::Abi(format!("unknown method '{}'", method)))?;
        overloads
            .iter()
            .find(|f| f.inputs.len() == args.len())
            .ok_or_else(|| {
                let expected: Vec<String> =
                    overloads.iter().map(|f| f.inputs.len().to_string()).collect();
                ChainError::Abi(format!(
                    "'{}' takes {} argument(s), got {}",
                    method,
                    expected.join(" or "),
                    args.len()
                ))
            })
    }

    fn encode_input(&self, method: &str, args: &[DynSolValue]) -> ChainResult<(&Function, Vec<u8>)> {
        let function = self.function(method, args)?;
        let input = function
            .abi_encode_input(args)
            .map_err(|e| ChainError::Abi(format!("arguments for '{}': {}", method, e)))?;
        Ok((function, input))
    }

    /// Submit a state-changing call.
    pub async fn call(&self, method: &str, args: &[DynSolValue]) -> ChainResult<TxReceipt> {
        let (_, input) = self.encode_input(method, args)?;
        self.client
            .call_async(self.address, self.caller, VmType::Evm, input)
            .await
    }

    /// [`EvmContract::call`], resubmitting on nonce conflict.
    pub async fn call_with_retry(
        &self,
        retry: &RetryConfig,
        method: &str,
        args: &[DynSolValue],
    ) -> ChainResult<TxReceipt> {
        let (_, input) = self.encode_input(method, args)?;
        self.client
            .call_with_retry(retry, self.address, self.caller, VmType::Evm, input)
            .await
    }

    /// Read-only call returning every declared output.
    pub async fn static_call(&self, method: &str, args: &[DynSolValue]) -> ChainResult<Vec<DynSolValue>> {
        let (function, input) = self.encode_input(method, args)?;
        let output = self
            .client
            .query_raw(self.address, self.caller, VmType::Evm, method, &input)
            .await?;
        function
            .abi_decode_output(&output)
            .map_err(|e| ChainError::Decode(format!("output of '{}': {}", method, e)))
    }

    /// Read-only call with a single primitive output.
    pub async fn static_call_simple<T: SimpleOutput>(
        &self,
        method: &str,
        args: &[DynSolValue],
    ) -> ChainResult<T> {
        let mut outputs = self.static_call(method, args).await?;
        if outputs.len() != 1 {
            return Err(ChainError::Decode(format!(
                "'{}' returns {} values, expected one",
                method,
                outputs.len()
            )));
        }
        let value = outputs.remove(0);
        T::from_sol(value).ok_or_else(|| {
            ChainError::Decode(format!(
                "output of '{}' is not a {}",
                method,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Deliver every event this contract emits to `callback` until unsubscribed.
    ///
    /// Events whose topic is not in the ABI arrive with `event_name = None`.
    /// Events that cannot be parsed at all are logged; use
    /// [`EvmContract::subscribe_with_errors`] to receive them.
    pub async fn subscribe<F>(&self, callback: F) -> ChainResult<Subscription>
    where
        F: Fn(ChainEvent) + Send + Sync + 'static,
    {
        let contract = self.address;
        self.subscribe_with_errors(callback, move |raw: RawEvent, e: ChainError| {
            warn!(contract = %contract, raw_contract = %raw.contract, error = %e, "Unparseable event");
        })
        .await
    }

    /// Like [`EvmContract::subscribe`], handing events that fail to parse to
    /// `on_error` together with the payload exactly as the node pushed it.
    pub async fn subscribe_with_errors<F, E>(&self, callback: F, on_error: E) -> ChainResult<Subscription>
    where
        F: Fn(ChainEvent) + Send + Sync + 'static,
        E: Fn(RawEvent, ChainError) + Send + Sync + 'static,
    {
        let subscription = self.client.subscribe(self.address).await?;
        let id = subscription.id;
        let mut events = subscription.events;
        let registry = self.events.clone();
        let contract = self.address;

        info!(contract = %contract, subscription = %id, "Listening for contract events");

        let task = tokio::spawn(async move {
            while let Some(raw) = events.recv().await {
                match ChainEvent::from_raw(raw.clone(), &registry) {
                    Ok(event) => {
                        metrics::record_event(event.event_name.as_deref());
                        debug!(
                            contract = %contract,
                            event = event.event_name.as_deref().unwrap_or("<unknown>"),
                            height = event.block_height,
                            "Event received"
                        );
                        callback(event);
                    }
                    Err(e) => {
                        metrics::record_event_error();
                        on_error(raw, e);
                    }
                }
            }
            debug!(contract = %contract, "Event stream closed");
        });

        Ok(Subscription {
            id,
            client: self.client.clone(),
            task,
            cancelled: false,
        })
    }
}

/// Active event delivery for one contract.
///
/// Dropping it stops the listener and cancels the subscription on the node in
/// the background.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    client: Arc<ChainClient>,
    task: JoinHandle<()>,
    cancelled: bool,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancel on the node and stop the listener.
    pub async fn unsubscribe(mut self) -> ChainResult<()> {
        self.cancelled = true;
        self.task.abort();
        self.client.unsubscribe(&self.id).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        if self.cancelled {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let id = std::mem::take(&mut self.id);
        runtime.spawn(async move {
            if let Err(e) = client.unsubscribe(&id).await {
                debug!(subscription = %id, error = %e, "Background unsubscribe failed");
            }
        });
    }
}

/// A primitive that a single ABI value converts into.
pub trait SimpleOutput: Sized {
    fn from_sol(value: DynSolValue) -> Option<Self>;
}

impl SimpleOutput for String {
    fn from_sol(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl SimpleOutput for bool {
    fn from_sol(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl SimpleOutput for U256 {
    fn from_sol(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::Uint(v, _) => Some(v),
            _ => None,
        }
    }
}

impl SimpleOutput for u64 {
    fn from_sol(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::Uint(v, _) => u64::try_from(v).ok(),
            _ => None,
        }
    }
}

impl SimpleOutput for Address {
    fn from_sol(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::Address(a) => Some(a.into()),
            _ => None,
        }
    }
}

impl SimpleOutput for Vec<u8> {
    fn from_sol(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::Bytes(b) => Some(b),
            DynSolValue::FixedBytes(word, size) => Some(word[..size].to_vec()),
            _ => None,
        }
    }
}
