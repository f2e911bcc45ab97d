//! Proxy for name-registered plain contracts.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::account::Address;
use crate::client::codec::encode_plain_call;
use crate::client::{ChainClient, ChainResult, TxReceipt};
use crate::config::RetryConfig;
use crate::middleware::VmType;

/// Handle to a plain contract at a fixed address.
#[derive(Debug, Clone)]
pub struct Contract {
    client: Arc<ChainClient>,
    address: Address,
    caller: Address,
}

impl Contract {
    pub fn new(client: Arc<ChainClient>, address: Address, caller: Address) -> Self {
        Self {
            client,
            address,
            caller,
        }
    }

    /// Bind to the contract registered under `name`.
    pub async fn resolve(client: Arc<ChainClient>, name: &str, caller: Address) -> ChainResult<Self> {
        let address = client.resolve_contract_address(name).await?;
        Ok(Self::new(client, address, caller))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn client(&self) -> &Arc<ChainClient> {
        &self.client
    }

    /// Submit a state-changing call.
    pub async fn call<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> ChainResult<TxReceipt> {
        let input = encode_plain_call(method, args)?;
        self.client
            .call_async(self.address, self.caller, VmType::Plain, input)
            .await
    }

    /// [`Contract::call`], resubmitting on nonce conflict.
    pub async fn call_with_retry<A: Serialize + ?Sized>(
        &self,
        retry: &RetryConfig,
        method: &str,
        args: &A,
    ) -> ChainResult<TxReceipt> {
        let input = encode_plain_call(method, args)?;
        self.client
            .call_with_retry(retry, self.address, self.caller, VmType::Plain, input)
            .await
    }

    /// Read-only call decoded into `T`.
    pub async fn static_call<A, T>(&self, method: &str, args: &A) -> ChainResult<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.client
            .static_call_async(self.address, self.caller, method, args)
            .await
    }
}
