//! Contracts and flows of the quickstart DAppChain sample.
//!
//! - `BluePrint`: a plain key/value contract with `SetMsg` / `GetMsg`
//! - the tile-map EVM contract storing one string and emitting `OnTileMapStateUpdate`

use serde::{Deserialize, Serialize};

use crate::client::{ChainError, ChainResult, TxReceipt};
use crate::config::RetryConfig;
use crate::contract::{Contract, DecodedEvent, EventDto, EventField, EventSchema};

/// ABI of the tile-map contract.
pub const TILE_MAP_ABI: &str = r#"[{"constant":false,"inputs":[{"name":"_tileState","type":"string"}],"name":"SetTileMapState","outputs":[],"payable":false,"stateMutability":"nonpayable","type":"function"},{"constant":true,"inputs":[],"name":"GetTileMapState","outputs":[{"name":"","type":"string"}],"payable":false,"stateMutability":"view","type":"function"},{"anonymous":false,"inputs":[{"indexed":false,"name":"state","type":"string"}],"name":"OnTileMapStateUpdate","type":"event"}]"#;

pub const SET_MSG: &str = "SetMsg";
pub const GET_MSG: &str = "GetMsg";
pub const SET_TILE_MAP_STATE: &str = "SetTileMapState";
pub const GET_TILE_MAP_STATE: &str = "GetTileMapState";

/// Record stored by `BluePrint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

impl MapEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Lookup argument for `GetMsg`.
    pub fn lookup(key: impl Into<String>) -> Self {
        Self::new(key, "")
    }
}

/// `OnTileMapStateUpdate(string state)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnTileMapStateUpdate {
    pub state: String,
}

impl EventDto for OnTileMapStateUpdate {
    fn schema() -> EventSchema {
        EventSchema::new(
            "OnTileMapStateUpdate",
            vec![EventField::new("string", "state", 1)],
        )
    }

    fn from_decoded(mut event: DecodedEvent) -> ChainResult<Self> {
        Ok(Self {
            state: event.take("state")?,
        })
    }
}

/// Read the value stored under `key` as a counter.
pub async fn read_counter(contract: &Contract, key: &str) -> ChainResult<i64> {
    let entry: MapEntry = contract.static_call(GET_MSG, &MapEntry::lookup(key)).await?;
    entry.value.trim().parse().map_err(|_| {
        ChainError::Decode(format!("value '{}' under '{}' is not a number", entry.value, key))
    })
}

/// Result of [`check_set_send`].
#[derive(Debug)]
pub enum CheckOutcome {
    /// The chain disagrees with the local counter; nothing was sent.
    CheaterDetected { chain: i64, local: i64 },
    /// The counter was incremented and committed.
    Advanced { value: i64, receipt: TxReceipt },
}

/// Compare the chain counter with `local`; when they agree, increment and submit.
pub async fn check_set_send(
    contract: &Contract,
    retry: &RetryConfig,
    key: &str,
    local: i64,
) -> ChainResult<CheckOutcome> {
    let chain = read_counter(contract, key).await?;
    if chain != local {
        return Ok(CheckOutcome::CheaterDetected { chain, local });
    }

    let value = local.saturating_add(1);
    let receipt = contract
        .call_with_retry(retry, SET_MSG, &MapEntry::new(key, value.to_string()))
        .await?;
    Ok(CheckOutcome::Advanced { value, receipt })
}
