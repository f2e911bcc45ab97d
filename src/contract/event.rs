//! Contract events: naming by topic and lazy typed decoding.
//!
//! # Responsibilities
//! - Map `topic0` to an event name once per ABI (`EventRegistry`)
//! - Convert pushed `RawEvent`s into `ChainEvent`s
//! - Decode an event against an explicit `EventSchema` into a `DecodedEvent`
//! - Turn a `DecodedEvent` into a caller-defined struct via `EventDto`

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{keccak256, B256};
use std::collections::HashMap;

use crate::account::Address;
use crate::client::codec::from_hex;
use crate::client::{ChainError, ChainResult};
use crate::contract::evm::SimpleOutput;
use crate::transport::RawEvent;

/// One field of an event signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventField {
    /// Solidity type, e.g. `string` or `uint256`.
    pub ty: String,
    pub name: String,
    /// 1-based position in the signature.
    pub position: usize,
    /// Indexed fields travel in topics, the rest in data.
    pub indexed: bool,
}

impl EventField {
    pub fn new(ty: &str, name: &str, position: usize) -> Self {
        Self {
            ty: ty.to_string(),
            name: name.to_string(),
            position,
            indexed: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Layout of one event, used to decode its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    pub name: String,
    pub fields: Vec<EventField>,
}

impl EventSchema {
    pub fn new(name: &str, mut fields: Vec<EventField>) -> Self {
        fields.sort_by_key(|f| f.position);
        Self {
            name: name.to_string(),
            fields,
        }
    }

    /// Canonical signature, e.g. `OnTileMapStateUpdate(string)`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.fields.iter().map(|f| f.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// `topic0` of events with this schema.
    pub fn selector(&self) -> B256 {
        keccak256(self.signature().as_bytes())
    }
}

/// `topic0 → event name` for every non-anonymous event of an ABI.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    names: HashMap<B256, String>,
}

impl EventRegistry {
    pub fn from_abi(abi: &JsonAbi) -> Self {
        let names = abi
            .events()
            .filter(|event| !event.anonymous)
            .map(|event| (event.selector(), event.name.clone()))
            .collect();
        Self { names }
    }

    pub fn name_for(&self, topic0: &B256) -> Option<&str> {
        self.names.get(topic0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An event emitted by a contract, named but not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    /// `None` when `topic0` matched no event of the subscribing ABI.
    pub event_name: Option<String>,
    pub raw_payload: Vec<u8>,
    pub topics: Vec<B256>,
    pub contract: Address,
    pub block_height: u64,
}

impl ChainEvent {
    /// Parse a pushed event and name it through `registry`.
    pub fn from_raw(raw: RawEvent, registry: &EventRegistry) -> ChainResult<Self> {
        let contract = Address::from_hex(&raw.contract)?;
        let topics = raw
            .topics
            .iter()
            .map(|t| {
                t.parse::<B256>()
                    .map_err(|e| ChainError::Decode(format!("invalid topic '{}': {}", t, e)))
            })
            .collect::<ChainResult<Vec<_>>>()?;
        let raw_payload = if raw.data.is_empty() {
            Vec::new()
        } else {
            from_hex(&raw.data)?
        };
        let event_name = topics
            .first()
            .and_then(|topic0| registry.name_for(topic0))
            .map(str::to_string);

        Ok(Self {
            event_name,
            raw_payload,
            topics,
            contract,
            block_height: raw.block_height,
        })
    }

    /// Decode the fields described by `schema`.
    pub fn decode_with(&self, schema: &EventSchema) -> ChainResult<DecodedEvent> {
        if let Some(name) = &self.event_name {
            if name != &schema.name {
                return Err(ChainError::Decode(format!(
                    "event is '{}', not '{}'",
                    name, schema.name
                )));
            }
        }
        match self.topics.first() {
            Some(topic0) if *topic0 != schema.selector() => {
                return Err(ChainError::Decode(format!(
                    "topic {} does not match {}",
                    topic0,
                    schema.signature()
                )))
            }
            None => {
                return Err(ChainError::Decode(format!(
                    "event has no topics, expected {}",
                    schema.signature()
                )))
            }
            _ => {}
        }

        let mut indexed_topics = self.topics.iter().skip(1);
        let mut data_fields = Vec::new();
        let mut data_types = Vec::new();
        let mut decoded: Vec<Option<DynSolValue>> = vec![None; schema.fields.len()];

        for (slot, field) in schema.fields.iter().enumerate() {
            let ty = DynSolType::parse(&field.ty)
                .map_err(|e| ChainError::Decode(format!("field '{}': {}", field.name, e)))?;
            if field.indexed {
                let topic = indexed_topics.next().ok_or_else(|| {
                    ChainError::Decode(format!("missing topic for indexed field '{}'", field.name))
                })?;
                decoded[slot] = Some(decode_topic(&ty, topic, &field.name)?);
            } else {
                data_fields.push(slot);
                data_types.push(ty);
            }
        }

        if !data_types.is_empty() {
            let values = match DynSolType::Tuple(data_types).abi_decode_params(&self.raw_payload) {
                Ok(DynSolValue::Tuple(values)) => values,
                Ok(other) => vec![other],
                Err(e) => {
                    return Err(ChainError::Decode(format!(
                        "{} payload: {}",
                        schema.name, e
                    )))
                }
            };
            for (slot, value) in data_fields.into_iter().zip(values) {
                decoded[slot] = Some(value);
            }
        }

        let fields = schema
            .fields
            .iter()
            .zip(decoded)
            .filter_map(|(field, value)| value.map(|v| (field.name.clone(), v)))
            .collect();
        Ok(DecodedEvent {
            name: schema.name.clone(),
            fields,
        })
    }

    /// Decode into a typed event.
    pub fn decode<T: EventDto>(&self) -> ChainResult<T> {
        T::from_decoded(self.decode_with(&T::schema())?)
    }
}

/// Indexed dynamic values are stored as their hash, so only the word survives.
fn decode_topic(ty: &DynSolType, topic: &B256, field: &str) -> ChainResult<DynSolValue> {
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(DynSolValue::FixedBytes(*topic, 32)),
        _ => ty
            .abi_decode(topic.as_slice())
            .map_err(|e| ChainError::Decode(format!("indexed field '{}': {}", field, e))),
    }
}

/// Field values of a decoded event, in signature order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    pub fields: Vec<(String, DynSolValue)>,
}

impl DecodedEvent {
    pub fn get(&self, field: &str) -> Option<&DynSolValue> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    /// Remove `field` and convert it to `T`.
    pub fn take<T: SimpleOutput>(&mut self, field: &str) -> ChainResult<T> {
        let index = self
            .fields
            .iter()
            .position(|(name, _)| name == field)
            .ok_or_else(|| ChainError::Decode(format!("{} has no field '{}'", self.name, field)))?;
        let (_, value) = self.fields.remove(index);
        T::from_sol(value).ok_or_else(|| {
            ChainError::Decode(format!(
                "{}.{} is not a {}",
                self.name,
                field,
                std::any::type_name::<T>()
            ))
        })
    }
}

/// A typed event built from a schema-described payload.
pub trait EventDto: Sized {
    fn schema() -> EventSchema;

    fn from_decoded(event: DecodedEvent) -> ChainResult<Self>;
}
