//! Schema-less encoding for plain contracts and hex helpers for the wire.

use alloy::primitives::hex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::types::{ChainError, ChainResult};

/// Input of a plain contract call: method name plus an opaque record.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlainCall<A> {
    pub method: String,
    pub args: A,
}

/// Encode a plain contract call.
pub fn encode_plain_call<A: Serialize + ?Sized>(method: &str, args: &A) -> ChainResult<Vec<u8>> {
    serde_json::to_vec(&PlainCall {
        method: method.to_string(),
        args,
    })
    .map_err(|e| ChainError::Decode(format!("cannot encode arguments for '{}': {}", method, e)))
}

/// Decode a plain contract result.
pub fn decode_plain_result<T: DeserializeOwned>(method: &str, bytes: &[u8]) -> ChainResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ChainError::Decode(format!("result of '{}': {}", method, e)))
}

/// `0x`-prefixed lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_prefixed(bytes)
}

/// Parse hex with or without `0x`.
pub fn from_hex(text: &str) -> ChainResult<Vec<u8>> {
    hex::decode(text).map_err(|e| ChainError::Decode(format!("invalid hex '{}': {}", text, e)))
}

/// Interpret a query result: `null`, `""` and `"0x"` all mean no value.
pub fn query_output(method: &str, value: Value) -> ChainResult<Vec<u8>> {
    let bytes = match value {
        Value::Null => Vec::new(),
        Value::String(text) => from_hex(&text)?,
        other => {
            return Err(ChainError::Decode(format!(
                "result of '{}' must be a hex string, got {}",
                method, other
            )))
        }
    };

    if bytes.is_empty() {
        return Err(ChainError::EmptyResult {
            method: method.to_string(),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct MapEntry {
        #[serde(rename = "Key")]
        key: String,
        #[serde(rename = "Value")]
        value: String,
    }

    #[test]
    fn test_plain_call_layout() {
        let entry = MapEntry {
            key: "123".to_string(),
            value: "1".to_string(),
        };
        let bytes = encode_plain_call("SetMsg", &entry).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({"method": "SetMsg", "args": {"Key": "123", "Value": "1"}})
        );
    }

    #[test]
    fn test_decode_shape_mismatch() {
        let err = decode_plain_result::<MapEntry>("GetMsg", br#"{"Key":"123"}"#).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
    }

    #[test]
    fn test_query_output_empty_forms() {
        for value in [Value::Null, json!(""), json!("0x")] {
            let err = query_output("GetMsg", value).unwrap_err();
            assert!(matches!(err, ChainError::EmptyResult { .. }));
        }
    }

    #[test]
    fn test_query_output_non_string() {
        let err = query_output("GetMsg", json!(5)).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
    }

    #[test]
    fn test_hex_roundtrip_prefix() {
        assert_eq!(to_hex(&[0xab, 0x01]), "0xab01");
        assert_eq!(from_hex("ab01").unwrap(), vec![0xab, 0x01]);
    }
}
