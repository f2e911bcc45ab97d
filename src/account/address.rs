//! Chain account identifiers.

use alloy::primitives::Address as EvmAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::{AccountError, AccountResult};

/// Length of an uncompressed SEC1 public key (`0x04 || X || Y`).
pub const UNCOMPRESSED_PUBLIC_KEY_LEN: usize = 65;

/// A 20-byte account identifier on the DAppChain.
///
/// Equality is byte equality; the hex rendering is always lowercase so two
/// literals that differ only in checksum casing compare equal once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address(EvmAddress);

impl Address {
    /// Derive an address from a public key.
    ///
    /// Accepts either the 65-byte uncompressed form or the 64-byte raw point.
    pub fn from_public_key(public_key: &[u8]) -> AccountResult<Self> {
        let raw = match public_key.len() {
            UNCOMPRESSED_PUBLIC_KEY_LEN if public_key[0] == 0x04 => &public_key[1..],
            64 => public_key,
            len => {
                return Err(AccountError::InvalidPublicKey(format!(
                    "expected 64 or 65 bytes, got {}",
                    len
                )))
            }
        };
        Ok(Self(EvmAddress::from_raw_public_key(raw)))
    }

    /// Parse a hex literal such as `0xf420fbbb810698a74120df3723315ee06f472870`.
    pub fn from_hex(input: &str) -> AccountResult<Self> {
        let trimmed = input.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.len() != 40 {
            return Err(AccountError::InvalidAddress {
                input: input.to_string(),
                reason: format!("expected 40 hex digits, got {}", digits.len()),
            });
        }
        let parsed = EvmAddress::from_str(digits).map_err(|e| {
            AccountError::InvalidAddress {
                input: input.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self(parsed))
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// The underlying EVM address, for ABI encoding.
    pub fn to_evm(self) -> EvmAddress {
        self.0
    }

    /// Lowercase `0x`-prefixed hex rendering used on the wire.
    pub fn to_hex(&self) -> String {
        format!("0x{}", alloy::primitives::hex::encode(self.0.as_slice()))
    }
}

impl From<EvmAddress> for Address {
    fn from(inner: EvmAddress) -> Self {
        Self(inner)
    }
}

impl From<Address> for EvmAddress {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_hex()
    }
}

impl TryFrom<String> for Address {
    type Error = AccountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl FromStr for Address {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
