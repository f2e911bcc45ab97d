//! Transaction envelopes.
//!
//! A submitted transaction is three nested bincode envelopes:
//! ```text
//! SignedTx { inner: NonceTx { inner: CallTx {..}, sequence }, signature, public_key }
//! ```
//! Each middleware stage consumes the bytes of the previous envelope and
//! wraps them, so a stage never needs to understand what it wraps.

use alloy::primitives::{keccak256, Signature, B256};
use serde::{Deserialize, Serialize};

use crate::account::keys::verify_prehash;
use crate::account::Address;

/// Contract execution environment on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    /// Name-addressed contract taking schema-less records.
    Plain,
    /// ABI-addressed EVM contract.
    Evm,
}

impl VmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmType::Plain => "plain",
            VmType::Evm => "evm",
        }
    }
}

/// Unsigned call descriptor built by the client for every mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTx {
    pub vm: VmType,
    pub contract: Address,
    pub caller: Address,
    pub input: Vec<u8>,
}

/// Envelope added by the nonce stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceTx {
    pub inner: Vec<u8>,
    pub sequence: u64,
}

/// Envelope added by the signing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    /// Bytes that were signed (an encoded `NonceTx` in the standard chain).
    pub inner: Vec<u8>,
    /// 65-byte recoverable ECDSA signature over `keccak256(inner)`.
    pub signature: Vec<u8>,
    /// Uncompressed public key of the signer.
    pub public_key: Vec<u8>,
}

/// Encoding failure for an envelope.
pub type EnvelopeError = bincode::Error;

macro_rules! envelope_codec {
    ($ty:ty) => {
        impl $ty {
            /// Encode this envelope.
            pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
                bincode::serialize(self)
            }

            /// Decode an envelope from bytes.
            pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
                bincode::deserialize(bytes)
            }
        }
    };
}

envelope_codec!(CallTx);
envelope_codec!(NonceTx);
envelope_codec!(SignedTx);

impl SignedTx {
    /// Digest that the signature covers.
    pub fn signing_hash(&self) -> B256 {
        keccak256(&self.inner)
    }

    /// Check the signature against the embedded public key.
    ///
    /// Any change to `inner` after signing, nonce included, fails verification.
    pub fn verify(&self) -> bool {
        match Signature::from_raw(&self.signature) {
            Ok(signature) => verify_prehash(&self.public_key, self.signing_hash(), &signature),
            Err(_) => false,
        }
    }

    /// Address of the signer.
    pub fn signer(&self) -> Option<Address> {
        Address::from_public_key(&self.public_key).ok()
    }

    /// Transaction hash as reported to the caller.
    pub fn hash(&self) -> Result<B256, EnvelopeError> {
        Ok(keccak256(self.encode()?))
    }
}
