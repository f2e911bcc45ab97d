//! Key pair management and signing.
//!
//! # Security
//! - Private keys are generated in memory, parsed from hex, or read from the
//!   environment; they are never logged or serialized by this crate
//! - `Debug` output only shows the derived address

use alloy::primitives::{hex, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::account::address::Address;
use crate::account::{AccountError, AccountResult};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "DAPPCHAIN_PRIVATE_KEY";

/// A secp256k1 key pair used to sign transactions for one account.
#[derive(Clone)]
pub struct KeyPair {
    /// The underlying signer (private key).
    signer: PrivateKeySigner,
    /// Uncompressed SEC1 public key, 65 bytes.
    public_key: Vec<u8>,
    /// Address derived from `public_key`.
    address: Address,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// Create a key pair from a hex-encoded private key string.
    ///
    /// # Arguments
    /// * `private_key_hex` - Hex string (with or without 0x prefix)
    pub fn from_private_key(private_key_hex: &str) -> AccountResult<Self> {
        let key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| AccountError::InvalidPrivateKey(format!("{}", e)))?;

        Ok(Self::from_signer(signer))
    }

    /// Load a key pair from `DAPPCHAIN_PRIVATE_KEY`.
    pub fn from_env() -> AccountResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR)
            .map_err(|_| AccountError::MissingEnv(PRIVATE_KEY_ENV_VAR.to_string()))?;
        Self::from_private_key(&private_key)
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let verifying_key = signer.credential().verifying_key();
        let public_key = k256::PublicKey::from(verifying_key)
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        let address = Address::from(signer.address());

        tracing::debug!(address = %address, "Key pair loaded");

        Self {
            signer,
            public_key,
            address,
        }
    }

    /// Raw private key bytes.
    pub fn private_key(&self) -> B256 {
        self.signer.to_bytes()
    }

    /// Hex-encoded private key, for export by the caller.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key())
    }

    /// Uncompressed public key bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The account address of this key pair.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest.
    pub async fn sign_hash(&self, hash: B256) -> Result<Signature, alloy::signers::Error> {
        self.signer.sign_hash(&hash).await
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Check that `signature` over `hash` was produced by the holder of `public_key`.
pub fn verify_prehash(public_key: &[u8], hash: B256, signature: &Signature) -> bool {
    let Ok(expected) = Address::from_public_key(public_key) else {
        return false;
    };
    match signature.recover_address_from_prehash(&hash) {
        Ok(recovered) => Address::from(recovered) == expected,
        Err(_) => false,
    }
}
