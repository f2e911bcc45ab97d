//! Account identity subsystem.
//!
//! # Data Flow
//! ```text
//! Private key (random, hex literal, or environment variable)
//!     → keys.rs (KeyPair: signer + uncompressed public key)
//!     → address.rs (Address derived from the public key)
//! ```
//!
//! # Security Constraints
//! - Private keys are never logged
//! - This subsystem never persists key material

pub mod address;
pub mod keys;

pub use address::Address;
pub use keys::KeyPair;

use thiserror::Error;

/// Errors raised while loading keys or parsing addresses.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Private key could not be parsed.
    #[error("Invalid private key format: {0}")]
    InvalidPrivateKey(String),

    /// Required environment variable is absent.
    #[error("Environment variable {0} not set")]
    MissingEnv(String),

    /// Public key bytes are not a valid uncompressed secp256k1 point.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Address literal is not 20 bytes of hex.
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },
}

/// Result type for account operations.
pub type AccountResult<T> = Result<T, AccountError>;
