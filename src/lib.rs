//! Client core for a DAppChain: keys, transports, transaction middleware,
//! the chain client and contract proxies.

pub mod account;
pub mod client;
pub mod config;
pub mod contract;
pub mod middleware;
pub mod observability;
pub mod quickstart;
pub mod resilience;
pub mod transport;

pub use account::{Address, KeyPair};
pub use client::{ChainClient, ChainError, ChainResult, TxReceipt};
pub use config::ClientConfig;
pub use contract::{ChainEvent, Contract, EvmContract, Subscription};
pub use middleware::TxMiddleware;
pub use transport::RpcTransport;
