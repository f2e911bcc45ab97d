//! Contract proxies.
//!
//! # Data Flow
//! ```text
//! Contract (plain):
//!     {method, args} JSON → ChainClient (vm = plain) → JSON result → T
//!
//! EvmContract:
//!     ABI-encoded input → ChainClient (vm = evm) → ABI output → DynSolValue
//!     subscribe → RawEvent → EventRegistry names it → ChainEvent → callback
//! ```
//!
//! # Design Decisions
//! - A proxy is always bound to a resolved address; there is no unbound state
//! - Proxies share the client through `Arc<ChainClient>`
//! - Events are decoded lazily against an explicit `EventSchema`

pub mod event;
pub mod evm;
pub mod plain;

pub use event::{ChainEvent, DecodedEvent, EventDto, EventField, EventRegistry, EventSchema};
pub use evm::{EvmContract, SimpleOutput, Subscription};
pub use plain::Contract;
