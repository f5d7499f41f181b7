//! # thunderchain-engine
//!
//! A gas-metered WebAssembly execution engine for a blockchain smart-contract
//! runtime: the "TC host ABI". It loads WASM modules stored in account code,
//! exposes a fixed host interface through which guest code manipulates
//! persistent account state, performs cross-contract calls and consumes
//! resources under a strict gas budget, and returns a deterministic result
//! with the exact amount of gas consumed.
//!
//! ## Components
//!
//! | Component | Location | Responsibility |
//! |-----------|----------|----------------|
//! | Gas schedule | `gas` | Cost constants and per-host-call cost formulas |
//! | Host ABI registry | `abi::registry` | Name → arity table; import resolution |
//! | Linear-memory helpers | `memory` | Bounds-checked guest memory access |
//! | Host functions | `host` | ~80 host-callable operations grouped by family |
//! | Module cache | `module_cache` | Per-contract compiled-module store |
//! | Engine | `engine` | Per-invocation driver: gas, frame stack, run loop |
//! | Contract record | `contract` | Caller/self identities, code, input, value |
//! | Wrapper | `wrapper` | Call/CallCode/DelegateCall/StaticCall/Create/Upgrade |
//! | AOT loader (optional) | `aot` | Background WASM-to-native compilation |
//! | Deployment encoding | `deploy` | Parses the deployment blob format |
//!
//! Out of scope: module decoding and the bytecode interpreter loop
//! (provided by `wasmi`), the account store's implementation (only its
//! contract, `ports::outbound::StateAccess`, is specified here), and the
//! surrounding blockchain client.
//!
//! ## Control flow
//!
//! `Wrapper` (call/create) → `Engine` (module-cache hit or compile, frame
//! push) → guest entry function → guest calls a host import → `host`
//! dispatch → gas charge via `gas`/`engine::charge_gas` → effect on state or
//! memory → guest returns → frame pop → gas reconciled → `Wrapper` finalizes
//! the snapshot.

// Crate-level lints
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

// =============================================================================
// MODULES
// =============================================================================

pub mod abi;
pub mod adapters;
#[cfg(feature = "aot")]
pub mod aot;
pub mod contract;
pub mod deploy;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod gas;
pub mod host;
pub mod memory;
pub mod module_cache;
pub mod ports;
pub mod wrapper;

// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Domain entities
    pub use crate::domain::entities::{Account, ExecutionContext, Log};

    // Value objects
    pub use crate::domain::value_objects::{
        Address, BigInt, Bytes, EcdsaSignature, Hash, StorageKey, StorageValue, TokenId, U256,
    };

    // Domain services
    pub use crate::domain::services::{create_address, keccak256};

    // Engine
    pub use crate::contract::Contract;
    pub use crate::deploy::parse_deployment_blob;
    pub use crate::engine::Engine;
    pub use crate::module_cache::ModuleCache;
    pub use crate::wrapper::{CallResult, Wrapper};

    // Ports
    pub use crate::ports::config::{AotConfig, EngineConfig};
    pub use crate::ports::outbound::{ContractInfo, SignatureVerifier, StateAccess};

    // Errors
    pub use crate::errors::{CryptoError, EngineError, StateError};

    // Adapters
    pub use crate::adapters::{InMemoryState, Secp256k1Signer};

    #[cfg(feature = "aot")]
    pub use crate::aot::AotLoader;
}

// =============================================================================
// CRATE INFO
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_exports() {
        use prelude::*;
        let _ = EngineConfig::default();
        let _ = Address::ZERO;
    }
}
