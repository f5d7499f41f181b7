//! # Adapters
//!
//! Concrete implementations of the outbound ports in `ports::outbound`.
//! Dependencies point inward: this module depends on `domain`/`ports`, never
//! the reverse.

pub mod signature_adapter;
pub mod state_adapter;

pub use signature_adapter::Secp256k1Signer;
pub use state_adapter::*;
