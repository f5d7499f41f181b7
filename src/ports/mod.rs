//! # Ports
//!
//! Interfaces between the engine and the outside world: the outbound
//! `StateAccess`/`SignatureVerifier` traits adapters implement, and the
//! `EngineConfig`/`AotConfig` tunables threaded down at construction time.
//! No concrete implementations live in this module.

pub mod config;
pub mod outbound;

pub use config::*;
pub use outbound::*;
