//! # Host ABI registry (C2)
//!
//! The fixed name table every guest import resolves against, and the import
//! resolver that walks a module's import section before it is linked.

pub mod registry;

pub use registry::{is_registered, HostFunctionSpec, REGISTRY};
