//! Error taxonomy for the TC host ABI engine.
//!
//! Mirrors the shape of the error handling design: resource/guest/balance/
//! link/ABI kinds, plus the propagation rule that only `ExecutionReverted`
//! preserves remaining gas.

use crate::domain::value_objects::Address;
use thiserror::Error;

/// Errors surfaced by the outbound state port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No account/slot exists for the given key.
    #[error("not found")]
    NotFound,
    /// Underlying storage is corrupted or unreadable.
    #[error("state corrupted: {0}")]
    Corrupted(String),
    /// The snapshot identifier does not exist or has already been reverted past.
    #[error("unknown snapshot id {0}")]
    UnknownSnapshot(u64),
    /// The backing store is unavailable (e.g. disconnected).
    #[error("state store unavailable")]
    Unavailable,
    /// Catch-all for port-specific failures.
    #[error("state error: {0}")]
    Other(String),
}

/// Every error the engine, wrapper and host functions can raise.
///
/// Kinds follow the design's resource exhaustion, guest-triggered
/// termination, balance/access failures, link/load failures and malformed
/// ABI usage. `Clone` so a single error can be recorded both in a log event
/// and returned to the caller without re-deriving it.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    // ---- Resource ----
    /// The gas budget was exhausted before the current effect completed.
    #[error("out of gas")]
    OutOfGas,
    /// A gas cost computation overflowed `u64`.
    #[error("gas overflow")]
    GasOverflow,
    /// The wrapper's `CallCreateDepth` bound was exceeded.
    #[error("call depth exceeded")]
    CallDepth,
    /// The engine's frame stack bound (64) was exceeded.
    #[error("frame stack exhausted")]
    OverFrame,
    /// Create's runtime code exceeded `MaxCodeSize`.
    #[error("code size {size} exceeds max {max}")]
    MaxCodeSizeExceeded {
        /// Observed code size in bytes.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Gas ran out while charging for code storage after Create.
    #[error("out of gas storing created code")]
    CodeStoreOutOfGas,

    // ---- Guest ----
    /// `TC_Revert`/`TC_RevertWithMsg` was invoked; preserves remaining gas.
    #[error("execution reverted: {0}")]
    ExecutionReverted(String),
    /// `abort` was invoked by the guest.
    #[error("contract aborted")]
    ContractAbort,
    /// `TC_Require`/`TC_RequireWithMsg` failed.
    #[error("require failed: {0}")]
    ContractRequire(String),
    /// `TC_Assert` failed.
    #[error("assertion failed")]
    ContractAssert,
    /// A non-zero value was sent to a contract that disallows it.
    #[error("contract is not payable")]
    ContractNotPayable,
    /// `exit(code)` was invoked; not an error, carries the guest's status.
    #[error("guest exited with code {0}")]
    ExecutionExit(u32),

    // ---- Balance / access ----
    /// Insufficient balance for a value-transferring call.
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        /// Amount required.
        required: String,
        /// Amount available.
        available: String,
    },
    /// Same condition raised from within a host function rather than preflight.
    #[error("balance not enough")]
    BalanceNotEnough,
    /// `Create` targeted an address that already has code or a non-zero nonce.
    #[error("contract address collision at {0:#x}")]
    ContractAddressCollision(Address),
    /// A state-mutating host function ran transitively under `StaticCall`.
    #[error("write protection: state mutation under static call")]
    WriteProtection,

    // ---- Link / load ----
    /// No code found for the target contract address.
    #[error("contract has no code")]
    ContractNoCode,
    /// Module failed WASM validation.
    #[error("module validation failed: {0}")]
    ValidationError(String),
    /// An import could not be resolved against the host ABI registry.
    #[error("link error: unresolved import {0}")]
    LinkError(String),

    // ---- ABI ----
    /// Host function arguments were malformed (wrong arity, bad encoding).
    #[error("invalid API arguments")]
    InvalidApiArgs,
    /// Guest memory read failed (out of bounds).
    #[error("memory get failed")]
    MemoryGet,
    /// Guest memory write failed (out of bounds or allocator failure).
    #[error("memory set failed")]
    MemorySet,
    /// Environment/import arguments did not match the registry's expectations.
    #[error("invalid env arguments")]
    InvalidEnvArgs,
    /// The guest allocator (`malloc`) failed or was unavailable.
    #[error("malloc failed")]
    MallocMemory,
    /// A frame operation was attempted with no running frame.
    #[error("no running frame")]
    EmptyFrame,
    /// `Init`/`init` was invoked outside of a `createCall` context.
    #[error("init called outside of create")]
    InitEngine,
    /// Requested return-data window falls outside the available buffer.
    #[error("return data out of bounds: offset {offset}, size {size}, available {available}")]
    ReturnDataOutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Requested size.
        size: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// Direct self-recursion (`running.name == app.name`).
    #[error("self-recursion rejected")]
    SelfRecursion,
    /// Invocation was cancelled cooperatively at an instruction boundary.
    #[error("cancelled")]
    Cancelled,
    /// Propagated state-port failure.
    #[error(transparent)]
    State(#[from] StateError),
    /// Anything else, carrying a message for diagnostics.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Lets a host closure trap with a typed `EngineError` and get the very same
/// variant back out of `entry.call`'s `Result::Err`, instead of the generic
/// `Internal` fallback `wasmi::core::TrapCode` maps anything unrecognised to.
/// `wasmi::Error::host`/`downcast_ref` carry it through untouched; see
/// `host::host_err` and `engine::translate_trap`.
impl wasmi::core::HostError for EngineError {}

impl EngineError {
    /// Returns `true` for the single non-fatal kind that preserves gas on propagation.
    #[must_use]
    pub fn is_revert(&self) -> bool {
        matches!(self, EngineError::ExecutionReverted(_))
    }

    /// Returns `true` when propagating this error should consume all remaining gas.
    ///
    /// Every kind other than `ExecutionReverted` consumes the full remaining
    /// budget when it escapes the wrapper. `ExecutionExit` is excluded too —
    /// it is never actually supposed to reach here as an `Err` (`Engine::run`
    /// intercepts it and returns `Ok` instead), but this keeps the rule
    /// correct even if a future caller sees it directly.
    #[must_use]
    pub fn consumes_all_gas(&self) -> bool {
        !self.is_revert() && !self.is_exit()
    }

    /// Returns `true` when this error is actually a non-error exit status.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, EngineError::ExecutionExit(_))
    }
}

/// Errors raised by the signature-verification port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Malformed signature or hash length.
    #[error("malformed signature")]
    Malformed,
    /// Recovery id out of range or the point did not recover.
    #[error("recovery failed")]
    RecoveryFailed,
}

impl From<CryptoError> for EngineError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Malformed | CryptoError::RecoveryFailed => EngineError::InvalidApiArgs,
        }
    }
}
