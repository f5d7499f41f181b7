//! # Host functions (C4)
//!
//! The ~80 functions a guest module may import from `env`. Each one charges
//! gas (via `crate::gas`) before it takes effect, then reads/writes guest
//! memory through `crate::memory::LinearMemory`. [`link_all`] wires every
//! one onto a fresh `wasmi::Linker` at frame-instantiation time
//! (`Engine::run`); `crate::abi::registry` is consulted separately, at link
//! *validation* time, to reject unknown imports before any of this ever
//! runs.
//!
//! Families mirror §4.4: memory/string, number parsing, BigInt, crypto,
//! context, control, state, logs, balances, cross-contract calls, and the
//! JSON DOM. Each family lives in its own submodule; this module only holds
//! the shared plumbing they all need.

mod balances;
mod bigint;
mod call;
mod context;
mod control;
mod crypto;
mod json;
mod logs;
mod memstr;
mod numbers;
mod state;

use crate::domain::value_objects::Address;
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::memory::LinearMemory;
use std::future::Future;
use wasmi::{Caller, Extern, Linker};

/// Registers every host function family onto `linker` under the `env`
/// namespace. Call once per frame instantiation (`Engine::run`); `wasmi`
/// linkers are cheap to build and this keeps every closure's captured state
/// limited to nothing beyond the function pointer itself (all actual state
/// travels through `Caller::data()`).
pub(crate) fn link_all(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    memstr::link(linker)?;
    numbers::link(linker)?;
    bigint::link(linker)?;
    crypto::link(linker)?;
    context::link(linker)?;
    control::link(linker)?;
    state::link(linker)?;
    logs::link(linker)?;
    balances::link(linker)?;
    call::link(linker)?;
    json::link(linker)?;
    Ok(())
}

/// Resolves the calling frame's `memory`/`malloc`/`free` exports. `wasmi`
/// only makes a frame's own exports visible through `Caller` once
/// instantiation has completed, which is always true by the time a guest
/// can have called into a host function, so this never fails in practice
/// outside of a malformed module (caught earlier, at link time, by
/// `crate::abi::registry`).
pub(crate) fn frame_memory(caller: &mut Caller<'_, HostState>) -> Result<LinearMemory, EngineError> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or(EngineError::MemoryGet)?;
    let malloc = caller
        .get_export("malloc")
        .and_then(Extern::into_func)
        .ok_or(EngineError::MallocMemory)?
        .typed::<u32, u32>(&caller)
        .map_err(|_| EngineError::MallocMemory)?;
    let free = caller
        .get_export("free")
        .and_then(Extern::into_func)
        .ok_or(EngineError::MemorySet)?
        .typed::<u32, ()>(&caller)
        .map_err(|_| EngineError::MemorySet)?;
    Ok(LinearMemory::new(memory, malloc, free))
}

/// Converts an `EngineError` into the trap `wasmi` propagates out of
/// `entry.call`. The error travels as a typed `wasmi::Error::host` payload
/// rather than a stringified message, so [`crate::engine::translate_trap`]
/// can recover the exact variant (`ExecutionReverted`, `WriteProtection`,
/// `ContractAssert`, ...) via `downcast_ref` instead of re-deriving a coarser
/// one from a trap code.
pub(crate) fn host_err(e: EngineError) -> wasmi::Error {
    wasmi::Error::host(e)
}

/// Charges `amount` of gas against the caller's shared engine state.
pub(crate) fn charge(caller: &Caller<'_, HostState>, amount: Result<u64, EngineError>) -> Result<(), wasmi::Error> {
    let amount = amount.map_err(host_err)?;
    crate::engine::charge_gas(caller.data(), amount).map_err(host_err)
}

/// Writes `s` into freshly allocated guest memory and returns its pointer.
pub(crate) fn write_str(mem: &LinearMemory, caller: &mut Caller<'_, HostState>, s: &str) -> Result<u32, wasmi::Error> {
    mem.set_bytes(caller, s.as_bytes()).map_err(host_err)
}

/// Writes `bytes` into freshly allocated guest memory and returns its
/// pointer.
pub(crate) fn write_bytes(mem: &LinearMemory, caller: &mut Caller<'_, HostState>, bytes: &[u8]) -> Result<u32, wasmi::Error> {
    mem.set_bytes(caller, bytes).map_err(host_err)
}

/// Parses a guest-supplied `0x`-prefixed (or bare) hex address string.
pub(crate) fn read_address(mem: &LinearMemory, caller: &mut Caller<'_, HostState>, ptr: u32) -> Result<Address, wasmi::Error> {
    let text = mem.get_string(caller, ptr).map_err(host_err)?;
    Address::from_hex(&text).ok_or_else(|| host_err(EngineError::InvalidApiArgs))
}

/// Drives a `StateAccess`/`SignatureVerifier` future to completion from a
/// synchronous `wasmi` host closure.
///
/// Host functions are called back into from `entry.call`, itself a plain
/// (non-`async`) function as far as `wasmi` is concerned, so there is no
/// executor already polling anywhere on this stack to hand the future to.
/// The state ports this engine is given in practice resolve immediately —
/// they wrap in-process account stores, not real network I/O — so a tiny
/// spin-poll executor with a no-op waker is both correct and far cheaper
/// than standing up a second Tokio runtime (which would also panic if
/// called from inside one, as the top-level driver of a run typically is).
pub(crate) fn block_on<F: Future>(fut: F) -> F::Output {
    use std::pin::Pin;
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn no_op(_: *const ()) {}
    fn clone_raw(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, no_op, no_op, no_op);

    let raw_waker = RawWaker::new(std::ptr::null(), &VTABLE);
    let waker = unsafe { Waker::from_raw(raw_waker) };
    let mut cx = Context::from_waker(&waker);
    let mut fut: Pin<Box<F>> = Box::pin(fut);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(v) => return v,
            Poll::Pending => std::thread::yield_now(),
        }
    }
}

/// Fails a state-mutating call with `WriteProtection` if the current
/// invocation is running under `StaticCall`.
pub(crate) fn reject_under_static_call(caller: &Caller<'_, HostState>) -> Result<(), wasmi::Error> {
    if crate::engine::shared_ref(caller.data()).is_static {
        return Err(host_err(EngineError::WriteProtection));
    }
    Ok(())
}
