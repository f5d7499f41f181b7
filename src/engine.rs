//! # Engine (C6)
//!
//! The per-invocation driver: owns the gas budget, the frame-name stack used
//! for depth accounting and self-recursion detection, the running contract
//! record, the JSON DOM pool, and the `wasmi` engine/linker the host ABI is
//! wired onto.
//!
//! Every frame's actual `wasmi::Store`/`Instance` lives on the Rust call
//! stack of [`Engine::run`] rather than in a hand-rolled continuation stack:
//! a cross-contract call (`TC_CallContract`) recurses into `run` the same
//! way the guest's own call stack would, and Rust's borrow checker already
//! forbids two `&mut` views of the same frame's memory from coexisting. What
//! the design calls the engine's `frames`/`running` fields is represented
//! here as a lightweight name stack (`EngineShared::frame_names`) so the
//! public `push_app_frame`/`pop_app_frame`/`running_app_frame` contract and
//! the depth/self-recursion invariants are checkable independent of any
//! particular frame's live `Store`.

use crate::abi::registry;
use crate::contract::Contract;
use crate::domain::entities::ExecutionContext;
use crate::domain::invariants::limits;
use crate::domain::value_objects::Hash;
use crate::errors::EngineError;
use crate::host;
use crate::memory::LinearMemory;
use crate::module_cache::{CachedModule, ModuleCache};
use crate::ports::outbound::{SignatureVerifier, StateAccess};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wasmi::{Caller, Extern, Linker, Memory, Module, Store, TypedFunc};

/// Shared, per-invocation mutable state reachable from every host closure via
/// `Caller::data()`. Cheaply cloned (an `Rc` bump) so each frame's `Store`
/// can hold its own handle onto the same engine state.
pub struct EngineShared {
    pub(crate) state: Arc<dyn StateAccess>,
    pub(crate) signer: Arc<dyn SignatureVerifier>,
    pub(crate) wasm_engine: wasmi::Engine,
    pub(crate) module_cache: Arc<ModuleCache>,
    pub(crate) ctx: ExecutionContext,
    pub(crate) gas: u64,
    pub(crate) gas_used: u64,
    pub(crate) frame_names: Vec<String>,
    pub(crate) running_name: Option<String>,
    /// Logical `Call`/`CallCode`/`DelegateCall`/`Create` nesting depth,
    /// bounded by `limits::CALL_CREATE_DEPTH` — independent of, and much
    /// larger than, the wasmi frame-name stack bound above.
    pub(crate) call_depth: usize,
    pub(crate) contract: Contract,
    /// Handles for the `TC_Json*` DOM family: each entry is a parsed or
    /// freshly-built JSON object, indexed by its position in this pool.
    pub(crate) json_pool: Vec<serde_json::Value>,
    pub(crate) is_static: bool,
    pub(crate) cancel: Arc<AtomicBool>,
}

/// The handle every `wasmi::Store` in this invocation is parameterised over.
pub type HostState = Rc<RefCell<EngineShared>>;

/// A validated, link-resolved module ready to be instantiated into a frame.
/// "Template" because instantiating it is cheap and produces a private
/// memory view; the module bytes and import resolution are shared.
#[derive(Clone)]
pub struct AppFrame {
    /// Cache key / frame name: the string form of the contract address.
    pub name: String,
    /// The validated module this frame instantiates.
    pub module: Arc<CachedModule>,
    /// Whether this frame should retain extra diagnostics (module name
    /// section, fuel metering breadcrumbs); wired through to the `wasmi`
    /// engine config at construction time.
    pub debug: bool,
}

/// Per-invocation driver. Construct one per `Call`/`CallCode`/`DelegateCall`/
/// `StaticCall`/`Create` entry (the wrapper owns that lifecycle); `run` may
/// be invoked multiple times against different `AppFrame`s for nested calls.
pub struct Engine {
    shared: HostState,
}

impl Engine {
    /// Builds a fresh engine for one top-level invocation.
    #[must_use]
    pub fn new(
        state: Arc<dyn StateAccess>,
        signer: Arc<dyn SignatureVerifier>,
        module_cache: Arc<ModuleCache>,
        gas: u64,
        contract: Contract,
        ctx: ExecutionContext,
        is_static: bool,
    ) -> Self {
        let shared = EngineShared {
            state,
            signer,
            wasm_engine: wasmi::Engine::default(),
            module_cache,
            ctx,
            gas,
            gas_used: 0,
            frame_names: Vec::new(),
            running_name: None,
            call_depth: 0,
            contract,
            json_pool: Vec::new(),
            is_static,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        Self {
            shared: Rc::new(RefCell::new(shared)),
        }
    }

    /// A cooperative cancel handle: setting it causes the next host-call
    /// boundary to return `Cancelled`.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.shared.borrow().cancel.clone()
    }

    /// Remaining host-charged gas.
    #[must_use]
    pub fn gas(&self) -> u64 {
        self.shared.borrow().gas
    }

    /// Gas consumed so far.
    #[must_use]
    pub fn gas_used(&self) -> u64 {
        self.shared.borrow().gas_used
    }

    /// The contract record this engine is driving.
    #[must_use]
    pub fn contract(&self) -> Contract {
        self.shared.borrow().contract.clone()
    }

    /// Loads (or validates freshly supplied) bytecode into a frame template,
    /// registering it in the module cache under `name` if not already
    /// present. `code` is `None` when the caller expects the module cache
    /// (or, on a cache miss, the state store) to already hold it.
    #[tracing::instrument(skip(self, code), fields(name = %name))]
    pub fn new_app(&self, name: &str, code: Option<Vec<u8>>, debug: bool) -> Result<AppFrame, EngineError> {
        let cache = self.shared.borrow().module_cache.clone();
        if let Some(cached) = cache.get(name) {
            return Ok(AppFrame {
                name: name.to_string(),
                module: cached,
                debug,
            });
        }
        let code = code.ok_or(EngineError::ContractNoCode)?;
        if code.is_empty() {
            return Err(EngineError::ContractNoCode);
        }
        let wasm_engine = self.shared.borrow().wasm_engine.clone();
        let module = Module::new(&wasm_engine, &mut &code[..])
            .map_err(|e| EngineError::ValidationError(e.to_string()))?;
        for import in module.imports() {
            if import.module() != "env" {
                continue;
            }
            if !registry::is_registered(import.name()) {
                return Err(EngineError::LinkError(import.name().to_string()));
            }
        }
        let code_hash = crate::domain::services::keccak256(&code);
        let cached = cache.get_or_insert_with(name, || CachedModule { module, code_hash });
        Ok(AppFrame {
            name: name.to_string(),
            module: cached,
            debug,
        })
    }

    /// Runs `frame`'s entry function against `input`, returning the guest's
    /// return bytes (read out of the callee's own memory before its `Store`
    /// is dropped — a raw pointer into that memory would be meaningless to
    /// the caller, which may be a different frame's store entirely) and the
    /// gas consumed by this call alone.
    ///
    /// Implements the run protocol of §4.6: splits `input` on the first
    /// `|`, rejects `Init`/`init` outside a create call, rejects direct
    /// self-recursion, pushes/pops the frame-name stack around the callee's
    /// execution, and restores the previous running frame on every exit
    /// path (success, guest error, or panic-unwind via the scope guard).
    #[tracing::instrument(skip(self, frame, input), fields(name = %frame.name))]
    pub fn run(&self, frame: &AppFrame, input: &[u8]) -> Result<(Vec<u8>, u64), EngineError> {
        let (action, args) = split_input(input)?;
        if (action == "Init" || action == "init") && !self.shared.borrow().contract.create_call {
            return Err(EngineError::InitEngine);
        }

        {
            let s = self.shared.borrow();
            if s.running_name.as_deref() == Some(frame.name.as_str()) {
                return Err(EngineError::SelfRecursion);
            }
        }

        self.shared.borrow_mut().contract.input = input.to_vec();

        let gas_before = self.gas_used();
        let _guard = FrameGuard::push(&self.shared, &frame.name)?;

        let wasm_engine = self.shared.borrow().wasm_engine.clone();
        let mut store = Store::new(&wasm_engine, self.shared.clone());
        let mut linker = Linker::new(&wasm_engine);
        host::link_all(&mut linker).map_err(|e| EngineError::LinkError(e.to_string()))?;

        let instance = linker
            .instantiate(&mut store, &frame.module.module)
            .and_then(|pre| pre.start(&mut store))
            .map_err(|e| EngineError::ValidationError(e.to_string()))?;

        let memory = instance
            .get_export(&store, "memory")
            .and_then(Extern::into_memory)
            .ok_or(EngineError::MemoryGet)?;
        let malloc: TypedFunc<u32, u32> = instance
            .get_typed_func(&store, "malloc")
            .map_err(|_| EngineError::MallocMemory)?;
        let free: TypedFunc<u32, ()> = instance
            .get_typed_func(&store, "free")
            .map_err(|_| EngineError::MemorySet)?;
        let mem = LinearMemory::new(memory, malloc, free);

        let action_ptr = mem
            .set_bytes(&mut as_caller(&mut store, &instance), action.as_bytes())
            .map_err(|_| EngineError::MallocMemory)?;
        let args_ptr = mem
            .set_bytes(&mut as_caller(&mut store, &instance), args.as_bytes())
            .map_err(|_| EngineError::MallocMemory)?;

        let entry: TypedFunc<(u32, u32), u32> = instance
            .get_typed_func(&store, "thunderchain_main")
            .map_err(|e| EngineError::ValidationError(e.to_string()))?;

        let result = entry.call(&mut store, (action_ptr, args_ptr));

        let consumed = self.gas_used().saturating_sub(gas_before);
        match result {
            Ok(0) => Ok((Vec::new(), consumed)),
            Ok(ret_ptr) => {
                let bytes = mem
                    .get_string(&mut as_caller(&mut store, &instance), ret_ptr)
                    .map_err(|_| EngineError::MemoryGet)?
                    .into_bytes();
                Ok((bytes, consumed))
            }
            Err(trap) => match translate_trap(trap) {
                // §7: a non-error exit status, not a failure — the guest's
                // "return value" is the raw status code rather than a
                // memory pointer, so no string is dereferenced out of it.
                err if err.is_exit() => {
                    let EngineError::ExecutionExit(code) = err else { unreachable!() };
                    Ok((code.to_string().into_bytes(), consumed))
                }
                err => Err(err),
            },
        }
    }

    /// Pushes `name` as the new running frame, suspending whatever was
    /// running. Fails with `OverFrame` once the suspended stack would reach
    /// 64 entries.
    pub fn push_app_frame(&self, name: &str) -> Result<usize, EngineError> {
        let mut s = self.shared.borrow_mut();
        if let Some(running) = s.running_name.clone() {
            if s.frame_names.len() >= limits::MAX_FRAMES - 1 {
                return Err(EngineError::OverFrame);
            }
            s.frame_names.push(running);
        }
        s.running_name = Some(name.to_string());
        Ok(s.frame_names.len())
    }

    /// Pops the running frame, restoring whatever was suspended beneath it.
    pub fn pop_app_frame(&self) -> (Option<String>, usize) {
        let mut s = self.shared.borrow_mut();
        let finished = s.running_name.take();
        s.running_name = s.frame_names.pop();
        (finished, s.frame_names.len())
    }

    /// The currently running frame's name and the suspended-stack depth.
    #[must_use]
    pub fn running_app_frame(&self) -> (Option<String>, usize) {
        let s = self.shared.borrow();
        (s.running_name.clone(), s.frame_names.len())
    }

    /// A clone of the shared handle, for constructing host-side helpers
    /// (e.g. the wrapper's nested `call_contract` dispatch).
    #[must_use]
    pub(crate) fn shared_handle(&self) -> HostState {
        self.shared.clone()
    }

    /// Wraps an existing shared handle back into an `Engine`, so a host
    /// function driving `TC_CallContract`/`TC_DelegateCallContract` can
    /// recurse into [`Engine::run`] against the very same gas/state/contract
    /// bookkeeping its own invocation is using.
    #[must_use]
    pub(crate) fn from_shared(shared: HostState) -> Self {
        Self { shared }
    }
}

/// RAII guard restoring the previous running frame on every exit path of
/// `Engine::run`, including the error paths above.
struct FrameGuard<'a> {
    shared: &'a HostState,
}

impl<'a> FrameGuard<'a> {
    fn push(shared: &'a HostState, name: &str) -> Result<Self, EngineError> {
        {
            let mut s = shared.borrow_mut();
            if let Some(running) = s.running_name.clone() {
                if s.frame_names.len() >= limits::MAX_FRAMES - 1 {
                    return Err(EngineError::OverFrame);
                }
                s.frame_names.push(running);
            }
            s.running_name = Some(name.to_string());
        }
        Ok(Self { shared })
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let mut s = self.shared.borrow_mut();
        s.running_name = s.frame_names.pop();
    }
}

/// Splits raw on-chain input into `(action, args)` on the first `|`. An
/// input with no `|` is a protocol error per §4.4.
pub fn split_input(input: &[u8]) -> Result<(String, String), EngineError> {
    let text = std::str::from_utf8(input).map_err(|_| EngineError::InvalidApiArgs)?;
    let idx = text.find('|').ok_or(EngineError::InvalidApiArgs)?;
    Ok((text[..idx].to_string(), text[idx + 1..].to_string()))
}

/// Builds a `Caller` view over `store`/`instance` for the rare case a free
/// function (outside a host closure) needs to write guest memory, e.g.
/// seeding `action`/`args` before the entry call.
fn as_caller<'a>(store: &'a mut Store<HostState>, instance: &wasmi::Instance) -> Caller<'a, HostState> {
    Caller::new(store, Some(instance))
}

/// Charges `amount` of gas against the shared engine state, deducting from
/// `gas` and accumulating into `gas_used`. Called by every host function
/// before it takes effect (§4.6's gas protocol).
pub(crate) fn charge_gas(shared: &HostState, amount: u64) -> Result<(), EngineError> {
    let mut s = shared.borrow_mut();
    if amount > s.gas {
        return Err(EngineError::OutOfGas);
    }
    s.gas -= amount;
    s.gas_used = s.gas_used.checked_add(amount).ok_or(EngineError::GasOverflow)?;
    Ok(())
}

pub(crate) fn shared_ref(shared: &HostState) -> Ref<'_, EngineShared> {
    shared.borrow()
}

pub(crate) fn shared_mut(shared: &HostState) -> RefMut<'_, EngineShared> {
    shared.borrow_mut()
}

/// RAII guard enforcing `limits::CALL_CREATE_DEPTH` around a nested
/// `Call`/`CallCode`/`DelegateCall`/`Create` dispatched from a host
/// function or the wrapper.
pub(crate) struct CallDepthGuard {
    shared: HostState,
}

impl Drop for CallDepthGuard {
    fn drop(&mut self) {
        shared_mut(&self.shared).call_depth -= 1;
    }
}

/// Enters one more level of call/create nesting, failing with `CallDepth`
/// once `limits::CALL_CREATE_DEPTH` would be exceeded.
pub(crate) fn enter_call_depth(shared: &HostState) -> Result<CallDepthGuard, EngineError> {
    let mut s = shared_mut(shared);
    if s.call_depth >= limits::CALL_CREATE_DEPTH as usize {
        return Err(EngineError::CallDepth);
    }
    s.call_depth += 1;
    drop(s);
    Ok(CallDepthGuard { shared: shared.clone() })
}

/// Translates a `wasmi` trap surfaced from `entry.call` into the engine's
/// own error taxonomy, per the panic-as-control-flow mapping of §9/§4.9.
///
/// Host functions trap with a typed `EngineError` via `host::host_err`
/// (`wasmi::Error::host`); that's the common case and is recovered verbatim
/// here. A trap with no such payload is a genuine wasmi-level fault (OOB
/// memory access, stack overflow, unreachable, ...), mapped from its
/// `TrapCode` instead.
fn translate_trap(trap: wasmi::Error) -> EngineError {
    if let Some(e) = trap.downcast_ref::<EngineError>() {
        return e.clone();
    }
    if let Some(host_error) = trap.as_trap_code() {
        return match host_error {
            wasmi::core::TrapCode::OutOfFuel => EngineError::OutOfGas,
            wasmi::core::TrapCode::UnreachableCodeReached => EngineError::ContractAbort,
            wasmi::core::TrapCode::MemoryOutOfBounds | wasmi::core::TrapCode::TableOutOfBounds => {
                EngineError::MemoryGet
            }
            wasmi::core::TrapCode::StackOverflow => EngineError::OverFrame,
            _ => EngineError::Internal(format!("trap: {trap}")),
        };
    }
    EngineError::Internal(trap.to_string())
}

/// Maps any `Memory` to the host's atomic growth-notification point for AOT
/// (interpreted modules need no action; `wasmi` re-derives the data pointer
/// on every access).
pub(crate) fn notify_memory_grown(_memory: Memory) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Address, BigInt};
    use crate::ports::outbound::StateAccess;

    fn test_ctx() -> ExecutionContext {
        ExecutionContext::new(Address::ZERO, 1, 0, 0, Address::ZERO, BigInt::from(0), 1)
    }

    fn test_contract() -> Contract {
        Contract::new_contract(Address::ZERO, Address::new([1u8; 20]), BigInt::from(0), 1_000_000)
    }

    struct NullState;
    #[async_trait::async_trait]
    impl StateAccess for NullState {
        async fn get_account(&self, _: Address) -> Result<Option<crate::domain::entities::Account>, crate::errors::StateError> {
            Ok(None)
        }
        async fn create_account(&self, _: Address) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn set_balance(&self, _: Address, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn sub_balance(&self, _: Address, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn add_balance(&self, _: Address, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn set_token_balance(&self, _: Address, _: Address, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn sub_token_balance(&self, _: Address, _: Address, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn add_token_balance(&self, _: Address, _: Address, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn get_token_balances(&self, _: Address) -> Result<Vec<(Address, BigInt)>, crate::errors::StateError> {
            Ok(Vec::new())
        }
        async fn set_nonce(&self, _: Address, _: u64) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn get_code(&self, _: Address) -> Result<crate::domain::value_objects::Bytes, crate::errors::StateError> {
            Ok(crate::domain::value_objects::Bytes::new())
        }
        async fn set_code(&self, _: Address, _: crate::domain::value_objects::Bytes) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn get_storage(
            &self,
            _: Address,
            _: crate::domain::value_objects::StorageKey,
        ) -> Result<crate::domain::value_objects::StorageValue, crate::errors::StateError> {
            Ok(crate::domain::value_objects::StorageValue::ZERO)
        }
        async fn set_storage(
            &self,
            _: Address,
            _: crate::domain::value_objects::StorageKey,
            _: crate::domain::value_objects::StorageValue,
        ) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn suicide(&self, _: Address) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn has_suicided(&self, _: Address) -> Result<bool, crate::errors::StateError> {
            Ok(false)
        }
        async fn snapshot(&self) -> Result<u64, crate::errors::StateError> {
            Ok(0)
        }
        async fn revert_to_snapshot(&self, _: u64) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn add_log(&self, _: crate::domain::entities::Log) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn logs(&self) -> Result<Vec<crate::domain::entities::Log>, crate::errors::StateError> {
            Ok(Vec::new())
        }
        async fn tx_hash(&self) -> Result<Hash, crate::errors::StateError> {
            Ok(Hash::ZERO)
        }
        async fn get_contract_info(
            &self,
            _: &str,
        ) -> Result<Option<crate::ports::outbound::ContractInfo>, crate::errors::StateError> {
            Ok(None)
        }
        async fn set_contract_info(&self, _: &str, _: crate::ports::outbound::ContractInfo) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
    }

    struct NullSigner;
    impl SignatureVerifier for NullSigner {
        fn ecrecover(
            &self,
            _: &Hash,
            _: &crate::domain::value_objects::EcdsaSignature,
            _: u64,
        ) -> Option<Address> {
            None
        }
    }

    fn test_engine() -> Engine {
        Engine::new(
            Arc::new(NullState),
            Arc::new(NullSigner),
            Arc::new(ModuleCache::new()),
            1_000_000,
            test_contract(),
            test_ctx(),
            false,
        )
    }

    #[test]
    fn split_input_rejects_missing_pipe() {
        assert!(matches!(split_input(b"noop"), Err(EngineError::InvalidApiArgs)));
    }

    #[test]
    fn split_input_splits_on_first_pipe_only() {
        let (a, b) = split_input(b"ping|a|b").unwrap();
        assert_eq!(a, "ping");
        assert_eq!(b, "a|b");
    }

    #[test]
    fn frame_stack_push_pop_round_trips() {
        let engine = test_engine();
        assert_eq!(engine.running_app_frame(), (None, 0));
        engine.push_app_frame("alice").unwrap();
        assert_eq!(engine.running_app_frame().0.as_deref(), Some("alice"));
        engine.push_app_frame("bob").unwrap();
        assert_eq!(engine.running_app_frame(), (Some("bob".to_string()), 1));
        let (finished, depth) = engine.pop_app_frame();
        assert_eq!(finished.as_deref(), Some("bob"));
        assert_eq!(depth, 0);
        assert_eq!(engine.running_app_frame().0.as_deref(), Some("alice"));
    }

    #[test]
    fn frame_stack_rejects_over_64() {
        let engine = test_engine();
        for i in 0..limits::MAX_FRAMES - 1 {
            engine.push_app_frame(&format!("f{i}")).unwrap();
        }
        assert!(matches!(engine.push_app_frame("one_too_many"), Err(EngineError::OverFrame)));
    }

    #[test]
    fn translate_trap_recovers_typed_host_error() {
        let trap = wasmi::Error::host(EngineError::ExecutionReverted("nope".to_string()));
        let recovered = translate_trap(trap);
        assert!(matches!(recovered, EngineError::ExecutionReverted(m) if m == "nope"));
    }

    #[test]
    fn translate_trap_falls_back_to_trap_code_for_non_host_errors() {
        let trap = wasmi::Error::from(wasmi::core::TrapCode::UnreachableCodeReached);
        assert!(matches!(translate_trap(trap), EngineError::ContractAbort));
    }

    #[test]
    fn gas_charge_depletes_and_rejects_when_insufficient() {
        let engine = test_engine();
        let shared = engine.shared_handle();
        charge_gas(&shared, 100).unwrap();
        assert_eq!(engine.gas(), 999_900);
        assert_eq!(engine.gas_used(), 100);
        assert!(matches!(charge_gas(&shared, u64::MAX), Err(EngineError::OutOfGas)));
    }
}
