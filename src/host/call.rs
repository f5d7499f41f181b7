//! Cross-contract call family: `TC_CallContract`, `TC_DelegateCallContract`.
//!
//! Both dispatch a nested [`crate::engine::Engine::run`] against the target
//! address's cached (or freshly loaded) module, sharing this invocation's
//! gas pool, state port and module cache — the recursion is plain Rust call
//! recursion, bounded by `limits::CALL_CREATE_DEPTH` via
//! `engine::enter_call_depth` rather than by the wasmi frame-name stack
//! alone. A non-revert error from the callee consumes the gas it was
//! handed, mirroring the wrapper's top-level propagation rule; a revert
//! returns its message as the call's result bytes so the caller can inspect
//! it, the same soft-failure convention `TC_Ecrecover` uses.

use super::{charge, frame_memory, host_err, read_address, write_bytes};
use crate::contract::Contract;
use crate::domain::value_objects::BigInt;
use crate::engine::{Engine, HostState};
use crate::errors::EngineError;
use crate::gas::costs;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_CallContract", call_contract)?;
    linker.func_wrap("env", "TC_DelegateCallContract", delegate_call_contract)?;
    Ok(())
}

fn load_target(caller: &mut Caller<'_, HostState>, address: crate::domain::value_objects::Address) -> Result<(Engine, crate::engine::AppFrame), wasmi::Error> {
    let shared = caller.data().clone();
    let (state, engine) = {
        let s = crate::engine::shared_ref(&shared);
        (s.state.clone(), Engine::from_shared(shared.clone()))
    };
    let code = super::block_on(state.get_code(address)).map_err(|e| host_err(e.into()))?;
    if code.is_empty() {
        return Err(host_err(EngineError::ContractNoCode));
    }
    let name = address.to_hex();
    let frame = engine
        .new_app(&name, Some(code.into_vec()), false)
        .map_err(host_err)?;
    Ok((engine, frame))
}

fn call_contract(mut caller: Caller<'_, HostState>, addr_ptr: u32, input_ptr: u32, gas_ptr: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let address = read_address(&mem, &mut caller, addr_ptr)?;
    let input = mem.get_string(&mut caller, input_ptr).map_err(host_err)?;
    let sub_gas = mem
        .get_string(&mut caller, gas_ptr)
        .map_err(host_err)?
        .trim()
        .parse::<u64>()
        .unwrap_or(0);

    let _depth = crate::engine::enter_call_depth(caller.data()).map_err(host_err)?;
    let (engine, frame) = load_target(&mut caller, address)?;

    let parent = crate::engine::shared_ref(caller.data()).contract.clone();
    {
        let mut shared = crate::engine::shared_mut(caller.data());
        shared.contract = Contract::new_contract(parent.self_address, address, BigInt::from(0), sub_gas);
    }
    let result = engine.run(&frame, input.as_bytes());
    {
        let mut shared = crate::engine::shared_mut(caller.data());
        shared.contract = parent;
    }

    match result {
        Ok((bytes, _gas)) => write_bytes(&mem, &mut caller, &bytes),
        Err(e) if e.is_revert() => write_bytes(&mem, &mut caller, e.to_string().as_bytes()),
        Err(e) => Err(host_err(e)),
    }
}

fn delegate_call_contract(mut caller: Caller<'_, HostState>, addr_ptr: u32, input_ptr: u32, gas_ptr: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let address = read_address(&mem, &mut caller, addr_ptr)?;
    let input = mem.get_string(&mut caller, input_ptr).map_err(host_err)?;
    let sub_gas = mem
        .get_string(&mut caller, gas_ptr)
        .map_err(host_err)?
        .trim()
        .parse::<u64>()
        .unwrap_or(0);

    let _depth = crate::engine::enter_call_depth(caller.data()).map_err(host_err)?;
    let (engine, frame) = load_target(&mut caller, address)?;

    let parent = crate::engine::shared_ref(caller.data()).contract.clone();
    let delegate = Contract::new_contract(parent.self_address, parent.self_address, BigInt::from(0), sub_gas)
        .as_delegate(&parent, address);
    {
        let mut shared = crate::engine::shared_mut(caller.data());
        shared.contract = delegate;
    }
    let result = engine.run(&frame, input.as_bytes());
    {
        let mut shared = crate::engine::shared_mut(caller.data());
        shared.contract = parent;
    }

    match result {
        Ok((bytes, _gas)) => write_bytes(&mem, &mut caller, &bytes),
        Err(e) if e.is_revert() => write_bytes(&mem, &mut caller, e.to_string().as_bytes()),
        Err(e) => Err(host_err(e)),
    }
}
