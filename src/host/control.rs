//! Control family: `TC_Assert`, `TC_Require`, `TC_RequireWithMsg`,
//! `TC_Revert`, `TC_RevertWithMsg`, `exit`, `abort`, `TC_Payable`.
//!
//! Every function here either returns normally or traps with a specific
//! `EngineError`; `Engine::run` and, above it, the wrapper translate the
//! trap back into the appropriate gas-forfeiture-or-preservation behaviour
//! (only `ExecutionReverted` preserves the remaining budget).

use super::{charge, frame_memory, host_err};
use crate::domain::value_objects::BigInt;
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::gas::costs;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_Assert", assert_)?;
    linker.func_wrap("env", "TC_Require", require)?;
    linker.func_wrap("env", "TC_RequireWithMsg", require_with_msg)?;
    linker.func_wrap("env", "TC_Revert", revert)?;
    linker.func_wrap("env", "TC_RevertWithMsg", revert_with_msg)?;
    linker.func_wrap("env", "exit", exit)?;
    linker.func_wrap("env", "abort", abort)?;
    linker.func_wrap("env", "TC_Payable", payable)?;
    Ok(())
}

fn assert_(caller: Caller<'_, HostState>, cond: i32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    if cond == 0 {
        return Err(host_err(EngineError::ContractAssert));
    }
    Ok(())
}

fn require(caller: Caller<'_, HostState>, cond: i32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    if cond == 0 {
        return Err(host_err(EngineError::ContractRequire(String::new())));
    }
    Ok(())
}

fn require_with_msg(mut caller: Caller<'_, HostState>, cond: i32, msg_ptr: u32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    if cond == 0 {
        let mem = frame_memory(&mut caller).map_err(host_err)?;
        let msg = mem.get_string(&mut caller, msg_ptr).map_err(host_err)?;
        return Err(host_err(EngineError::ContractRequire(msg)));
    }
    Ok(())
}

fn revert(caller: Caller<'_, HostState>) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    Err(host_err(EngineError::ExecutionReverted(String::new())))
}

fn revert_with_msg(mut caller: Caller<'_, HostState>, msg_ptr: u32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let msg = mem.get_string(&mut caller, msg_ptr).map_err(host_err)?;
    Err(host_err(EngineError::ExecutionReverted(msg)))
}

fn exit(caller: Caller<'_, HostState>, code: i32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    Err(host_err(EngineError::ExecutionExit(code as u32)))
}

fn abort(caller: Caller<'_, HostState>) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    Err(host_err(EngineError::ContractAbort))
}

fn payable(caller: Caller<'_, HostState>, allow: i32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let value = crate::engine::shared_ref(caller.data()).contract.value.clone();
    if allow == 0 && value != BigInt::from(0) {
        return Err(host_err(EngineError::ContractNotPayable));
    }
    Ok(())
}
