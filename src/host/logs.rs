//! Log family: `TC_Log0..TC_Log4`, `TC_Notify`, `TC_Prints`, `TC_Printsl`.
//!
//! `TC_Log0..4` take `N` topics (each a `0x`-prefixed 32-byte hex hash) plus
//! a `(data_ptr, data_len)` payload. `TC_Notify` is the one-topic
//! convenience the original ABI offers application code: its first
//! argument is a plain event-id string, hashed into topic 0, rather than a
//! caller-supplied hash. `TC_Prints`/`TC_Printsl` are debug-only: they write
//! to the host's trace log and never touch chain state or gas beyond the
//! flat step cost.

use super::{charge, frame_memory, host_err};
use crate::domain::entities::Log;
use crate::domain::value_objects::Hash;
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::gas::{self, costs};
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_Log0", log0)?;
    linker.func_wrap("env", "TC_Log1", log1)?;
    linker.func_wrap("env", "TC_Log2", log2)?;
    linker.func_wrap("env", "TC_Log3", log3)?;
    linker.func_wrap("env", "TC_Log4", log4)?;
    linker.func_wrap("env", "TC_Notify", notify)?;
    linker.func_wrap("env", "TC_Prints", prints)?;
    linker.func_wrap("env", "TC_Printsl", printsl)?;
    Ok(())
}

fn parse_topic(mem: &crate::memory::LinearMemory, caller: &mut Caller<'_, HostState>, ptr: u32) -> Result<Hash, wasmi::Error> {
    let hex = mem.get_string(caller, ptr).map_err(host_err)?;
    let hex = hex.strip_prefix("0x").unwrap_or(&hex);
    let bytes: Option<Vec<u8>> = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect();
    let bytes = bytes.ok_or_else(|| host_err(EngineError::InvalidApiArgs))?;
    Hash::from_slice(&bytes).ok_or_else(|| host_err(EngineError::InvalidApiArgs))
}

fn emit(caller: &mut Caller<'_, HostState>, topics: Vec<Hash>, data: Vec<u8>) -> Result<(), wasmi::Error> {
    let (state, address, block_number, block_time) = {
        let shared = crate::engine::shared_ref(caller.data());
        (
            shared.state.clone(),
            shared.contract.self_address,
            shared.ctx.block_number,
            shared.ctx.time,
        )
    };
    let log = Log::new(address, topics, data, block_number, block_time);
    super::block_on(state.add_log(log)).map_err(|e| host_err(e.into()))
}

fn log0(mut caller: Caller<'_, HostState>, data_ptr: u32, data_len: u32) -> Result<(), wasmi::Error> {
    charge(&caller, gas::log_cost(0, data_len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let data = mem.get_bytes(&mut caller, data_ptr, data_len).map_err(host_err)?;
    emit(&mut caller, Vec::new(), data)
}

fn log1(mut caller: Caller<'_, HostState>, t0: u32, data_ptr: u32, data_len: u32) -> Result<(), wasmi::Error> {
    charge(&caller, gas::log_cost(1, data_len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let topic0 = parse_topic(&mem, &mut caller, t0)?;
    let data = mem.get_bytes(&mut caller, data_ptr, data_len).map_err(host_err)?;
    emit(&mut caller, vec![topic0], data)
}

fn log2(mut caller: Caller<'_, HostState>, t0: u32, t1: u32, data_ptr: u32, data_len: u32) -> Result<(), wasmi::Error> {
    charge(&caller, gas::log_cost(2, data_len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let topic0 = parse_topic(&mem, &mut caller, t0)?;
    let topic1 = parse_topic(&mem, &mut caller, t1)?;
    let data = mem.get_bytes(&mut caller, data_ptr, data_len).map_err(host_err)?;
    emit(&mut caller, vec![topic0, topic1], data)
}

fn log3(mut caller: Caller<'_, HostState>, t0: u32, t1: u32, t2: u32, data_ptr: u32, data_len: u32) -> Result<(), wasmi::Error> {
    charge(&caller, gas::log_cost(3, data_len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let topic0 = parse_topic(&mem, &mut caller, t0)?;
    let topic1 = parse_topic(&mem, &mut caller, t1)?;
    let topic2 = parse_topic(&mem, &mut caller, t2)?;
    let data = mem.get_bytes(&mut caller, data_ptr, data_len).map_err(host_err)?;
    emit(&mut caller, vec![topic0, topic1, topic2], data)
}

#[allow(clippy::too_many_arguments)]
fn log4(
    mut caller: Caller<'_, HostState>,
    t0: u32,
    t1: u32,
    t2: u32,
    t3: u32,
    data_ptr: u32,
    data_len: u32,
) -> Result<(), wasmi::Error> {
    charge(&caller, gas::log_cost(4, data_len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let topic0 = parse_topic(&mem, &mut caller, t0)?;
    let topic1 = parse_topic(&mem, &mut caller, t1)?;
    let topic2 = parse_topic(&mem, &mut caller, t2)?;
    let topic3 = parse_topic(&mem, &mut caller, t3)?;
    let data = mem.get_bytes(&mut caller, data_ptr, data_len).map_err(host_err)?;
    emit(&mut caller, vec![topic0, topic1, topic2, topic3], data)
}

fn notify(mut caller: Caller<'_, HostState>, event_id_ptr: u32, data_ptr: u32) -> Result<(), wasmi::Error> {
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let event_id = mem.get_string(&mut caller, event_id_ptr).map_err(host_err)?;
    let data_str = mem.get_string(&mut caller, data_ptr).map_err(host_err)?;
    charge(&caller, gas::log_cost(1, data_str.len() as u64))?;
    let topic0 = crate::domain::services::keccak256(event_id.as_bytes());
    emit(&mut caller, vec![topic0], data_str.into_bytes())
}

fn prints(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let s = mem.get_string(&mut caller, ptr).map_err(host_err)?;
    tracing::debug!(target: "tc_guest", "{s}");
    Ok(())
}

fn printsl(mut caller: Caller<'_, HostState>, ptr: u32, len: u32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let bytes = mem.get_bytes(&mut caller, ptr, len).map_err(host_err)?;
    tracing::debug!(target: "tc_guest", "{}", String::from_utf8_lossy(&bytes));
    Ok(())
}
