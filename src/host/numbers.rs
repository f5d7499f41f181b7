//! Number parsing/formatting family: `atoi`, `atoi64`, `atof32`, `atof64`,
//! `itoa`, `i64toa`. Thin ABI glue over guest strings; malformed input
//! parses to `0` rather than trapping, matching libc `atoi` semantics.

use super::{charge, frame_memory, host_err, write_str};
use crate::engine::HostState;
use crate::gas::costs;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "atoi", atoi)?;
    linker.func_wrap("env", "atoi64", atoi64)?;
    linker.func_wrap("env", "atof32", atof32)?;
    linker.func_wrap("env", "atof64", atof64)?;
    linker.func_wrap("env", "itoa", itoa)?;
    linker.func_wrap("env", "i64toa", i64toa)?;
    Ok(())
}

fn atoi(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<i32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let s = mem.get_string(&mut caller, ptr).map_err(host_err)?;
    Ok(s.trim().parse::<i32>().unwrap_or(0))
}

fn atoi64(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<i64, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let s = mem.get_string(&mut caller, ptr).map_err(host_err)?;
    Ok(s.trim().parse::<i64>().unwrap_or(0))
}

fn atof32(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<f32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let s = mem.get_string(&mut caller, ptr).map_err(host_err)?;
    Ok(s.trim().parse::<f32>().unwrap_or(0.0))
}

fn atof64(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<f64, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let s = mem.get_string(&mut caller, ptr).map_err(host_err)?;
    Ok(s.trim().parse::<f64>().unwrap_or(0.0))
}

fn itoa(mut caller: Caller<'_, HostState>, value: i32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &value.to_string())
}

fn i64toa(mut caller: Caller<'_, HostState>, value: i64) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &value.to_string())
}
