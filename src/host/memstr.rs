//! Memory/string family: `memcpy`, `memset`, `memmove`, `memcmp`, `strcmp`,
//! `strcpy`, `strlen`, `strconcat`, `malloc`, `calloc`, `realloc`, `free`.
//!
//! These are the libc-shaped primitives the compiled guest runtime itself
//! leans on (string concatenation for building ABI replies, `malloc`/`free`
//! for the guest's own heap). Gas is charged per byte moved via
//! `gas::copy_cost`; `malloc`/`free`/`calloc`/`realloc` charge only the flat
//! `QUICK_STEP`, mirroring the allocator being "free" relative to the data
//! it moves.

use super::{charge, frame_memory, host_err};
use crate::engine::HostState;
use crate::gas::{self, costs};
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "memcpy", memcpy)?;
    linker.func_wrap("env", "memset", memset)?;
    linker.func_wrap("env", "memmove", memmove)?;
    linker.func_wrap("env", "memcmp", memcmp)?;
    linker.func_wrap("env", "strcmp", strcmp)?;
    linker.func_wrap("env", "strcpy", strcpy)?;
    linker.func_wrap("env", "strlen", strlen)?;
    linker.func_wrap("env", "strconcat", strconcat)?;
    linker.func_wrap("env", "malloc", malloc)?;
    linker.func_wrap("env", "calloc", calloc)?;
    linker.func_wrap("env", "realloc", realloc)?;
    linker.func_wrap("env", "free", free)?;
    Ok(())
}

fn memcpy(mut caller: Caller<'_, HostState>, dst: u32, src: u32, n: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, gas::copy_cost(costs::EXT_STEP, n as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.memcpy(&mut caller, dst, src, n).map_err(host_err)?;
    Ok(dst)
}

fn memmove(mut caller: Caller<'_, HostState>, dst: u32, src: u32, n: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, gas::copy_cost(costs::EXT_STEP, n as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.memmove(&mut caller, dst, src, n).map_err(host_err)?;
    Ok(dst)
}

fn memset(mut caller: Caller<'_, HostState>, ptr: u32, value: i32, n: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, gas::copy_cost(costs::EXT_STEP, n as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.memset(&mut caller, ptr, value as u8, n).map_err(host_err)?;
    Ok(ptr)
}

fn memcmp(mut caller: Caller<'_, HostState>, a: u32, b: u32, n: u32) -> Result<i32, wasmi::Error> {
    charge(&caller, gas::copy_cost(costs::EXT_STEP, n as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.memcmp(&mut caller, a, b, n).map_err(host_err)
}

fn strcmp(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<i32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.strcmp(&mut caller, a, b).map_err(host_err)
}

fn strcpy(mut caller: Caller<'_, HostState>, dst: u32, src: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.strcpy(&mut caller, dst, src).map_err(host_err)
}

fn strlen(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.strlen(&mut caller, ptr).map_err(host_err)
}

fn strconcat(mut caller: Caller<'_, HostState>, a: u32, b: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.strconcat(&mut caller, a, b).map_err(host_err)
}

fn malloc(mut caller: Caller<'_, HostState>, size: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.malloc(&mut caller, size).map_err(host_err)
}

fn calloc(mut caller: Caller<'_, HostState>, count: u32, size: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.calloc(&mut caller, count, size).map_err(host_err)
}

fn realloc(mut caller: Caller<'_, HostState>, ptr: u32, old_size: u32, new_size: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.realloc(&mut caller, ptr, old_size, new_size).map_err(host_err)
}

fn free(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    mem.free(&mut caller, ptr).map_err(host_err)
}
