//! JSON DOM family: `TC_JsonParse`, `TC_JsonGet(String|Int|Bool|Object)`,
//! `TC_JsonNewObject`, `TC_JsonPut(String|Int|Bool|Object)`,
//! `TC_JsonToString`.
//!
//! Parsed and newly-built documents live in `EngineShared::json_pool`, a flat
//! `Vec<serde_json::Value>` addressed by the guest as a `u32` handle (its
//! index). This mirrors the way `TC_BigInt*` hands the guest an opaque
//! handle over host-side state rather than marshalling a full DOM through
//! linear memory on every operation; objects only ever cross into guest
//! memory as their final serialized string, via `TC_JsonToString`.

use super::{charge, frame_memory, host_err, write_str};
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::gas;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_JsonParse", json_parse)?;
    linker.func_wrap("env", "TC_JsonGetString", json_get_string)?;
    linker.func_wrap("env", "TC_JsonGetInt", json_get_int)?;
    linker.func_wrap("env", "TC_JsonGetBool", json_get_bool)?;
    linker.func_wrap("env", "TC_JsonGetObject", json_get_object)?;
    linker.func_wrap("env", "TC_JsonNewObject", json_new_object)?;
    linker.func_wrap("env", "TC_JsonPutString", json_put_string)?;
    linker.func_wrap("env", "TC_JsonPutInt", json_put_int)?;
    linker.func_wrap("env", "TC_JsonPutBool", json_put_bool)?;
    linker.func_wrap("env", "TC_JsonPutObject", json_put_object)?;
    linker.func_wrap("env", "TC_JsonToString", json_to_string)?;
    Ok(())
}

fn push(caller: &Caller<'_, HostState>, value: serde_json::Value) -> u32 {
    let mut shared = crate::engine::shared_mut(caller.data());
    shared.json_pool.push(value);
    (shared.json_pool.len() - 1) as u32
}

fn get(caller: &Caller<'_, HostState>, handle: u32) -> Result<serde_json::Value, wasmi::Error> {
    let shared = crate::engine::shared_ref(caller.data());
    shared
        .json_pool
        .get(handle as usize)
        .cloned()
        .ok_or_else(|| host_err(EngineError::InvalidApiArgs))
}

fn put_field(caller: &Caller<'_, HostState>, handle: u32, field: &str, value: serde_json::Value) -> Result<(), wasmi::Error> {
    let mut shared = crate::engine::shared_mut(caller.data());
    let obj = shared
        .json_pool
        .get_mut(handle as usize)
        .ok_or_else(|| host_err(EngineError::InvalidApiArgs))?;
    if !obj.is_object() {
        *obj = serde_json::Value::Object(serde_json::Map::new());
    }
    obj.as_object_mut().unwrap().insert(field.to_string(), value);
    Ok(())
}

fn json_parse(mut caller: Caller<'_, HostState>, text_ptr: u32) -> Result<u32, wasmi::Error> {
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let text = mem.get_string(&mut caller, text_ptr).map_err(host_err)?;
    charge(&caller, gas::json_cost(text.len() as u64))?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|_| host_err(EngineError::InvalidApiArgs))?;
    Ok(push(&caller, value))
}

fn json_get_string(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    let value = get(&caller, handle)?;
    let s = value.get(&field).and_then(|v| v.as_str()).unwrap_or("").to_string();
    write_str(&mem, &mut caller, &s)
}

fn json_get_int(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32) -> Result<i64, wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    let value = get(&caller, handle)?;
    Ok(value.get(&field).and_then(|v| v.as_i64()).unwrap_or(0))
}

fn json_get_bool(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32) -> Result<i32, wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    let value = get(&caller, handle)?;
    Ok(i32::from(value.get(&field).and_then(|v| v.as_bool()).unwrap_or(false)))
}

fn json_get_object(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    let value = get(&caller, handle)?;
    let child = value.get(&field).cloned().unwrap_or(serde_json::Value::Null);
    Ok(push(&caller, child))
}

fn json_new_object(caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    Ok(push(&caller, serde_json::Value::Object(serde_json::Map::new())))
}

fn json_put_string(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32, value_ptr: u32) -> Result<(), wasmi::Error> {
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    let value = mem.get_string(&mut caller, value_ptr).map_err(host_err)?;
    charge(&caller, gas::json_cost(value.len() as u64))?;
    put_field(&caller, handle, &field, serde_json::Value::String(value))
}

fn json_put_int(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32, value: i64) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    put_field(&caller, handle, &field, serde_json::Value::from(value))
}

fn json_put_bool(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32, value: i32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    put_field(&caller, handle, &field, serde_json::Value::Bool(value != 0))
}

fn json_put_object(mut caller: Caller<'_, HostState>, handle: u32, field_ptr: u32, child_handle: u32) -> Result<(), wasmi::Error> {
    charge(&caller, Ok(crate::gas::costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let field = mem.get_string(&mut caller, field_ptr).map_err(host_err)?;
    let child = get(&caller, child_handle)?;
    put_field(&caller, handle, &field, child)
}

fn json_to_string(mut caller: Caller<'_, HostState>, handle: u32) -> Result<u32, wasmi::Error> {
    let value = get(&caller, handle)?;
    let text = serde_json::to_string(&value).map_err(|_| host_err(EngineError::Internal("json encode".to_string())))?;
    charge(&caller, gas::json_cost(text.len() as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    write_str(&mem, &mut caller, &text)
}
