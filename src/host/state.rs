//! Storage family: `TC_StorageSet(String|Bytes)?`, the `Pure` key variants,
//! the `Storage(String|Bytes)?Get` readers, `TC_StorageDel`, and the
//! cross-contract read-only `TC_ContractStorageGet`.
//!
//! A `StorageKey` is always 32 bytes; two addressing modes exist per key
//! family's naming split: the plain family hashes the guest-supplied key
//! through `keccak256` (collision-resistant, arbitrary-length keys), while
//! the `Pure` family takes the key bytes directly, zero-padded or truncated
//! to 32 bytes (a raw-slot addressing mode for callers that already manage
//! their own key layout). Numeric values (`TC_StorageSet`/`TC_StorageGet`)
//! are stored as a single 32-byte big-endian `U256` word; string/byte values
//! are chunked across `keccak256(key ‖ "len")` (a length word) and
//! `keccak256(key ‖ index)` for each subsequent 32-byte chunk, the same
//! dynamic-storage layout scheme proven out by the EVM's own dynamic types.

use super::{charge, frame_memory, host_err, read_address, write_bytes, write_str};
use crate::domain::value_objects::{StorageKey, StorageValue, U256};
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::gas;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_StorageSet", storage_set)?;
    linker.func_wrap("env", "TC_StorageSetString", storage_set_string)?;
    linker.func_wrap("env", "TC_StorageSetBytes", storage_set_string)?;
    linker.func_wrap("env", "TC_StoragePureSetString", storage_pure_set_string)?;
    linker.func_wrap("env", "TC_StoragePureSetBytes", storage_pure_set_string)?;
    linker.func_wrap("env", "TC_StorageGet", storage_get)?;
    linker.func_wrap("env", "TC_StorageGetString", storage_get_string)?;
    linker.func_wrap("env", "TC_StorageGetBytes", storage_get_string)?;
    linker.func_wrap("env", "TC_StoragePureGetString", storage_pure_get_string)?;
    linker.func_wrap("env", "TC_StoragePureGetBytes", storage_pure_get_string)?;
    linker.func_wrap("env", "TC_StorageDel", storage_del)?;
    linker.func_wrap("env", "TC_ContractStorageGet", contract_storage_get)?;
    Ok(())
}

fn hashed_key(raw: &[u8]) -> StorageKey {
    StorageKey::new(*crate::domain::services::keccak256(raw).as_bytes())
}

fn pure_key(raw: &[u8]) -> StorageKey {
    let mut bytes = [0u8; 32];
    let n = raw.len().min(32);
    bytes[..n].copy_from_slice(&raw[..n]);
    StorageKey::new(bytes)
}

fn chunk_key(base: &StorageKey, suffix: &[u8]) -> StorageKey {
    let mut buf = base.as_bytes().to_vec();
    buf.extend_from_slice(suffix);
    hashed_key(&buf)
}

async fn store_chunked(
    state: &dyn crate::ports::outbound::StateAccess,
    address: crate::domain::value_objects::Address,
    base: StorageKey,
    data: &[u8],
) -> Result<(), EngineError> {
    let len_key = chunk_key(&base, b"len");
    let mut len_value = [0u8; 32];
    len_value[24..].copy_from_slice(&(data.len() as u64).to_be_bytes());
    state.set_storage(address, len_key, StorageValue::new(len_value)).await?;
    for (i, chunk) in data.chunks(32).enumerate() {
        let key = chunk_key(&base, &(i as u64).to_be_bytes());
        let mut value = [0u8; 32];
        value[..chunk.len()].copy_from_slice(chunk);
        state.set_storage(address, key, StorageValue::new(value)).await?;
    }
    Ok(())
}

async fn load_chunked(
    state: &dyn crate::ports::outbound::StateAccess,
    address: crate::domain::value_objects::Address,
    base: StorageKey,
) -> Result<Vec<u8>, EngineError> {
    let len_key = chunk_key(&base, b"len");
    let len_value = state.get_storage(address, len_key).await?;
    let len = u64::from_be_bytes(len_value.as_bytes()[24..].try_into().unwrap()) as usize;
    let mut out = Vec::with_capacity(len);
    let mut i = 0u64;
    while out.len() < len {
        let key = chunk_key(&base, &i.to_be_bytes());
        let value = state.get_storage(address, key).await?;
        let take = (len - out.len()).min(32);
        out.extend_from_slice(&value.as_bytes()[..take]);
        i += 1;
    }
    Ok(out)
}

fn storage_set(mut caller: Caller<'_, HostState>, key_ptr: u32, value_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    let value_str = mem.get_string(&mut caller, value_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_set_cost(key_str.len() as u64, value_str.len() as u64))?;
    let value = U256::from_dec_str(value_str.trim()).map_err(|_| host_err(EngineError::InvalidApiArgs))?;
    let key = hashed_key(key_str.as_bytes());
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    let (state, address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    super::block_on(state.set_storage(address, key, StorageValue::new(bytes))).map_err(|e| host_err(e.into()))
}

fn storage_set_string(mut caller: Caller<'_, HostState>, key_ptr: u32, value_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    let value_str = mem.get_string(&mut caller, value_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_set_cost(key_str.len() as u64, value_str.len() as u64))?;
    let key = hashed_key(key_str.as_bytes());
    let (state, address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    super::block_on(store_chunked(state.as_ref(), address, key, value_str.as_bytes())).map_err(host_err)
}

fn storage_pure_set_string(mut caller: Caller<'_, HostState>, key_ptr: u32, value_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    let value_str = mem.get_string(&mut caller, value_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_set_cost(key_str.len() as u64, value_str.len() as u64))?;
    let key = pure_key(key_str.as_bytes());
    let (state, address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    super::block_on(store_chunked(state.as_ref(), address, key, value_str.as_bytes())).map_err(host_err)
}

fn storage_get(mut caller: Caller<'_, HostState>, key_ptr: u32) -> Result<u32, wasmi::Error> {
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_load_cost(key_str.len() as u64))?;
    let key = hashed_key(key_str.as_bytes());
    let (state, address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    let value = super::block_on(state.get_storage(address, key)).map_err(|e| host_err(e.into()))?;
    let number = U256::from_big_endian(value.as_bytes());
    write_str(&mem, &mut caller, &number.to_string())
}

fn storage_get_string(mut caller: Caller<'_, HostState>, key_ptr: u32) -> Result<u32, wasmi::Error> {
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_load_cost(key_str.len() as u64))?;
    let key = hashed_key(key_str.as_bytes());
    let (state, address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    let bytes = super::block_on(load_chunked(state.as_ref(), address, key)).map_err(host_err)?;
    write_bytes(&mem, &mut caller, &bytes)
}

fn storage_pure_get_string(mut caller: Caller<'_, HostState>, key_ptr: u32) -> Result<u32, wasmi::Error> {
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_load_cost(key_str.len() as u64))?;
    let key = pure_key(key_str.as_bytes());
    let (state, address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    let bytes = super::block_on(load_chunked(state.as_ref(), address, key)).map_err(host_err)?;
    write_bytes(&mem, &mut caller, &bytes)
}

fn storage_del(mut caller: Caller<'_, HostState>, key_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_load_cost(key_str.len() as u64))?;
    let key = hashed_key(key_str.as_bytes());
    let (state, address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    super::block_on(state.set_storage(address, key, StorageValue::ZERO)).map_err(|e| host_err(e.into()))
}

fn contract_storage_get(mut caller: Caller<'_, HostState>, addr_ptr: u32, key_ptr: u32) -> Result<u32, wasmi::Error> {
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let address = read_address(&mem, &mut caller, addr_ptr)?;
    let key_str = mem.get_string(&mut caller, key_ptr).map_err(host_err)?;
    charge(&caller, gas::storage_load_cost(key_str.len() as u64))?;
    let key = hashed_key(key_str.as_bytes());
    let state = crate::engine::shared_ref(caller.data()).state.clone();
    let value = super::block_on(state.get_storage(address, key)).map_err(|e| host_err(e.into()))?;
    let number = U256::from_big_endian(value.as_bytes());
    write_str(&mem, &mut caller, &number.to_string())
}
