//! Hashing and signature family: `TC_Keccak256`, `TC_Sha256`, `TC_Ripemd160`,
//! `TC_Ecrecover`, `TC_CheckSign`.
//!
//! Hashes are returned as `0x`-prefixed lowercase hex strings, matching
//! every other guest-visible hex encoding in the ABI. `TC_Ecrecover` returns
//! the zero-length string (a null pointer) on recovery failure rather than
//! trapping — the guest is expected to check for an empty result, the same
//! convention the original host ABI uses for "this call failed softly".

use super::{charge, frame_memory, host_err, write_str};
use crate::domain::value_objects::{EcdsaSignature, Hash};
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::gas;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_Keccak256", keccak256)?;
    linker.func_wrap("env", "TC_Sha256", sha256)?;
    linker.func_wrap("env", "TC_Ripemd160", ripemd160)?;
    linker.func_wrap("env", "TC_Ecrecover", ecrecover)?;
    linker.func_wrap("env", "TC_CheckSign", check_sign)?;
    Ok(())
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn keccak256(mut caller: Caller<'_, HostState>, ptr: u32, len: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, gas::keccak256_cost(len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let data = mem.get_bytes(&mut caller, ptr, len).map_err(host_err)?;
    let digest = Keccak256::digest(&data);
    write_str(&mem, &mut caller, &format!("0x{}", hex_string(&digest)))
}

fn sha256(mut caller: Caller<'_, HostState>, ptr: u32, len: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, gas::sha256_cost(len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let data = mem.get_bytes(&mut caller, ptr, len).map_err(host_err)?;
    let digest = Sha256::digest(&data);
    write_str(&mem, &mut caller, &format!("0x{}", hex_string(&digest)))
}

fn ripemd160(mut caller: Caller<'_, HostState>, ptr: u32, len: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, gas::ripemd160_cost(len as u64))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let data = mem.get_bytes(&mut caller, ptr, len).map_err(host_err)?;
    let digest = Ripemd160::digest(&data);
    write_str(&mem, &mut caller, &format!("0x{}", hex_string(&digest)))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn read_signature(
    mem: &crate::memory::LinearMemory,
    caller: &mut Caller<'_, HostState>,
    hash_ptr: u32,
    sig_ptr: u32,
    v: i32,
) -> Result<(Hash, EcdsaSignature), wasmi::Error> {
    let hash_hex = mem.get_string(caller, hash_ptr).map_err(host_err)?;
    let hash_bytes = hex_decode(&hash_hex).ok_or_else(|| host_err(EngineError::InvalidApiArgs))?;
    let hash = Hash::from_slice(&hash_bytes).ok_or_else(|| host_err(EngineError::InvalidApiArgs))?;

    let sig_hex = mem.get_string(caller, sig_ptr).map_err(host_err)?;
    let sig_bytes = hex_decode(&sig_hex).ok_or_else(|| host_err(EngineError::InvalidApiArgs))?;
    if sig_bytes.len() != 64 {
        return Err(host_err(EngineError::InvalidApiArgs));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&sig_bytes[..32]);
    s.copy_from_slice(&sig_bytes[32..]);
    Ok((hash, EcdsaSignature::new(r, s, v as u8)))
}

fn ecrecover(
    mut caller: Caller<'_, HostState>,
    hash_ptr: u32,
    sig_ptr: u32,
    v: i32,
    chain_id: i64,
) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(gas::costs::ECRECOVER_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let (hash, sig) = read_signature(&mem, &mut caller, hash_ptr, sig_ptr, v)?;
    let signer = crate::engine::shared_ref(caller.data())
        .signer
        .ecrecover(&hash, &sig, chain_id.max(0) as u64);
    match signer {
        Some(addr) => write_str(&mem, &mut caller, &addr.to_hex()),
        None => write_str(&mem, &mut caller, ""),
    }
}

fn check_sign(
    mut caller: Caller<'_, HostState>,
    hash_ptr: u32,
    sig_ptr: u32,
    v: i32,
    chain_id: i64,
) -> Result<i32, wasmi::Error> {
    charge(&caller, Ok(gas::costs::ECRECOVER_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let (hash, sig) = read_signature(&mem, &mut caller, hash_ptr, sig_ptr, v)?;
    let expected = crate::engine::shared_ref(caller.data()).contract.caller;
    let signer = crate::engine::shared_ref(caller.data())
        .signer
        .ecrecover(&hash, &sig, chain_id.max(0) as u64);
    Ok(i32::from(signer == Some(expected)))
}
