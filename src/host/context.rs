//! Context family: everything a guest reads about who is calling it and
//! what block/transaction it is running in. All pure getters — `QUICK_STEP`
//! or `FAST_STEP` gas, no state mutation.

use super::{charge, frame_memory, host_err, read_address, write_str};
use crate::engine::HostState;
use crate::gas::costs;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_GetMsgSender", get_msg_sender)?;
    linker.func_wrap("env", "TC_GetMsgSign", get_msg_sign)?;
    linker.func_wrap("env", "TC_GetMsgData", get_msg_data)?;
    linker.func_wrap("env", "TC_GetMsgGas", get_msg_gas)?;
    linker.func_wrap("env", "TC_GetMsgValue", get_msg_value)?;
    linker.func_wrap("env", "TC_GetMsgTokenValue", get_msg_token_value)?;
    linker.func_wrap("env", "TC_GetTxOrigin", get_tx_origin)?;
    linker.func_wrap("env", "TC_GetTxGasPrice", get_tx_gas_price)?;
    linker.func_wrap("env", "TC_GetCoinbase", get_coinbase)?;
    linker.func_wrap("env", "TC_GetGasLimit", get_gas_limit)?;
    linker.func_wrap("env", "TC_GetNumber", get_number)?;
    linker.func_wrap("env", "TC_GetTimestamp", get_timestamp)?;
    linker.func_wrap("env", "TC_Now", get_timestamp)?;
    linker.func_wrap("env", "TC_BlockHash", block_hash)?;
    linker.func_wrap("env", "TC_GasLeft", gas_left)?;
    linker.func_wrap("env", "TC_GetSelfAddress", get_self_address)?;
    linker.func_wrap("env", "TC_TokenAddress", token_address)?;
    linker.func_wrap("env", "TC_IsHexAddress", is_hex_address)?;
    Ok(())
}

fn get_msg_sender(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let caller_addr = crate::engine::shared_ref(caller.data()).contract.caller.to_hex();
    write_str(&mem, &mut caller, &caller_addr)
}

fn get_msg_sign(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let input = crate::engine::shared_ref(caller.data()).contract.input.clone();
    let action_len = input.iter().position(|&b| b == b'|').unwrap_or(input.len());
    let action = String::from_utf8_lossy(&input[..action_len]).into_owned();
    write_str(&mem, &mut caller, &action)
}

fn get_msg_data(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::EXT_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let input = crate::engine::shared_ref(caller.data()).contract.input.clone();
    super::write_bytes(&mem, &mut caller, &input)
}

fn get_msg_gas(caller: Caller<'_, HostState>) -> Result<i64, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    Ok(crate::engine::shared_ref(caller.data()).contract.gas as i64)
}

fn get_msg_value(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let value = {
        let shared = crate::engine::shared_ref(caller.data());
        if shared.ctx.token.is_zero() {
            shared.contract.value.to_string()
        } else {
            "0".to_string()
        }
    };
    write_str(&mem, &mut caller, &value)
}

fn get_msg_token_value(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let value = {
        let shared = crate::engine::shared_ref(caller.data());
        if shared.ctx.token.is_zero() {
            "0".to_string()
        } else {
            shared.contract.value.to_string()
        }
    };
    write_str(&mem, &mut caller, &value)
}

fn get_tx_origin(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let origin = crate::engine::shared_ref(caller.data()).ctx.origin.to_hex();
    write_str(&mem, &mut caller, &origin)
}

fn get_tx_gas_price(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let price = crate::engine::shared_ref(caller.data()).ctx.gas_price.to_string();
    write_str(&mem, &mut caller, &price)
}

fn get_coinbase(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let coinbase = crate::engine::shared_ref(caller.data()).ctx.coinbase.to_hex();
    write_str(&mem, &mut caller, &coinbase)
}

fn get_gas_limit(caller: Caller<'_, HostState>) -> Result<i64, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    Ok(crate::engine::shared_ref(caller.data()).ctx.gas_limit as i64)
}

fn get_number(caller: Caller<'_, HostState>) -> Result<i64, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    Ok(crate::engine::shared_ref(caller.data()).ctx.block_number as i64)
}

fn get_timestamp(caller: Caller<'_, HostState>) -> Result<i64, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    Ok(crate::engine::shared_ref(caller.data()).ctx.time as i64)
}

fn block_hash(mut caller: Caller<'_, HostState>, number: i64) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::FAST_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let hash = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.ctx.get_block_hash)(number.max(0) as u64)
    };
    match hash {
        Some(h) => write_str(&mem, &mut caller, &format!("{h:?}")),
        None => write_str(&mem, &mut caller, ""),
    }
}

fn gas_left(caller: Caller<'_, HostState>) -> Result<i64, wasmi::Error> {
    let shared = crate::engine::shared_ref(caller.data());
    let rate = shared.ctx.wasm_gas_rate.max(1);
    Ok((shared.gas / rate) as i64)
}

fn get_self_address(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let self_addr = crate::engine::shared_ref(caller.data()).contract.self_address.to_hex();
    write_str(&mem, &mut caller, &self_addr)
}

fn token_address(mut caller: Caller<'_, HostState>) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let token = crate::engine::shared_ref(caller.data()).ctx.token.to_hex();
    write_str(&mem, &mut caller, &token)
}

fn is_hex_address(mut caller: Caller<'_, HostState>, ptr: u32) -> Result<i32, wasmi::Error> {
    charge(&caller, Ok(costs::QUICK_STEP))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    Ok(match read_address(&mem, &mut caller, ptr) {
        Ok(_) => 1,
        Err(_) => 0,
    })
}
