//! Balance/transfer family: `TC_GetBalance`, `TC_Transfer`,
//! `TC_TransferToken`, `TC_TokenBalance`, `TC_Issue`, `TC_SelfDestruct`.
//!
//! Value-moving calls preflight with `get_balance` before debiting, and
//! reject outright under `StaticCall` the same way storage writes do —
//! moving value is a state mutation regardless of whether it goes through
//! the wrapper's top-level value-transfer preflight or a host call mid-run.

use super::{charge, frame_memory, host_err, read_address, write_str};
use crate::domain::value_objects::BigInt;
use crate::engine::HostState;
use crate::errors::EngineError;
use crate::gas::costs;
use std::str::FromStr;
use wasmi::{Caller, Linker};

pub(super) fn link(linker: &mut Linker<HostState>) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap("env", "TC_GetBalance", get_balance)?;
    linker.func_wrap("env", "TC_Transfer", transfer)?;
    linker.func_wrap("env", "TC_TransferToken", transfer_token)?;
    linker.func_wrap("env", "TC_TokenBalance", token_balance)?;
    linker.func_wrap("env", "TC_Issue", issue)?;
    linker.func_wrap("env", "TC_SelfDestruct", self_destruct)?;
    Ok(())
}

fn get_balance(mut caller: Caller<'_, HostState>, addr_ptr: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::BALANCE_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let address = read_address(&mem, &mut caller, addr_ptr)?;
    let state = crate::engine::shared_ref(caller.data()).state.clone();
    let balance = super::block_on(state.get_balance(address)).map_err(|e| host_err(e.into()))?;
    write_str(&mem, &mut caller, &balance.to_string())
}

fn transfer(mut caller: Caller<'_, HostState>, addr_ptr: u32, amount_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    charge(&caller, Ok(costs::CALL_VALUE_TRANSFER_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let to = read_address(&mem, &mut caller, addr_ptr)?;
    let amount_str = mem.get_string(&mut caller, amount_ptr).map_err(host_err)?;
    let amount = BigInt::from_str(amount_str.trim()).map_err(|_| host_err(EngineError::InvalidApiArgs))?;
    let (state, from) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    let balance = super::block_on(state.get_balance(from)).map_err(|e| host_err(e.into()))?;
    if balance < amount {
        return Err(host_err(EngineError::BalanceNotEnough));
    }
    super::block_on(async {
        state.sub_balance(from, amount.clone()).await?;
        state.add_balance(to, amount).await
    })
    .map_err(|e| host_err(e.into()))
}

fn transfer_token(mut caller: Caller<'_, HostState>, addr_ptr: u32, token_ptr: u32, amount_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    charge(&caller, Ok(costs::CALL_VALUE_TRANSFER_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let to = read_address(&mem, &mut caller, addr_ptr)?;
    let token = read_address(&mem, &mut caller, token_ptr)?;
    let amount_str = mem.get_string(&mut caller, amount_ptr).map_err(host_err)?;
    let amount = BigInt::from_str(amount_str.trim()).map_err(|_| host_err(EngineError::InvalidApiArgs))?;
    let (state, from) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    let balance = super::block_on(state.get_token_balance(from, token)).map_err(|e| host_err(e.into()))?;
    if balance < amount {
        return Err(host_err(EngineError::BalanceNotEnough));
    }
    super::block_on(async {
        state.sub_token_balance(from, token, amount.clone()).await?;
        state.add_token_balance(to, token, amount).await
    })
    .map_err(|e| host_err(e.into()))
}

fn token_balance(mut caller: Caller<'_, HostState>, addr_ptr: u32, token_ptr: u32) -> Result<u32, wasmi::Error> {
    charge(&caller, Ok(costs::BALANCE_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let address = read_address(&mem, &mut caller, addr_ptr)?;
    let token = read_address(&mem, &mut caller, token_ptr)?;
    let state = crate::engine::shared_ref(caller.data()).state.clone();
    let balance = super::block_on(state.get_token_balance(address, token)).map_err(|e| host_err(e.into()))?;
    write_str(&mem, &mut caller, &balance.to_string())
}

/// Mints `amount` of a new token under the current contract's own address
/// (the contract address doubles as the token's `TokenId`), crediting the
/// contract itself.
fn issue(mut caller: Caller<'_, HostState>, amount_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    charge(&caller, Ok(costs::ISSUE_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let amount_str = mem.get_string(&mut caller, amount_ptr).map_err(host_err)?;
    let amount = BigInt::from_str(amount_str.trim()).map_err(|_| host_err(EngineError::InvalidApiArgs))?;
    let (state, self_address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.contract.self_address)
    };
    super::block_on(state.add_token_balance(self_address, self_address, amount)).map_err(|e| host_err(e.into()))
}

fn self_destruct(mut caller: Caller<'_, HostState>, beneficiary_ptr: u32) -> Result<(), wasmi::Error> {
    super::reject_under_static_call(&caller)?;
    charge(&caller, Ok(costs::CALL_VALUE_TRANSFER_GAS))?;
    let mem = frame_memory(&mut caller).map_err(host_err)?;
    let beneficiary = read_address(&mem, &mut caller, beneficiary_ptr)?;
    let (state, module_cache, self_address) = {
        let shared = crate::engine::shared_ref(caller.data());
        (shared.state.clone(), shared.module_cache.clone(), shared.contract.self_address)
    };
    super::block_on(async {
        let remaining = state.get_balance(self_address).await?;
        if remaining != BigInt::from(0) {
            state.sub_balance(self_address, remaining.clone()).await?;
            state.add_balance(beneficiary, remaining).await?;
        }
        for (token, amount) in state.get_token_balances(self_address).await? {
            if amount != BigInt::from(0) {
                state.sub_token_balance(self_address, token, amount.clone()).await?;
                state.add_token_balance(beneficiary, token, amount).await?;
            }
        }
        state.suicide(self_address).await
    })
    .map_err(|e| host_err(e.into()))?;
    module_cache.delete(&self_address.to_hex());
    Ok(())
}
