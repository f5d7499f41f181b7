//! # Wrapper (C8)
//!
//! The contract-lifecycle entry points — `Call`, `CallCode`, `DelegateCall`,
//! `StaticCall`, `Create`, `Upgrade` — sitting above [`crate::engine::Engine`]
//! the same way a service layer sits above its interpreter: one public
//! `async fn` per lifecycle operation, each snapshotting state before any
//! effect, preflighting value transfers, and reconciling gas/REVERT
//! semantics on every exit path per §4.8/§7.

use crate::contract::Contract;
use crate::domain::entities::ExecutionContext;
use crate::domain::value_objects::{Address, BigInt, Bytes};
use crate::engine::Engine;
use crate::errors::EngineError;
use crate::module_cache::ModuleCache;
use crate::ports::config::EngineConfig;
use crate::ports::outbound::{SignatureVerifier, StateAccess};
use std::sync::Arc;

/// The result of a wrapper-level lifecycle call.
///
/// On success: the guest's raw return bytes and the gas actually consumed.
/// On failure: the error alongside the gas that should be treated as spent —
/// per §4.8/§7, a non-revert error consumes the entire budget handed to the
/// call, while `ExecutionReverted` only consumes what actually ran before
/// the revert, leaving the rest for the caller to refund.
pub type CallResult = Result<(Vec<u8>, u64), (EngineError, u64)>;

/// Drives the full lifecycle of a contract invocation: depth bound, value
/// preflight, snapshot/revert, and gas reconciliation around a single
/// [`Engine::run`].
pub struct Wrapper {
    state: Arc<dyn StateAccess>,
    signer: Arc<dyn SignatureVerifier>,
    module_cache: Arc<ModuleCache>,
    config: EngineConfig,
}

impl Wrapper {
    /// Builds a wrapper over the given state/signature ports, module cache
    /// and engine configuration.
    #[must_use]
    pub fn new(
        state: Arc<dyn StateAccess>,
        signer: Arc<dyn SignatureVerifier>,
        module_cache: Arc<ModuleCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            state,
            signer,
            module_cache,
            config,
        }
    }

    /// A regular value-transferring call: runs `to`'s code as `to`'s own
    /// identity, creating the destination account if it doesn't yet exist.
    #[tracing::instrument(skip(self, ctx, input), fields(to = %to, gas, depth))]
    pub async fn call(
        &self,
        ctx: ExecutionContext,
        caller: Address,
        to: Address,
        value: BigInt,
        gas: u64,
        input: &[u8],
        depth: u16,
    ) -> CallResult {
        self.check_depth(depth).map_err(|e| (e, 0))?;
        self.preflight_value(caller, &ctx, &value).await.map_err(|e| (e, 0))?;

        let snapshot = self.state.snapshot().await.map_err(|e| (EngineError::from(e), 0))?;
        let result = self.call_body(ctx, caller, to, value, gas, input).await;
        self.finalize(snapshot, gas, result).await
    }

    async fn call_body(&self, ctx: ExecutionContext, caller: Address, to: Address, value: BigInt, gas: u64, input: &[u8]) -> CallResult {
        if !self.state.account_exists(to).await.map_err(|e| (EngineError::from(e), 0))? {
            self.state.create_account(to).await.map_err(|e| (EngineError::from(e), 0))?;
        }
        if !value.eq(&BigInt::from(0)) {
            self.transfer_value(caller, to, &ctx, &value).await.map_err(|e| (e, 0))?;
        }
        let contract = Contract::new_contract(caller, to, value, gas);
        self.run_frame(ctx, contract, to, input, false).await
    }

    /// Runs `to`'s code under the caller's own identity (self stays
    /// `caller`), the way `CallCode` differs from a plain `Call`: storage
    /// and `self` belong to the caller, but `msg.sender` is still the
    /// calling contract (unlike `DelegateCall`, which inherits it too).
    #[tracing::instrument(skip(self, ctx, input), fields(to = %to, gas, depth))]
    pub async fn call_code(
        &self,
        ctx: ExecutionContext,
        caller: Address,
        to: Address,
        value: BigInt,
        gas: u64,
        input: &[u8],
        depth: u16,
    ) -> CallResult {
        self.check_depth(depth).map_err(|e| (e, 0))?;
        self.preflight_value(caller, &ctx, &value).await.map_err(|e| (e, 0))?;

        let snapshot = self.state.snapshot().await.map_err(|e| (EngineError::from(e), 0))?;
        let result = self.call_code_body(ctx, caller, to, value, gas, input).await;
        self.finalize(snapshot, gas, result).await
    }

    async fn call_code_body(&self, ctx: ExecutionContext, caller: Address, to: Address, value: BigInt, gas: u64, input: &[u8]) -> CallResult {
        if !value.eq(&BigInt::from(0)) {
            self.transfer_value(caller, caller, &ctx, &value).await.map_err(|e| (e, 0))?;
        }
        let mut contract = Contract::new_contract(caller, caller, value, gas);
        contract.code_addr = to;
        self.run_frame(ctx, contract, to, input, false).await
    }

    /// Runs `to`'s code fully under the parent frame's identity: `self`,
    /// `caller` and `value` are all inherited, per §4.8's delegate semantics.
    #[tracing::instrument(skip(self, ctx, input, parent), fields(to = %to, gas, depth))]
    pub async fn delegate_call(
        &self,
        ctx: ExecutionContext,
        parent: &Contract,
        to: Address,
        gas: u64,
        input: &[u8],
        depth: u16,
    ) -> CallResult {
        self.check_depth(depth).map_err(|e| (e, 0))?;

        let snapshot = self.state.snapshot().await.map_err(|e| (EngineError::from(e), 0))?;
        let contract = Contract::new_contract(parent.caller, parent.self_address, parent.value.clone(), gas).as_delegate(parent, to);
        let result = self.run_frame(ctx, contract, to, input, false).await;
        self.finalize(snapshot, gas, result).await
    }

    /// Runs `to`'s code read-only: `value` is forced to zero and every
    /// state-mutating host function refuses with `WriteProtection`.
    #[tracing::instrument(skip(self, ctx, input), fields(to = %to, gas, depth))]
    pub async fn static_call(
        &self,
        ctx: ExecutionContext,
        caller: Address,
        to: Address,
        gas: u64,
        input: &[u8],
        depth: u16,
    ) -> CallResult {
        self.check_depth(depth).map_err(|e| (e, 0))?;
        let snapshot = self.state.snapshot().await.map_err(|e| (EngineError::from(e), 0))?;
        let contract = Contract::new_contract(caller, to, BigInt::from(0), gas);
        let result = self.run_frame(ctx, contract, to, input, true).await;
        self.finalize(snapshot, gas, result).await
    }

    /// Deploys `code` as a new contract, running its `Init` action against
    /// `init_input`, then persisting `code` as the account's runtime
    /// bytecode once it clears the code-size limit.
    ///
    /// This host ABI has no separate constructor/runtime-code split the way
    /// an EVM `CREATE` does (one module serves both the `Init` action and
    /// every later call); the size limit and `CreateDataGas` charge
    /// therefore apply to the deployed module itself rather than to bytes
    /// returned by a distinct constructor.
    #[tracing::instrument(skip(self, ctx, code, init_input), fields(gas, depth))]
    pub async fn create(
        &self,
        ctx: ExecutionContext,
        caller: Address,
        value: BigInt,
        gas: u64,
        code: Vec<u8>,
        init_input: &[u8],
        depth: u16,
    ) -> Result<(Address, Vec<u8>, u64), (EngineError, u64)> {
        self.check_depth(depth).map_err(|e| (e, 0))?;
        self.preflight_value(caller, &ctx, &value).await.map_err(|e| (e, 0))?;

        let account_nonce = self.state.get_nonce(caller).await.map_err(|e| (EngineError::from(e), 0))?;
        let new_address = crate::domain::services::create_address(caller, account_nonce, ctx.nonce, ctx.is_version2);

        let existing_code = self.state.get_code(new_address).await.map_err(|e| (EngineError::from(e), 0))?;
        let existing_nonce = self.state.get_nonce(new_address).await.map_err(|e| (EngineError::from(e), 0))?;
        if !existing_code.is_empty() || existing_nonce != 0 {
            return Err((EngineError::ContractAddressCollision(new_address), 0));
        }

        let snapshot = self.state.snapshot().await.map_err(|e| (EngineError::from(e), 0))?;
        let result = self.create_body(ctx, caller, new_address, value, gas, code, init_input).await;
        match self.finalize(snapshot, gas, result).await {
            Ok((output, consumed)) => Ok((new_address, output, consumed)),
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_body(
        &self,
        ctx: ExecutionContext,
        caller: Address,
        new_address: Address,
        value: BigInt,
        gas: u64,
        code: Vec<u8>,
        init_input: &[u8],
    ) -> CallResult {
        self.state.create_account(new_address).await.map_err(|e| (EngineError::from(e), 0))?;
        self.state.set_nonce(new_address, 1).await.map_err(|e| (EngineError::from(e), 0))?;
        if !value.eq(&BigInt::from(0)) {
            self.transfer_value(caller, new_address, &ctx, &value).await.map_err(|e| (e, 0))?;
        }

        let mut contract = Contract::new_contract(caller, new_address, value, gas);
        contract.create_call = true;
        let rate = ctx.wasm_gas_rate.max(1);
        let scaled_gas = gas.checked_mul(rate).ok_or((EngineError::GasOverflow, 0))?;
        let engine = Engine::new(
            self.state.clone(),
            self.signer.clone(),
            self.module_cache.clone(),
            scaled_gas,
            contract,
            ctx.clone(),
            false,
        );
        let frame = engine.new_app(&new_address.to_hex(), Some(code.clone()), false).map_err(|e| (e, 0))?;
        let (output, _consumed) = engine
            .run(&frame, init_input)
            .map_err(|e| (e, engine.gas_used().div_ceil(rate)))?;

        if code.len() > self.config.max_code_size {
            return Err((
                EngineError::MaxCodeSizeExceeded {
                    size: code.len(),
                    max: self.config.max_code_size,
                },
                engine.gas_used().div_ceil(rate),
            ));
        }
        // `create_data_cost` is already expressed in guest-scaled units, so it
        // charges directly against the engine's (now correctly scaled)
        // internal pool alongside every other host cost.
        let store_cost =
            crate::gas::create_data_cost(code.len() as u64).map_err(|e| (e, engine.gas_used().div_ceil(rate)))?;
        crate::engine::charge_gas(&engine.shared_handle(), store_cost)
            .map_err(|_| (EngineError::CodeStoreOutOfGas, engine.gas_used().div_ceil(rate)))?;
        self.state
            .set_code(new_address, Bytes::from(code))
            .await
            .map_err(|e| (EngineError::from(e), engine.gas_used().div_ceil(rate)))?;
        Ok((output, engine.gas_used().div_ceil(rate)))
    }

    /// Replaces the code at `address`, increments `origin`'s nonce, and
    /// evicts the module cache entry so the next `Call` loads the new code.
    #[tracing::instrument(skip(self, code))]
    pub async fn upgrade(&self, origin: Address, address: Address, code: Vec<u8>) -> Result<(), EngineError> {
        let nonce = self.state.get_nonce(origin).await.map_err(EngineError::from)?;
        self.state.set_code(address, Bytes::from(code)).await.map_err(EngineError::from)?;
        self.state
            .set_nonce(origin, nonce.saturating_add(1))
            .await
            .map_err(EngineError::from)?;
        self.module_cache.delete(&address.to_hex());
        Ok(())
    }

    fn check_depth(&self, depth: u16) -> Result<(), EngineError> {
        if depth > self.config.call_create_depth {
            return Err(EngineError::CallDepth);
        }
        Ok(())
    }

    async fn preflight_value(&self, from: Address, ctx: &ExecutionContext, value: &BigInt) -> Result<(), EngineError> {
        if value.eq(&BigInt::from(0)) {
            return Ok(());
        }
        let available = if ctx.token.is_zero() {
            self.state.get_balance(from).await.map_err(EngineError::from)?
        } else {
            self.state.get_token_balance(from, ctx.token).await.map_err(EngineError::from)?
        };
        if available < *value {
            return Err(EngineError::InsufficientBalance {
                required: value.to_string(),
                available: available.to_string(),
            });
        }
        Ok(())
    }

    async fn transfer_value(&self, from: Address, to: Address, ctx: &ExecutionContext, value: &BigInt) -> Result<(), EngineError> {
        if ctx.token.is_zero() {
            self.state.sub_balance(from, value.clone()).await.map_err(EngineError::from)?;
            self.state.add_balance(to, value.clone()).await.map_err(EngineError::from)?;
        } else {
            self.state
                .sub_token_balance(from, ctx.token, value.clone())
                .await
                .map_err(EngineError::from)?;
            self.state
                .add_token_balance(to, ctx.token, value.clone())
                .await
                .map_err(EngineError::from)?;
        }
        Ok(())
    }

    /// Runs one guest invocation under a `gas·wasmGasRate` budget (§4.8): the
    /// engine's internal pool is the caller's `gas` scaled up by the
    /// configured rate, and every figure handed back out is descaled to
    /// native units via ceiling division, so `Contract::gas` itself — read
    /// directly by `TC_GetMsgGas` — never needs to change units.
    async fn run_frame(&self, ctx: ExecutionContext, contract: Contract, code_addr: Address, input: &[u8], is_static: bool) -> CallResult {
        let gas = contract.gas;
        let rate = ctx.wasm_gas_rate.max(1);
        let scaled_gas = gas.checked_mul(rate).ok_or((EngineError::GasOverflow, 0))?;
        let engine = Engine::new(
            self.state.clone(),
            self.signer.clone(),
            self.module_cache.clone(),
            scaled_gas,
            contract,
            ctx,
            is_static,
        );
        let code = self.state.get_code(code_addr).await.map_err(|e| (EngineError::from(e), 0))?;
        if code.is_empty() {
            return Err((EngineError::ContractNoCode, 0));
        }
        let frame = engine.new_app(&code_addr.to_hex(), Some(code.into_vec()), false).map_err(|e| (e, 0))?;
        engine
            .run(&frame, input)
            .map(|(bytes, used)| (bytes, used.div_ceil(rate)))
            .map_err(|e| {
                let consumed = engine.gas_used().div_ceil(rate);
                (e, consumed)
            })
    }

    /// Reconciles the snapshot around a completed (or failed) run and
    /// applies §4.8/§7's propagation rule: every error rolls every state
    /// mutation back to `snapshot`, and a non-revert error is normalised to
    /// consume the whole `initial_gas` budget regardless of how much the
    /// callee had actually charged when it failed, while `ExecutionReverted`
    /// keeps the partial figure the callee reports so the caller can refund
    /// the rest.
    async fn finalize(&self, snapshot: u64, initial_gas: u64, result: CallResult) -> CallResult {
        match result {
            Ok(ok) => Ok(ok),
            Err((e, consumed)) => {
                self.state
                    .revert_to_snapshot(snapshot)
                    .await
                    .map_err(|revert_err| (EngineError::from(revert_err), initial_gas))?;
                let consumed = if e.consumes_all_gas() { initial_gas } else { consumed };
                Err((e, consumed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Account;
    use crate::domain::value_objects::{Hash, StorageKey, StorageValue, TokenId};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemState {
        accounts: Mutex<HashMap<Address, Account>>,
    }

    impl MemState {
        fn new() -> Self {
            Self {
                accounts: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl StateAccess for MemState {
        async fn get_account(&self, address: Address) -> Result<Option<Account>, crate::errors::StateError> {
            Ok(self.accounts.lock().unwrap().get(&address).cloned())
        }
        async fn create_account(&self, address: Address) -> Result<(), crate::errors::StateError> {
            self.accounts.lock().unwrap().entry(address).or_default();
            Ok(())
        }
        async fn set_balance(&self, address: Address, balance: BigInt) -> Result<(), crate::errors::StateError> {
            self.accounts.lock().unwrap().entry(address).or_default().balance = balance;
            Ok(())
        }
        async fn sub_balance(&self, address: Address, amount: BigInt) -> Result<(), crate::errors::StateError> {
            let mut m = self.accounts.lock().unwrap();
            let a = m.entry(address).or_default();
            a.balance = a.balance.clone() - amount;
            Ok(())
        }
        async fn add_balance(&self, address: Address, amount: BigInt) -> Result<(), crate::errors::StateError> {
            let mut m = self.accounts.lock().unwrap();
            let a = m.entry(address).or_default();
            a.balance = a.balance.clone() + amount;
            Ok(())
        }
        async fn set_token_balance(&self, _: Address, _: TokenId, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn sub_token_balance(&self, _: Address, _: TokenId, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn add_token_balance(&self, _: Address, _: TokenId, _: BigInt) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn get_token_balances(&self, _: Address) -> Result<Vec<(TokenId, BigInt)>, crate::errors::StateError> {
            Ok(Vec::new())
        }
        async fn set_nonce(&self, address: Address, nonce: u64) -> Result<(), crate::errors::StateError> {
            self.accounts.lock().unwrap().entry(address).or_default().nonce = nonce;
            Ok(())
        }
        async fn get_code(&self, address: Address) -> Result<Bytes, crate::errors::StateError> {
            Ok(Bytes::from(
                self.accounts.lock().unwrap().get(&address).map(|a| a.code.clone()).unwrap_or_default(),
            ))
        }
        async fn set_code(&self, address: Address, code: Bytes) -> Result<(), crate::errors::StateError> {
            self.accounts.lock().unwrap().entry(address).or_default().code = code.as_slice().to_vec();
            Ok(())
        }
        async fn get_storage(&self, _: Address, _: StorageKey) -> Result<StorageValue, crate::errors::StateError> {
            Ok(StorageValue::ZERO)
        }
        async fn set_storage(&self, _: Address, _: StorageKey, _: StorageValue) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn suicide(&self, address: Address) -> Result<(), crate::errors::StateError> {
            self.accounts.lock().unwrap().entry(address).or_default().suicided = true;
            Ok(())
        }
        async fn has_suicided(&self, address: Address) -> Result<bool, crate::errors::StateError> {
            Ok(self.accounts.lock().unwrap().get(&address).map(|a| a.suicided).unwrap_or(false))
        }
        async fn snapshot(&self) -> Result<u64, crate::errors::StateError> {
            Ok(0)
        }
        async fn revert_to_snapshot(&self, _: u64) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn add_log(&self, _: crate::domain::entities::Log) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
        async fn logs(&self) -> Result<Vec<crate::domain::entities::Log>, crate::errors::StateError> {
            Ok(Vec::new())
        }
        async fn tx_hash(&self) -> Result<Hash, crate::errors::StateError> {
            Ok(Hash::ZERO)
        }
        async fn get_contract_info(&self, _: &str) -> Result<Option<crate::ports::outbound::ContractInfo>, crate::errors::StateError> {
            Ok(None)
        }
        async fn set_contract_info(&self, _: &str, _: crate::ports::outbound::ContractInfo) -> Result<(), crate::errors::StateError> {
            Ok(())
        }
    }

    struct NullSigner;
    impl SignatureVerifier for NullSigner {
        fn ecrecover(&self, _: &Hash, _: &crate::domain::value_objects::EcdsaSignature, _: u64) -> Option<Address> {
            None
        }
    }

    fn test_ctx() -> ExecutionContext {
        ExecutionContext::new(Address::ZERO, 1, 0, 0, Address::ZERO, BigInt::from(0), 1)
    }

    fn wrapper() -> Wrapper {
        Wrapper::new(
            Arc::new(MemState::new()),
            Arc::new(NullSigner),
            Arc::new(ModuleCache::new()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn call_fails_over_depth_limit() {
        let w = wrapper();
        let (err, consumed) = w
            .call(
                test_ctx(),
                Address::ZERO,
                Address::new([1u8; 20]),
                BigInt::from(0),
                1_000,
                b"ping|{}",
                crate::domain::invariants::limits::CALL_CREATE_DEPTH + 1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CallDepth));
        assert_eq!(consumed, 0);
    }

    #[tokio::test]
    async fn call_fails_with_insufficient_balance() {
        let w = wrapper();
        let (err, consumed) = w
            .call(
                test_ctx(),
                Address::ZERO,
                Address::new([1u8; 20]),
                BigInt::from(1),
                1_000,
                b"ping|{}",
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert_eq!(consumed, 0);
    }

    #[tokio::test]
    async fn call_fails_with_no_code_when_destination_empty() {
        let w = wrapper();
        let (err, consumed) = w
            .call(
                test_ctx(),
                Address::ZERO,
                Address::new([1u8; 20]),
                BigInt::from(0),
                1_000,
                b"ping|{}",
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractNoCode));
        // ContractNoCode is not a revert, so the whole budget handed to the
        // call is treated as spent even though nothing ever ran.
        assert_eq!(consumed, 1_000);
    }

    #[tokio::test]
    async fn create_rejects_collision_at_occupied_address() {
        let state = Arc::new(MemState::new());
        let w = Wrapper::new(
            state.clone(),
            Arc::new(NullSigner),
            Arc::new(ModuleCache::new()),
            EngineConfig::default(),
        );
        let caller = Address::new([9u8; 20]);
        let account_nonce = 0;
        let addr = crate::domain::services::create_address(caller, account_nonce, 0, false);
        state.set_code(addr, Bytes::from(vec![1, 2, 3])).await.unwrap();

        let (err, _consumed) = w
            .create(test_ctx(), caller, BigInt::from(0), 10_000, vec![0u8; 8], b"Init|{}", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractAddressCollision(a) if a == addr));
    }
}
