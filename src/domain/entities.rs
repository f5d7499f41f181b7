//! # Core Domain Entities
//!
//! Account state, the per-invocation execution context, and the log record
//! produced by the `TC_Log0..4`/`TC_Notify` host functions.

use crate::domain::value_objects::{Address, BigInt, Hash, TokenId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// ACCOUNT
// =============================================================================

/// On-chain account record.
///
/// Invariants: `balance` and every entry of `tokens` are non-negative;
/// `code_hash == keccak256(code)`; a `suicided` account keeps its slot until
/// the enclosing snapshot commits, but behaves as empty to every reader.
#[derive(Clone, Debug, Default)]
pub struct Account {
    /// Transaction/creation nonce.
    pub nonce: u64,
    /// Opaque account-level credit counter (unrelated to gas).
    pub credits: u64,
    /// Base-token balance.
    pub balance: BigInt,
    /// Per-token sub-balances, keyed by `TokenId` (an `Address`).
    pub tokens: BTreeMap<TokenId, BigInt>,
    /// `keccak256(code)`.
    pub code_hash: Hash,
    /// Root of the account's storage trie (opaque to the engine).
    pub storage_root: Hash,
    /// Contract bytecode; empty for externally-owned accounts.
    pub code: Vec<u8>,
    /// Set by `TC_SelfDestruct`; the account is logically empty thereafter.
    pub suicided: bool,
}

impl Account {
    /// Returns the hash of the empty byte string, i.e. the `code_hash` of an
    /// externally-owned account.
    #[must_use]
    pub fn empty_code_hash() -> Hash {
        use sha3::{Digest, Keccak256};
        Hash::from_slice(&Keccak256::digest([])).expect("keccak256 output is 32 bytes")
    }

    /// True when the account has no code (an externally-owned account).
    #[must_use]
    pub fn is_eoa(&self) -> bool {
        self.code.is_empty()
    }

    /// True when the account carries contract bytecode.
    #[must_use]
    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }

    /// True when the account is indistinguishable from one that never
    /// existed: zero nonce, zero base balance, no code, not suicided (a
    /// suicided account behaves as empty regardless of residual fields).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.suicided
            || (self.nonce == 0
                && self.balance == BigInt::from(0)
                && self.code.is_empty()
                && self.tokens.values().all(|v| *v == BigInt::from(0)))
    }

    /// Balance of the given token (zero if absent).
    #[must_use]
    pub fn token_balance(&self, token: TokenId) -> BigInt {
        if token.is_zero() {
            self.balance.clone()
        } else {
            self.tokens.get(&token).cloned().unwrap_or_else(|| BigInt::from(0))
        }
    }
}

// =============================================================================
// EXECUTION CONTEXT
// =============================================================================

/// Per-invocation execution context: the block and transaction facts visible
/// to every frame of a run, plus the gas-scaling and addressing policy knobs.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Block proposer address, returned by `TC_GetCoinbase`.
    pub coinbase: Address,
    /// Current block number, returned by `TC_GetNumber`.
    pub block_number: u64,
    /// Current block timestamp, returned by `TC_GetTimestamp`/`TC_Now`.
    pub time: u64,
    /// Block gas limit, returned by `TC_GetGasLimit`.
    pub gas_limit: u64,
    /// Block difficulty.
    pub difficulty: BigInt,
    /// Transaction origin (the EOA that signed the top-level transaction).
    pub origin: Address,
    /// Transaction gas price, returned by `TC_GetTxGasPrice`.
    pub gas_price: BigInt,
    /// Token under which the top-level call's value was denominated.
    pub token: TokenId,
    /// Transaction-level nonce, consulted by v2 address derivation.
    pub nonce: u64,
    /// Scaling factor between host-charged gas and the guest-visible budget.
    pub wasm_gas_rate: u64,
    /// Selects the v2 `Create` address-derivation policy (uses `nonce`
    /// instead of the caller account's on-chain nonce).
    pub is_version2: bool,
    /// Historical block hash oracle backing `TC_BlockHash`.
    pub get_block_hash: Arc<dyn Fn(u64) -> Option<Hash> + Send + Sync>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("coinbase", &self.coinbase)
            .field("block_number", &self.block_number)
            .field("time", &self.time)
            .field("gas_limit", &self.gas_limit)
            .field("origin", &self.origin)
            .field("token", &self.token)
            .field("nonce", &self.nonce)
            .field("wasm_gas_rate", &self.wasm_gas_rate)
            .field("is_version2", &self.is_version2)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Builds a context with a block-hash oracle that always returns `None`
    /// (suitable for tests that never call `TC_BlockHash`).
    #[must_use]
    pub fn new(
        coinbase: Address,
        block_number: u64,
        time: u64,
        gas_limit: u64,
        origin: Address,
        gas_price: BigInt,
        wasm_gas_rate: u64,
    ) -> Self {
        Self {
            coinbase,
            block_number,
            time,
            gas_limit,
            difficulty: BigInt::from(0),
            origin,
            gas_price,
            token: Address::ZERO,
            nonce: 0,
            wasm_gas_rate,
            is_version2: false,
            get_block_hash: Arc::new(|_| None),
        }
    }
}

// =============================================================================
// LOG
// =============================================================================

/// An event log emitted by `TC_Log0..TC_Log4` or `TC_Notify`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    /// The contract that emitted the log (always the current self address).
    pub address: Address,
    /// Indexed topics (0 to 4 of them); `TC_Notify` sets topic 0 to
    /// `keccak256(event_id)`.
    pub topics: Vec<Hash>,
    /// Unindexed payload.
    pub data: Vec<u8>,
    /// Block number at emission time.
    pub block_number: u64,
    /// Block timestamp at emission time.
    pub block_time: u64,
}

impl Log {
    /// Creates a new log record.
    #[must_use]
    pub fn new(address: Address, topics: Vec<Hash>, data: Vec<u8>, block_number: u64, block_time: u64) -> Self {
        Self {
            address,
            topics,
            data,
            block_number,
            block_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_empty_by_default() {
        let acct = Account::default();
        assert!(acct.is_empty());
        assert!(acct.is_eoa());
    }

    #[test]
    fn account_token_balance_defaults_zero() {
        let acct = Account::default();
        assert_eq!(acct.token_balance(Address::new([9u8; 20])), BigInt::from(0));
    }

    #[test]
    fn suicided_account_is_empty_regardless_of_balance() {
        let mut acct = Account::default();
        acct.balance = BigInt::from(100);
        acct.suicided = true;
        assert!(acct.is_empty());
    }
}
