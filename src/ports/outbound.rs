//! # Driven ports (SPI — outbound)
//!
//! Interfaces the engine depends on but does not implement: chain state and
//! ECDSA signature recovery. Adapters implement these traits; dependencies
//! point inward from the adapter toward the domain, never the reverse.

use crate::domain::entities::{Account, Log};
use crate::domain::value_objects::{Address, BigInt, Bytes, EcdsaSignature, Hash, StorageKey, StorageValue, TokenId};
use crate::errors::StateError;
use async_trait::async_trait;

/// Side-table record an AOT-loaded native handle is keyed by, persisted
/// alongside account state under `cfso:<name>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractInfo {
    /// Compilation kind (`"wasm"` or `"native"`).
    pub kind: String,
    /// Filesystem path of the compiled artifact.
    pub path: String,
    /// MD5 of the source `.wasm`, used to detect staleness.
    pub md5: String,
    /// Last compilation error, if any.
    pub err: Option<String>,
}

/// Interface for reading and mutating chain state during a run.
///
/// This subsystem is the only writer of state; every mutation here is
/// provisional until the enclosing snapshot commits.
#[async_trait]
pub trait StateAccess: Send + Sync {
    /// Fetches the full account record, if the account has ever existed.
    async fn get_account(&self, address: Address) -> Result<Option<Account>, StateError>;

    /// Materializes a fresh, empty account record at `address`.
    async fn create_account(&self, address: Address) -> Result<(), StateError>;

    /// True if the account has ever interacted with the chain.
    async fn account_exists(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.get_account(address).await?.is_some())
    }

    /// Base-token balance (zero for an account that has never existed).
    async fn get_balance(&self, address: Address) -> Result<BigInt, StateError> {
        Ok(self
            .get_account(address)
            .await?
            .map(|a| a.balance)
            .unwrap_or_else(|| BigInt::from(0)))
    }

    /// Overwrites the base-token balance.
    async fn set_balance(&self, address: Address, balance: BigInt) -> Result<(), StateError>;

    /// Debits the base-token balance; fails with `StateError::Corrupted` if
    /// the balance would go negative (callers are expected to preflight).
    async fn sub_balance(&self, address: Address, amount: BigInt) -> Result<(), StateError>;

    /// Credits the base-token balance.
    async fn add_balance(&self, address: Address, amount: BigInt) -> Result<(), StateError>;

    /// Balance of a specific token (the base token when `token.is_zero()`).
    async fn get_token_balance(&self, address: Address, token: TokenId) -> Result<BigInt, StateError> {
        Ok(self
            .get_account(address)
            .await?
            .map(|a| a.token_balance(token))
            .unwrap_or_else(|| BigInt::from(0)))
    }

    /// Overwrites a token sub-balance.
    async fn set_token_balance(&self, address: Address, token: TokenId, balance: BigInt) -> Result<(), StateError>;

    /// Debits a token sub-balance.
    async fn sub_token_balance(&self, address: Address, token: TokenId, amount: BigInt) -> Result<(), StateError>;

    /// Credits a token sub-balance.
    async fn add_token_balance(&self, address: Address, token: TokenId, amount: BigInt) -> Result<(), StateError>;

    /// Every non-zero token sub-balance held by the account.
    async fn get_token_balances(&self, address: Address) -> Result<Vec<(TokenId, BigInt)>, StateError>;

    /// Account nonce (zero for an account that has never existed).
    async fn get_nonce(&self, address: Address) -> Result<u64, StateError> {
        Ok(self.get_account(address).await?.map(|a| a.nonce).unwrap_or(0))
    }

    /// Overwrites the account nonce.
    async fn set_nonce(&self, address: Address, nonce: u64) -> Result<(), StateError>;

    /// Contract bytecode (empty for an externally-owned account).
    async fn get_code(&self, address: Address) -> Result<Bytes, StateError>;

    /// Installs runtime bytecode, updating `code_hash` to match.
    async fn set_code(&self, address: Address, code: Bytes) -> Result<(), StateError>;

    /// `keccak256(code)`, or the empty-code hash for an EOA.
    async fn get_code_hash(&self, address: Address) -> Result<Hash, StateError> {
        match self.get_account(address).await? {
            Some(a) => Ok(a.code_hash),
            None => Ok(Account::empty_code_hash()),
        }
    }

    /// Code length in bytes.
    async fn get_code_size(&self, address: Address) -> Result<usize, StateError> {
        Ok(self.get_code(address).await?.len())
    }

    /// True when the account carries non-empty code.
    async fn is_contract(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.get_code_size(address).await? > 0)
    }

    /// Storage slot value (`StorageValue::ZERO` if never written).
    async fn get_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue, StateError>;

    /// Writes a storage slot.
    async fn set_storage(&self, address: Address, key: StorageKey, value: StorageValue) -> Result<(), StateError>;

    /// Marks the account for removal at the end of the enclosing
    /// transaction (`TC_SelfDestruct`).
    async fn suicide(&self, address: Address) -> Result<(), StateError>;

    /// True if `suicide` was called on this account in the current run.
    async fn has_suicided(&self, address: Address) -> Result<bool, StateError>;

    /// Opens a new revertible snapshot and returns its id.
    async fn snapshot(&self) -> Result<u64, StateError>;

    /// Rolls back every mutation recorded since `id` was opened.
    async fn revert_to_snapshot(&self, id: u64) -> Result<(), StateError>;

    /// Appends a log record to the current transaction's receipt.
    async fn add_log(&self, log: Log) -> Result<(), StateError>;

    /// Logs recorded so far in the current transaction.
    async fn logs(&self) -> Result<Vec<Log>, StateError>;

    /// Hash of the transaction currently executing.
    async fn tx_hash(&self) -> Result<Hash, StateError>;

    /// AOT side-table record for a compiled module, keyed `cfso:<name>`.
    async fn get_contract_info(&self, name: &str) -> Result<Option<ContractInfo>, StateError>;

    /// Persists an AOT side-table record.
    async fn set_contract_info(&self, name: &str, info: ContractInfo) -> Result<(), StateError>;
}

/// Interface for ECDSA signature recovery, backing `TC_Ecrecover`/
/// `TC_CheckSign`.
pub trait SignatureVerifier: Send + Sync {
    /// Recovers the signer address from a message hash and signature, under
    /// the given chain id (used to derive the recovery id per EIP-155).
    fn ecrecover(&self, hash: &Hash, signature: &EcdsaSignature, chain_id: u64) -> Option<Address>;
}
