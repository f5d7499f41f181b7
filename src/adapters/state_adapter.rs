//! # In-memory state adapter
//!
//! A reference [`StateAccess`] implementation backed by a plain in-memory
//! account map plus a linear undo journal, so `wrapper`/`engine` tests (and
//! anything embedding this crate without its own chain state yet) have a
//! working adapter rather than a per-test mock. The real account store
//! (§1, "out of scope") is an external collaborator; this one exists to
//! make §3's `StateDB`/journal contract concrete and testable.

use crate::domain::entities::{Account, Log};
use crate::domain::value_objects::{Address, BigInt, Bytes, Hash, StorageKey, StorageValue, TokenId};
use crate::errors::StateError;
use crate::ports::outbound::{ContractInfo, StateAccess};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// One undoable mutation, recording the value it overwrote.
enum JournalEntry {
    /// Marks the point `snapshot()` returned `id`; `revert_to_snapshot(id)`
    /// unwinds the journal back to (and including) this marker.
    Snapshot(u64),
    Balance(Address, BigInt),
    TokenBalance(Address, TokenId, BigInt),
    Nonce(Address, u64),
    Code(Address, Vec<u8>, Hash),
    Storage(Address, StorageKey, StorageValue),
    Suicide(Address, bool),
    ContractInfo(String, Option<ContractInfo>),
    Log,
}

/// In-memory account store with snapshot/revert, matching §3's `StateDB`
/// invariant: `revert_to(id)` undoes exactly the changes appended after
/// `id`, inclusive of the one taken at `id + 1`.
#[derive(Default)]
pub struct InMemoryState {
    accounts: RwLock<HashMap<Address, Account>>,
    storage: RwLock<HashMap<(Address, StorageKey), StorageValue>>,
    logs: RwLock<Vec<Log>>,
    contract_info: RwLock<HashMap<String, ContractInfo>>,
    journal: RwLock<Vec<JournalEntry>>,
    next_snapshot: AtomicU64,
}

impl InMemoryState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seeding convenience: installs a full account record directly,
    /// bypassing the journal (not undoable).
    pub fn seed_account(&self, address: Address, account: Account) {
        self.accounts.write().unwrap().insert(address, account);
    }

    fn with_account_mut<R>(&self, address: Address, f: impl FnOnce(&mut Account) -> R) -> R {
        let mut accounts = self.accounts.write().unwrap();
        f(accounts.entry(address).or_default())
    }
}

#[async_trait]
impl StateAccess for InMemoryState {
    async fn get_account(&self, address: Address) -> Result<Option<Account>, StateError> {
        Ok(self.accounts.read().unwrap().get(&address).cloned())
    }

    async fn create_account(&self, address: Address) -> Result<(), StateError> {
        self.accounts.write().unwrap().entry(address).or_default();
        Ok(())
    }

    async fn set_balance(&self, address: Address, balance: BigInt) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| std::mem::replace(&mut a.balance, balance));
        self.journal.write().unwrap().push(JournalEntry::Balance(address, prev));
        Ok(())
    }

    async fn sub_balance(&self, address: Address, amount: BigInt) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| {
            let prev = a.balance.clone();
            a.balance -= amount;
            prev
        });
        self.journal.write().unwrap().push(JournalEntry::Balance(address, prev));
        Ok(())
    }

    async fn add_balance(&self, address: Address, amount: BigInt) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| {
            let prev = a.balance.clone();
            a.balance += amount;
            prev
        });
        self.journal.write().unwrap().push(JournalEntry::Balance(address, prev));
        Ok(())
    }

    async fn set_token_balance(&self, address: Address, token: TokenId, balance: BigInt) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| a.tokens.insert(token, balance).unwrap_or_else(|| BigInt::from(0)));
        self.journal
            .write()
            .unwrap()
            .push(JournalEntry::TokenBalance(address, token, prev));
        Ok(())
    }

    async fn sub_token_balance(&self, address: Address, token: TokenId, amount: BigInt) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| {
            let prev = a.token_balance(token);
            let next = prev.clone() - amount;
            a.tokens.insert(token, next);
            prev
        });
        self.journal
            .write()
            .unwrap()
            .push(JournalEntry::TokenBalance(address, token, prev));
        Ok(())
    }

    async fn add_token_balance(&self, address: Address, token: TokenId, amount: BigInt) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| {
            let prev = a.token_balance(token);
            let next = prev.clone() + amount;
            a.tokens.insert(token, next);
            prev
        });
        self.journal
            .write()
            .unwrap()
            .push(JournalEntry::TokenBalance(address, token, prev));
        Ok(())
    }

    async fn get_token_balances(&self, address: Address) -> Result<Vec<(TokenId, BigInt)>, StateError> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .get(&address)
            .map(|a| {
                a.tokens
                    .iter()
                    .filter(|(_, v)| **v != BigInt::from(0))
                    .map(|(k, v)| (*k, v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_nonce(&self, address: Address, nonce: u64) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| std::mem::replace(&mut a.nonce, nonce));
        self.journal.write().unwrap().push(JournalEntry::Nonce(address, prev));
        Ok(())
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, StateError> {
        Ok(Bytes::from(
            self.accounts.read().unwrap().get(&address).map(|a| a.code.clone()).unwrap_or_default(),
        ))
    }

    async fn set_code(&self, address: Address, code: Bytes) -> Result<(), StateError> {
        let code_hash = crate::domain::services::keccak256(code.as_slice());
        let (prev_code, prev_hash) = self.with_account_mut(address, |a| {
            let prev = (std::mem::replace(&mut a.code, code.clone().into_vec()), a.code_hash);
            a.code_hash = code_hash;
            prev
        });
        self.journal.write().unwrap().push(JournalEntry::Code(address, prev_code, prev_hash));
        Ok(())
    }

    async fn get_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue, StateError> {
        Ok(self.storage.read().unwrap().get(&(address, key)).copied().unwrap_or(StorageValue::ZERO))
    }

    async fn set_storage(&self, address: Address, key: StorageKey, value: StorageValue) -> Result<(), StateError> {
        let prev = self
            .storage
            .write()
            .unwrap()
            .insert((address, key), value)
            .unwrap_or(StorageValue::ZERO);
        self.journal.write().unwrap().push(JournalEntry::Storage(address, key, prev));
        Ok(())
    }

    async fn suicide(&self, address: Address) -> Result<(), StateError> {
        let prev = self.with_account_mut(address, |a| std::mem::replace(&mut a.suicided, true));
        self.journal.write().unwrap().push(JournalEntry::Suicide(address, prev));
        Ok(())
    }

    async fn has_suicided(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.accounts.read().unwrap().get(&address).map(|a| a.suicided).unwrap_or(false))
    }

    async fn snapshot(&self) -> Result<u64, StateError> {
        let id = self.next_snapshot.fetch_add(1, Ordering::AcqRel);
        self.journal.write().unwrap().push(JournalEntry::Snapshot(id));
        Ok(id)
    }

    async fn revert_to_snapshot(&self, id: u64) -> Result<(), StateError> {
        let mut journal = self.journal.write().unwrap();
        loop {
            let Some(entry) = journal.pop() else {
                return Err(StateError::UnknownSnapshot(id));
            };
            match entry {
                JournalEntry::Snapshot(marker) if marker == id => return Ok(()),
                JournalEntry::Snapshot(_) => {}
                JournalEntry::Balance(addr, prev) => {
                    self.accounts.write().unwrap().entry(addr).or_default().balance = prev;
                }
                JournalEntry::TokenBalance(addr, token, prev) => {
                    self.accounts.write().unwrap().entry(addr).or_default().tokens.insert(token, prev);
                }
                JournalEntry::Nonce(addr, prev) => {
                    self.accounts.write().unwrap().entry(addr).or_default().nonce = prev;
                }
                JournalEntry::Code(addr, prev_code, prev_hash) => {
                    let mut accounts = self.accounts.write().unwrap();
                    let a = accounts.entry(addr).or_default();
                    a.code = prev_code;
                    a.code_hash = prev_hash;
                }
                JournalEntry::Storage(addr, key, prev) => {
                    self.storage.write().unwrap().insert((addr, key), prev);
                }
                JournalEntry::Suicide(addr, prev) => {
                    self.accounts.write().unwrap().entry(addr).or_default().suicided = prev;
                }
                JournalEntry::ContractInfo(key, prev) => match prev {
                    Some(info) => {
                        self.contract_info.write().unwrap().insert(key, info);
                    }
                    None => {
                        self.contract_info.write().unwrap().remove(&key);
                    }
                },
                JournalEntry::Log => {
                    self.logs.write().unwrap().pop();
                }
            }
        }
    }

    async fn add_log(&self, log: Log) -> Result<(), StateError> {
        self.logs.write().unwrap().push(log);
        self.journal.write().unwrap().push(JournalEntry::Log);
        Ok(())
    }

    async fn logs(&self) -> Result<Vec<Log>, StateError> {
        Ok(self.logs.read().unwrap().clone())
    }

    async fn tx_hash(&self) -> Result<Hash, StateError> {
        Ok(Hash::ZERO)
    }

    async fn get_contract_info(&self, name: &str) -> Result<Option<ContractInfo>, StateError> {
        Ok(self.contract_info.read().unwrap().get(name).cloned())
    }

    async fn set_contract_info(&self, name: &str, info: ContractInfo) -> Result<(), StateError> {
        let prev = self.contract_info.write().unwrap().insert(name.to_string(), info);
        self.journal.write().unwrap().push(JournalEntry::ContractInfo(name.to_string(), prev));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[tokio::test]
    async fn balance_round_trips_through_add_and_sub() {
        let state = InMemoryState::new();
        state.add_balance(addr(1), BigInt::from(100)).await.unwrap();
        state.sub_balance(addr(1), BigInt::from(40)).await.unwrap();
        assert_eq!(state.get_balance(addr(1)).await.unwrap(), BigInt::from(60));
    }

    #[tokio::test]
    async fn revert_to_snapshot_undoes_everything_after_it() {
        let state = InMemoryState::new();
        state.add_balance(addr(1), BigInt::from(100)).await.unwrap();
        let snap = state.snapshot().await.unwrap();
        state.sub_balance(addr(1), BigInt::from(100)).await.unwrap();
        state.set_nonce(addr(1), 7).await.unwrap();
        assert_eq!(state.get_balance(addr(1)).await.unwrap(), BigInt::from(0));

        state.revert_to_snapshot(snap).await.unwrap();
        assert_eq!(state.get_balance(addr(1)).await.unwrap(), BigInt::from(100));
        assert_eq!(state.get_nonce(addr(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nested_snapshot_revert_also_unwinds_its_own_marker() {
        let state = InMemoryState::new();
        let outer = state.snapshot().await.unwrap();
        state.add_balance(addr(1), BigInt::from(10)).await.unwrap();
        let inner = state.snapshot().await.unwrap();
        state.add_balance(addr(1), BigInt::from(20)).await.unwrap();
        assert_eq!(state.get_balance(addr(1)).await.unwrap(), BigInt::from(30));

        state.revert_to_snapshot(inner).await.unwrap();
        assert_eq!(state.get_balance(addr(1)).await.unwrap(), BigInt::from(10));

        state.revert_to_snapshot(outer).await.unwrap();
        assert_eq!(state.get_balance(addr(1)).await.unwrap(), BigInt::from(0));
    }

    #[tokio::test]
    async fn set_code_updates_hash_and_is_revertible() {
        let state = InMemoryState::new();
        let snap = state.snapshot().await.unwrap();
        state.set_code(addr(1), Bytes::from(vec![1, 2, 3])).await.unwrap();
        assert!(state.is_contract(addr(1)).await.unwrap());
        state.revert_to_snapshot(snap).await.unwrap();
        assert!(!state.is_contract(addr(1)).await.unwrap());
    }

    #[tokio::test]
    async fn suicide_and_logs_round_trip_through_revert() {
        let state = InMemoryState::new();
        let snap = state.snapshot().await.unwrap();
        state
            .add_log(Log::new(addr(1), vec![Hash::ZERO], vec![], 1, 1))
            .await
            .unwrap();
        state.suicide(addr(1)).await.unwrap();
        assert!(state.has_suicided(addr(1)).await.unwrap());
        assert_eq!(state.logs().await.unwrap().len(), 1);

        state.revert_to_snapshot(snap).await.unwrap();
        assert!(!state.has_suicided(addr(1)).await.unwrap());
        assert!(state.logs().await.unwrap().is_empty());
    }
}
