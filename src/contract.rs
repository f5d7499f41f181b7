//! # Contract record (C7)
//!
//! The engine-local record describing the code currently executing: who
//! called it, which address it runs as, the code and input it was handed,
//! its private gas allowance, and the delegate/create flags that change how
//! the host ABI interprets `self`/`caller`/`value`.

use crate::domain::value_objects::{Address, BigInt, Hash};

/// One frame's identity and resource allowance.
///
/// Invariant (§3): when `delegate` is set, `caller` and `value` are
/// inherited from the parent contract, `self_address` is the parent's self,
/// and `code_addr` is the delegate target whose code actually runs.
#[derive(Clone, Debug)]
pub struct Contract {
    /// Immediate caller, as seen by `TC_GetMsgSender`.
    pub caller: Address,
    /// The identity host functions mutate state under (`TC_GetSelfAddress`).
    pub self_address: Address,
    /// The address code was loaded from (differs from `self_address` only
    /// under delegate/call-code execution).
    pub code_addr: Address,
    /// Bytecode currently executing.
    pub code: Vec<u8>,
    /// `keccak256(code)`.
    pub code_hash: Hash,
    /// Raw on-chain input (`action ‖ '|' ‖ args`).
    pub input: Vec<u8>,
    /// Gas allotted to this frame, in host (unscaled) units.
    pub gas: u64,
    /// Value attached to the call, in the token named by the engine's
    /// execution context.
    pub value: BigInt,
    /// True for `DelegateCall`: code from `code_addr` runs as `self_address`,
    /// inheriting `caller`/`value` from the parent.
    pub delegate: bool,
    /// True when this frame is `Create`'s constructor invocation, the only
    /// context in which an `Init`/`init` action is accepted.
    pub create_call: bool,
}

impl Contract {
    /// Creates a plain (non-delegate, non-create) contract record.
    #[must_use]
    pub fn new_contract(caller: Address, self_address: Address, value: BigInt, gas: u64) -> Self {
        Self {
            caller,
            self_address,
            code_addr: self_address,
            code: Vec::new(),
            code_hash: Hash::ZERO,
            input: Vec::new(),
            gas,
            value,
            delegate: false,
            create_call: false,
        }
    }

    /// Turns this record into a delegate frame: `caller`/`value` are
    /// inherited from `parent`, `self_address` stays the parent's self, and
    /// `code_addr` names the delegate target whose code is actually run.
    #[must_use]
    pub fn as_delegate(mut self, parent: &Contract, delegate_target: Address) -> Self {
        self.caller = parent.caller;
        self.self_address = parent.self_address;
        self.value = parent.value.clone();
        self.code_addr = delegate_target;
        self.delegate = true;
        self
    }

    /// Charges `amount` against this frame's local gas allowance, returning
    /// `false` (and leaving `gas` untouched) when insufficient.
    #[must_use]
    pub fn use_gas(&mut self, amount: u64) -> bool {
        match self.gas.checked_sub(amount) {
            Some(remaining) => {
                self.gas = remaining;
                true
            }
            None => false,
        }
    }

    /// Refunds `amount` back onto this frame's gas allowance.
    pub fn refund_gas(&mut self, amount: u64) {
        self.gas = self.gas.saturating_add(amount);
    }

    /// Assigns the code this record will execute and its code-of-record
    /// address (the address `code_hash` and `code` were fetched from).
    pub fn set_call_code(&mut self, addr: Address, hash: Hash, code: Vec<u8>) {
        self.code_addr = addr;
        self.code_hash = hash;
        self.code = code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn delegate_inherits_caller_and_value_but_keeps_parent_self() {
        let parent = Contract::new_contract(addr(1), addr(2), BigInt::from(50), 1_000);
        let child = Contract::new_contract(addr(2), addr(3), BigInt::from(0), 1_000).as_delegate(&parent, addr(9));
        assert_eq!(child.caller, addr(1));
        assert_eq!(child.self_address, addr(2));
        assert_eq!(child.value, BigInt::from(50));
        assert_eq!(child.code_addr, addr(9));
        assert!(child.delegate);
    }

    #[test]
    fn use_gas_rejects_when_insufficient() {
        let mut c = Contract::new_contract(addr(1), addr(2), BigInt::from(0), 100);
        assert!(c.use_gas(60));
        assert_eq!(c.gas, 40);
        assert!(!c.use_gas(41));
        assert_eq!(c.gas, 40);
    }
}
