//! # Gas schedule (C1)
//!
//! Named cost constants and the closed-form cost functions host functions
//! charge before they take effect. Every accumulation goes through
//! `checked_add`/`checked_mul`; any overflow surfaces as `GasOverflow`,
//! never wraps or saturates silently.

use crate::errors::EngineError;

/// Flat, named gas costs. Grouped the way the upstream cost table groups
/// them: step costs, per-word multipliers, and fixed per-operation costs.
pub mod costs {
    /// Cheapest host call: pure getters with no memory traffic.
    pub const QUICK_STEP: u64 = 2;
    /// Getters that touch a small, fixed amount of memory.
    pub const FAST_STEP: u64 = 5;
    /// Calls that read or write a variable-length guest buffer.
    pub const EXT_STEP: u64 = 20;

    /// Per-32-byte-word cost of hashing input with keccak256.
    pub const SHA3_WORD_GAS: u64 = 6;
    /// Per-word cost of sha256.
    pub const SHA256_WORD_GAS: u64 = 12;
    /// Per-word cost of ripemd160.
    pub const RIPEMD160_WORD_GAS: u64 = 120;
    /// Per-word cost of a raw memory copy (memcpy/strcpy/set_bytes/…).
    pub const COPY_GAS: u64 = 3;

    /// Fixed component added to every hash-returning call alongside its
    /// per-word cost (mirrors `GasExtStep + HashSetGas`).
    pub const HASH_SET_GAS: u64 = 30;
    /// Fixed component added to every address-returning call.
    pub const ADDR_SET_GAS: u64 = 20;

    /// Fixed cost of `ecrecover`/`check_sign`.
    pub const ECRECOVER_GAS: u64 = 3000;
    /// Fixed cost of a base-token or token value transfer.
    pub const CALL_VALUE_TRANSFER_GAS: u64 = 9000;
    /// Fixed cost of `issue`.
    pub const ISSUE_GAS: u64 = 25000;
    /// Fixed cost of `get_balance`/`token_balance`.
    pub const BALANCE_GAS: u64 = 400;

    /// Base cost of a log call before topics/data.
    pub const LOG_GAS: u64 = 375;
    /// Per-topic cost of `log0..log4`/`notify`.
    pub const LOG_TOPIC_GAS: u64 = 375;
    /// Per-byte cost of log payload data.
    pub const LOG_DATA_GAS: u64 = 8;

    /// Per-word cost of writing a storage slot.
    pub const SSTORE_SET_GAS: u64 = 20000;
    /// Per-word cost of reading a storage slot.
    pub const SSTORE_LOAD_GAS: u64 = 200;

    /// Per-byte cost of code persisted by `Create`, charged against the
    /// *guest*-scaled budget (see the wrapper's code-size-limit step).
    pub const CREATE_DATA_GAS: u64 = 200;

    /// Base cost of any JSON host call before per-byte content costs.
    pub const JSON_BASE_GAS: u64 = 20;
}

/// Ceiling-divides `size` by 32, saturating at `u64::MAX / 32 + 1` instead
/// of overflowing on pathological input sizes.
#[must_use]
pub fn to_word_size(size: u64) -> u64 {
    if size > u64::MAX - 31 {
        u64::MAX / 32 + 1
    } else {
        (size + 31) / 32
    }
}

/// Adds two gas amounts, failing with `GasOverflow` on overflow.
pub fn safe_add(x: u64, y: u64) -> Result<u64, EngineError> {
    x.checked_add(y).ok_or(EngineError::GasOverflow)
}

/// Multiplies two gas amounts, failing with `GasOverflow` on overflow.
pub fn safe_mul(x: u64, y: u64) -> Result<u64, EngineError> {
    x.checked_mul(y).ok_or(EngineError::GasOverflow)
}

/// `base + ceil(len / 32) * per_word`, the recurring shape used by most
/// host-function cost functions.
pub fn word_cost(base: u64, len: u64, per_word: u64) -> Result<u64, EngineError> {
    let words = to_word_size(len);
    let word_gas = safe_mul(words, per_word)?;
    safe_add(base, word_gas)
}

/// Cost of `keccak256(data)`.
pub fn keccak256_cost(len: u64) -> Result<u64, EngineError> {
    word_cost(costs::EXT_STEP + costs::HASH_SET_GAS, len, costs::SHA3_WORD_GAS)
}

/// Cost of `sha256(data)`.
pub fn sha256_cost(len: u64) -> Result<u64, EngineError> {
    word_cost(costs::EXT_STEP + costs::HASH_SET_GAS, len, costs::SHA256_WORD_GAS)
}

/// Cost of `ripemd160(data)`.
pub fn ripemd160_cost(len: u64) -> Result<u64, EngineError> {
    word_cost(costs::EXT_STEP + costs::ADDR_SET_GAS, len, costs::RIPEMD160_WORD_GAS)
}

/// Cost of a raw-buffer host call (memcpy/memmove/strcpy/set_bytes/…).
pub fn copy_cost(base: u64, len: u64) -> Result<u64, EngineError> {
    word_cost(base, len, costs::COPY_GAS)
}

/// Cost of `log0..log4`/`notify`: a fixed base, `topics * LOG_TOPIC_GAS`,
/// and `data.len() * LOG_DATA_GAS`.
pub fn log_cost(topics: u64, data_len: u64) -> Result<u64, EngineError> {
    let topic_gas = safe_mul(topics, costs::LOG_TOPIC_GAS)?;
    let with_topics = safe_add(costs::LOG_GAS, topic_gas)?;
    let data_gas = safe_mul(data_len, costs::LOG_DATA_GAS)?;
    safe_add(with_topics, data_gas)
}

/// Cost of a `storage_set*` call: a quick step plus a per-word charge over
/// the combined key and value length.
pub fn storage_set_cost(key_len: u64, value_len: u64) -> Result<u64, EngineError> {
    let combined = safe_add(key_len, value_len)?;
    word_cost(costs::QUICK_STEP, combined, costs::SSTORE_SET_GAS)
}

/// Cost of a `storage_get*`/`storage_del` call.
pub fn storage_load_cost(key_len: u64) -> Result<u64, EngineError> {
    word_cost(costs::QUICK_STEP, key_len, costs::SSTORE_LOAD_GAS)
}

/// Cost of persisting `Create`'s runtime code, evaluated against the
/// *guest*-scaled gas budget per the wrapper's code-size-limit step.
pub fn create_data_cost(code_len: u64) -> Result<u64, EngineError> {
    safe_mul(code_len, costs::CREATE_DATA_GAS)
}

/// Cost of a JSON host call (`parse`, `put_*`, `to_string`, …): a fixed
/// base plus a per-word content charge.
pub fn json_cost(data_len: u64) -> Result<u64, EngineError> {
    word_cost(costs::JSON_BASE_GAS, data_len, costs::COPY_GAS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_size_rounds_up() {
        assert_eq!(to_word_size(0), 0);
        assert_eq!(to_word_size(1), 1);
        assert_eq!(to_word_size(32), 1);
        assert_eq!(to_word_size(33), 2);
    }

    #[test]
    fn safe_mul_overflows_to_gas_overflow() {
        assert!(matches!(safe_mul(u64::MAX, 2), Err(EngineError::GasOverflow)));
    }

    #[test]
    fn keccak256_cost_scales_with_words() {
        let short = keccak256_cost(3).unwrap();
        let long = keccak256_cost(65).unwrap();
        assert!(long > short);
    }

    #[test]
    fn log_cost_scales_with_topics_and_data() {
        let base = log_cost(0, 0).unwrap();
        let with_topics = log_cost(2, 0).unwrap();
        let with_data = log_cost(0, 100).unwrap();
        assert!(with_topics > base);
        assert!(with_data > base);
    }
}
