//! # Domain Services
//!
//! Pure, deterministic functions with no I/O: contract address derivation
//! and the `keccak256` primitive the rest of the crate is built on.

use crate::domain::value_objects::{Address, Hash};
use sha3::{Digest, Keccak256};

// =============================================================================
// KECCAK256
// =============================================================================

/// Computes the keccak256 hash of data.
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    let hash = Keccak256::digest(data);
    Hash::new(hash.into())
}

/// keccak256 of the empty byte string — the `code_hash` of an externally
/// owned account.
#[must_use]
pub fn empty_code_hash() -> Hash {
    keccak256(&[])
}

// =============================================================================
// CONTRACT ADDRESS COMPUTATION
// =============================================================================

/// Legacy RLP-based address derivation: `keccak256(rlp([sender, nonce]))[12:]`.
#[must_use]
pub fn compute_contract_address(sender: Address, nonce: u64) -> Address {
    let mut content = Vec::with_capacity(32);

    // RLP encode address (20 bytes: 0x80 + 20 = 0x94).
    content.push(0x94);
    content.extend_from_slice(sender.as_bytes());

    // RLP encode nonce.
    if nonce == 0 {
        content.push(0x80);
    } else if nonce < 128 {
        content.push(nonce as u8);
    } else {
        let nonce_bytes = encode_be_trimmed(nonce);
        content.push(0x80 + nonce_bytes.len() as u8);
        content.extend_from_slice(&nonce_bytes);
    }

    let mut rlp_data = Vec::with_capacity(content.len() + 9);
    if content.len() < 56 {
        rlp_data.push(0xc0 + content.len() as u8);
    } else {
        let len_bytes = encode_be_trimmed(content.len() as u64);
        rlp_data.push(0xf7 + len_bytes.len() as u8);
        rlp_data.extend_from_slice(&len_bytes);
    }
    rlp_data.extend_from_slice(&content);

    let hash = Keccak256::digest(&rlp_data);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    Address::new(addr)
}

/// Derives the address `Create` assigns to a new contract.
///
/// In v1 mode (`is_version2 == false`) this is the legacy RLP scheme applied
/// to the caller's current on-chain nonce. In v2 mode it is the *same*
/// scheme applied to `ctx_nonce` (the transaction-level nonce carried on
/// `ExecutionContext`) instead. The init code is never mixed into the
/// digest in either mode; existing on-chain addresses derived under v1 stay
/// valid once v2 is introduced because the two modes key off disjoint nonce
/// sources in practice.
#[must_use]
pub fn create_address(caller: Address, account_nonce: u64, ctx_nonce: u64, is_version2: bool) -> Address {
    if is_version2 {
        compute_contract_address(caller, ctx_nonce)
    } else {
        compute_contract_address(caller, account_nonce)
    }
}

/// Big-endian encoding of `n` with leading zero bytes stripped (RLP integer
/// encoding), with 0 encoding to an empty slice.
fn encode_be_trimmed(n: u64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(8);
    bytes[start..].to_vec()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address() -> Address {
        Address::from_hex("970e8128ab834e8eac17ab8e3812f010678cf791").unwrap()
    }

    #[test]
    fn test_keccak256_abc() {
        let hash = keccak256(b"abc");
        assert_eq!(
            format!("{hash:?}"),
            "0x4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn test_create_address_vectors() {
        let addr = test_address();
        assert_eq!(
            compute_contract_address(addr, 0),
            Address::from_hex("c3422dbc55e9a331c6114858ee53ef6e7964ef18").unwrap()
        );
        assert_eq!(
            compute_contract_address(addr, 1),
            Address::from_hex("91d3aba19c8225cda8e1a2b0cebbb109dd8f12e1").unwrap()
        );
        assert_eq!(
            compute_contract_address(addr, 2),
            Address::from_hex("a847bed53d0c23ddf8c81db663b35362f6a3bfee").unwrap()
        );
    }

    #[test]
    fn test_empty_code_hash() {
        let hash = empty_code_hash();
        assert_eq!(hash.as_bytes()[0], 0xc5);
        assert_eq!(hash.as_bytes()[1], 0xd2);
    }

    #[test]
    fn test_compute_contract_address_deterministic() {
        let sender = Address::new([42u8; 20]);
        assert_eq!(
            compute_contract_address(sender, 100),
            compute_contract_address(sender, 100)
        );
    }

    #[test]
    fn test_create_address_v1_vs_v2_diverge_when_nonces_differ() {
        let caller = test_address();
        let v1 = create_address(caller, 5, 9, false);
        let v2 = create_address(caller, 5, 9, true);
        assert_ne!(v1, v2);
        assert_eq!(v1, compute_contract_address(caller, 5));
        assert_eq!(v2, compute_contract_address(caller, 9));
    }
}
