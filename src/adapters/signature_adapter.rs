//! # secp256k1 signature adapter
//!
//! A real [`SignatureVerifier`] backed by `k256`, so `TC_Ecrecover`/
//! `TC_CheckSign` have a working implementation rather than only the
//! test-only null signer every host-function unit test constructs for
//! itself. Recovers the public key from `(hash, r, s, recovery_id)` and
//! derives the address the same way an externally-owned account's address
//! is always derived: `keccak256(uncompressed_pubkey[1..])[12:]`.

use crate::domain::value_objects::{Address, EcdsaSignature, Hash};
use crate::ports::outbound::SignatureVerifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

/// `SignatureVerifier` backed by `k256`'s ECDSA recovery over secp256k1.
#[derive(Clone, Copy, Debug, Default)]
pub struct Secp256k1Signer;

impl SignatureVerifier for Secp256k1Signer {
    fn ecrecover(&self, hash: &Hash, signature: &EcdsaSignature, chain_id: u64) -> Option<Address> {
        let recovery_id = signature.recovery_id(chain_id)?;
        let recovery_id = RecoveryId::from_byte(recovery_id)?;

        let mut sig_bytes = [0u8; 64];
        sig_bytes[..32].copy_from_slice(&signature.r);
        sig_bytes[32..].copy_from_slice(&signature.s);
        let sig = Signature::from_slice(&sig_bytes).ok()?;

        let verifying_key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recovery_id).ok()?;
        let encoded = verifying_key.to_encoded_point(false);
        // Uncompressed SEC1 point: 0x04 ‖ X(32) ‖ Y(32); the address derives
        // from keccak256 of X‖Y, dropping the leading tag byte.
        let pubkey_bytes = &encoded.as_bytes()[1..];
        let digest = Keccak256::digest(pubkey_bytes);
        Address::from_slice(&digest[12..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{signature::hazmat::PrehashSigner, SigningKey};

    fn address_of(verifying_key: &VerifyingKey) -> Address {
        let encoded = verifying_key.to_encoded_point(false);
        let digest = Keccak256::digest(&encoded.as_bytes()[1..]);
        Address::from_slice(&digest[12..]).unwrap()
    }

    /// Signs `hash` directly (no re-hashing) and packs the result into the
    /// `(r, s, v)` shape `TC_Ecrecover` expects, with `v` EIP-155-encoded
    /// under `chain_id`.
    fn sign_prehash(signing_key: &SigningKey, hash: &Hash, chain_id: u64) -> EcdsaSignature {
        let (sig, recovery_id): (Signature, RecoveryId) = signing_key.sign_prehash_recoverable(hash.as_bytes()).unwrap();
        let v = chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
        EcdsaSignature::new(sig.r().to_bytes().into(), sig.s().to_bytes().into(), v as u8)
    }

    #[test]
    fn recovers_the_signer_that_produced_the_signature() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let expected_address = address_of(&verifying_key);

        let hash = Hash::new(Keccak256::digest(b"thunderchain").into());
        let chain_id = 1u64;
        let signature = sign_prehash(&signing_key, &hash, chain_id);

        let recovered = Secp256k1Signer.ecrecover(&hash, &signature, chain_id);
        assert_eq!(recovered, Some(expected_address));
    }

    #[test]
    fn rejects_a_signature_over_a_different_hash() {
        let signing_key = SigningKey::from_bytes(&[9u8; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let expected_address = address_of(&verifying_key);

        let hash = Hash::new(Keccak256::digest(b"thunderchain").into());
        let other_hash = Hash::new(Keccak256::digest(b"not-the-message").into());
        let chain_id = 1u64;
        let signature = sign_prehash(&signing_key, &hash, chain_id);

        let recovered = Secp256k1Signer.ecrecover(&other_hash, &signature, chain_id);
        assert_ne!(recovered, Some(expected_address));
    }
}
