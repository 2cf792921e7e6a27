// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Wallet signature verification.
//!
//! Implements the legacy Ethereum signing scheme: keccak-256 digest of the
//! raw message bytes, ECDSA over secp256k1, with a recovery identifier byte
//! appended to the 64-byte signature. Both `{0,1}` and `{27,28}` recovery
//! bytes are accepted on the wire; signing emits the `{27,28}` form.
//!
//! All functions are pure and safe for concurrent use.

use alloy::primitives::{keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};

/// Length of a recoverable signature: 64 bytes (r || s) plus one recovery byte.
pub const SIGNATURE_LENGTH: usize = 65;

/// Errors for malformed signature input.
///
/// An address mismatch is not an error; `verify_signature` reports it as
/// `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signature length: expected {SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("invalid recovery id byte: {0} (expected 0, 1, 27, or 28)")]
    InvalidRecoveryId(u8),

    #[error("public key recovery failed: {0}")]
    RecoveryFailure(String),

    #[error("signing failed: {0}")]
    SigningFailure(String),
}

/// Sign a message with the given private key.
///
/// Returns a 65-byte recoverable signature with the recovery byte in the
/// `{27,28}` form expected by wallet clients.
pub fn sign_message(
    message: &[u8],
    signing_key: &SigningKey,
) -> Result<[u8; SIGNATURE_LENGTH], SignatureError> {
    let digest = keccak256(message);
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|e| SignatureError::SigningFailure(e.to_string()))?;

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte() + 27;
    Ok(out)
}

/// Recover the signer address from a message and a 65-byte signature.
pub fn recover_address(message: &[u8], signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(SignatureError::InvalidSignatureLength(signature.len()));
    }

    let v = signature[64];
    let recovery_byte = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or(SignatureError::InvalidRecoveryId(v))?;

    let ecdsa_signature = EcdsaSignature::from_slice(&signature[..64])
        .map_err(|e| SignatureError::RecoveryFailure(e.to_string()))?;

    let digest = keccak256(message);
    let verifying_key =
        VerifyingKey::recover_from_prehash(digest.as_slice(), &ecdsa_signature, recovery_id)
            .map_err(|e| SignatureError::RecoveryFailure(e.to_string()))?;

    Ok(address_from_verifying_key(&verifying_key))
}

/// Check whether `signature` over `message` was produced by `address`.
///
/// A signature that recovers to a different address, or that fails point
/// recovery, is `Ok(false)`. Errors are reserved for structurally malformed
/// input (wrong length, bad recovery byte).
pub fn verify_signature(
    address: Address,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, SignatureError> {
    match recover_address(message, signature) {
        Ok(recovered) => Ok(recovered == address),
        Err(SignatureError::RecoveryFailure(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Derive the Ethereum address for a secp256k1 public key.
///
/// The address is the last 20 bytes of keccak256 over the uncompressed
/// public key coordinates (without the 0x04 prefix).
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let public_key = key.to_encoded_point(false);
    let hash = keccak256(&public_key.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        // Fixed key so tests are deterministic.
        SigningKey::from_bytes(&[0x42u8; 32].into()).unwrap()
    }

    fn test_address(key: &SigningKey) -> Address {
        address_from_verifying_key(key.verifying_key())
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = test_key();
        let address = test_address(&key);
        let message = b"revibe-login:nonce123";

        let signature = sign_message(message, &key).unwrap();
        assert_eq!(signature.len(), SIGNATURE_LENGTH);
        assert!(matches!(signature[64], 27 | 28));

        assert!(verify_signature(address, message, &signature).unwrap());
    }

    #[test]
    fn recover_returns_signer_address() {
        let key = test_key();
        let message = b"hello revibe";
        let signature = sign_message(message, &key).unwrap();

        let recovered = recover_address(message, &signature).unwrap();
        assert_eq!(recovered, test_address(&key));
    }

    #[test]
    fn zero_form_recovery_byte_is_accepted() {
        let key = test_key();
        let message = b"normalize me";
        let mut signature = sign_message(message, &key).unwrap();
        signature[64] -= 27;

        let recovered = recover_address(message, &signature).unwrap();
        assert_eq!(recovered, test_address(&key));
    }

    #[test]
    fn wrong_length_fails_without_panic() {
        for len in [0, 1, 64, 66, 128] {
            let signature = vec![0u8; len];
            let err = recover_address(b"msg", &signature).unwrap_err();
            assert!(
                matches!(err, SignatureError::InvalidSignatureLength(l) if l == len),
                "length {len} should be rejected"
            );
        }
    }

    #[test]
    fn out_of_range_recovery_byte_is_rejected() {
        let key = test_key();
        let mut signature = sign_message(b"msg", &key).unwrap();
        signature[64] = 29;

        let err = recover_address(b"msg", &signature).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidRecoveryId(29)));
    }

    #[test]
    fn bit_flips_do_not_verify() {
        let key = test_key();
        let address = test_address(&key);
        let message = b"bit flip resistance";
        let signature = sign_message(message, &key).unwrap();

        // Flip one bit in each byte of r || s. Every mutation must either
        // verify false or (for structural damage) report malformed input;
        // none may verify true.
        for byte in 0..64 {
            let mut mutated = signature;
            mutated[byte] ^= 1;
            let verified = verify_signature(address, message, &mutated).unwrap_or(false);
            assert!(!verified, "mutated byte {byte} must not verify");
        }
    }

    #[test]
    fn different_message_does_not_verify() {
        let key = test_key();
        let address = test_address(&key);
        let signature = sign_message(b"message one", &key).unwrap();

        assert!(!verify_signature(address, b"message two", &signature).unwrap());
    }

    #[test]
    fn mismatched_address_is_false_not_error() {
        let key = test_key();
        let other = SigningKey::from_bytes(&[0x07u8; 32].into()).unwrap();
        let signature = sign_message(b"msg", &key).unwrap();

        let result = verify_signature(test_address(&other), b"msg", &signature);
        assert_eq!(result.unwrap(), false);
    }
}
