//! Signing and address-recovery primitives for the account model.
//!
//! Every signed transaction carries `(r, s, v)` over the keccak-256 digest of
//! its canonical unsigned encoding; `from` is never serialized, it is
//! recovered from the signature. This mirrors the Ethereum convention named
//! in the glossary (`AccountID` — "20-byte Ethereum-style address").

use crate::address::Address;
use crate::error::BlockchainError;
use crate::hash::Hash256;
use crate::Result;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// A secp256k1 keypair. The private scalar is zeroized on drop.
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generates a new random keypair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Restores a keypair from a raw 32-byte private scalar.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not encode a valid scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let verifying_key = *signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Uncompressed public key bytes (65 bytes, `0x04` prefix included).
    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.verifying_key.to_encoded_point(false).as_bytes().to_vec()
    }

    /// The account address derived from this keypair's public key.
    #[must_use]
    pub fn address(&self) -> Address {
        // Drop the 0x04 prefix byte before hashing, matching the
        // Ethereum convention: keccak256(X || Y)[12..32].
        Address::from_public_key(&self.public_key_bytes()[1..])
    }

    /// Signs a 32-byte digest, returning a recoverable `(r, s, v)` signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying ECDSA signing operation fails.
    pub fn sign_prehash(&self, digest: &Hash256) -> Result<RecoverableSignature> {
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(RecoverableSignature::from_parts(signature, recovery_id))
    }
}

/// An ECDSA `(r, s, v)` signature over a 32-byte digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl RecoverableSignature {
    fn from_parts(signature: Signature, recovery_id: RecoveryId) -> Self {
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self {
            r,
            s,
            v: recovery_id.to_byte(),
        }
    }

    fn to_k256(self) -> Result<(Signature, RecoveryId)> {
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&self.r);
        raw[32..].copy_from_slice(&self.s);
        let signature = Signature::from_slice(&raw)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.v)
            .ok_or_else(|| BlockchainError::CryptographicError("bad recovery id".into()))?;
        Ok((signature, recovery_id))
    }

    /// Recovers the signer's account address from the digest that was
    /// signed. This both authenticates the transaction and derives `from`
    /// in one step — there is no separate "verify" call.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidSignature`] if recovery fails (bad
    /// curve point, malformed `v`, or the signature simply doesn't verify
    /// against any point).
    pub fn recover_address(&self, digest: &Hash256) -> Result<Address> {
        let (signature, recovery_id) = (*self).to_k256()?;
        let verifying_key =
            VerifyingKey::recover_from_prehash(digest.as_bytes(), &signature, recovery_id)
                .map_err(|_| BlockchainError::InvalidSignature)?;
        let encoded = verifying_key.to_encoded_point(false);
        Ok(Address::from_public_key(&encoded.as_bytes()[1..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_recover_yields_signer_address() {
        let keypair = KeyPair::generate();
        let digest = Hash256::keccak256(b"transfer 100 to bob, nonce 1");

        let signature = keypair.sign_prehash(&digest).unwrap();
        let recovered = signature.recover_address(&digest).unwrap();

        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn recovery_fails_against_a_different_digest() {
        let keypair = KeyPair::generate();
        let digest = Hash256::keccak256(b"original message");
        let other = Hash256::keccak256(b"tampered message");

        let signature = keypair.sign_prehash(&digest).unwrap();
        let recovered = signature.recover_address(&other).unwrap();

        // Recovery always succeeds (it just solves for a curve point), but
        // against a different digest it yields a different address.
        assert_ne!(recovered, keypair.address());
    }

    #[test]
    fn keypair_roundtrips_through_raw_bytes() {
        let keypair = KeyPair::generate();
        let bytes = keypair.signing_key.to_bytes();
        let restored = KeyPair::from_bytes(&bytes).unwrap();
        assert_eq!(restored.address(), keypair.address());
    }
}
