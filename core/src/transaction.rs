//! Signed value-transfer transactions.
//!
//! `from` is deliberately absent from [`Tx`]'s fields: it is recovered from
//! the signature against the unsigned-field digest, so a transaction can
//! never be replayed under a different claimed sender.

use serde::{Deserialize, Serialize};
use shared::{Address, BlockchainError, Hash256, KeyPair, RecoverableSignature, Result, Timestamp};

use crate::merkle::MerkleHashable;

/// A signed value-transfer transaction, as submitted by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub chain_id: u16,
    pub nonce: u64,
    pub to: Address,
    pub value: u64,
    pub tip: u64,
    #[serde(default)]
    pub data: Vec<u8>,
    pub signature: RecoverableSignature,
}

impl Tx {
    /// Signs a new transaction with `keypair`, producing the `(r, s, v)`
    /// over the canonical encoding of its unsigned fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying signing operation fails, or if
    /// `from == to` (self-transfers are rejected at construction, not left
    /// to validation to catch later).
    pub fn sign(
        keypair: &KeyPair,
        chain_id: u16,
        nonce: u64,
        to: Address,
        value: u64,
        tip: u64,
        data: Vec<u8>,
    ) -> Result<Self> {
        if keypair.address() == to {
            return Err(BlockchainError::SelfTransfer);
        }
        let digest = Self::unsigned_digest(chain_id, nonce, to, value, tip, &data);
        let signature = keypair.sign_prehash(&digest)?;
        Ok(Self {
            chain_id,
            nonce,
            to,
            value,
            tip,
            data,
            signature,
        })
    }

    /// Canonical encoding of the fields covered by the signature: a fixed
    /// field order, big-endian integers, raw address and data bytes. Keccak
    /// hashed to produce the digest that gets signed.
    fn unsigned_digest(chain_id: u16, nonce: u64, to: Address, value: u64, tip: u64, data: &[u8]) -> Hash256 {
        let mut bytes = Vec::with_capacity(2 + 8 + 20 + 8 + 8 + data.len());
        bytes.extend_from_slice(&chain_id.to_be_bytes());
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.extend_from_slice(to.as_bytes());
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes.extend_from_slice(&tip.to_be_bytes());
        bytes.extend_from_slice(data);
        Hash256::keccak256(&bytes)
    }

    fn digest(&self) -> Hash256 {
        Self::unsigned_digest(self.chain_id, self.nonce, self.to, self.value, self.tip, &self.data)
    }

    /// Recovers the sender's address from the signature over this
    /// transaction's unsigned-field digest. This is both the source of
    /// truth for `from` and the authentication check — there is no
    /// separate signature-verification step.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidSignature`] if recovery fails, or
    /// [`BlockchainError::SelfTransfer`] if the recovered sender equals
    /// `to`.
    pub fn recover_from(&self) -> Result<Address> {
        let from = self.signature.recover_address(&self.digest())?;
        if from == self.to {
            return Err(BlockchainError::SelfTransfer);
        }
        Ok(from)
    }

    /// Checks `self.chain_id` against the chain's genesis id.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::ChainIdMismatch`] on mismatch.
    pub fn check_chain_id(&self, expected: u16) -> Result<()> {
        if self.chain_id != expected {
            return Err(BlockchainError::ChainIdMismatch {
                expected,
                found: self.chain_id,
            });
        }
        Ok(())
    }
}

/// A [`Tx`] as it travels through the mempool and into a block: carries the
/// submission timestamp and the gas terms the sender agreed to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTx {
    pub tx: Tx,
    pub timestamp: Timestamp,
    pub gas_price: u64,
    pub gas_units: u64,
}

impl BlockTx {
    #[must_use]
    pub const fn new(tx: Tx, timestamp: Timestamp, gas_price: u64, gas_units: u64) -> Self {
        Self {
            tx,
            timestamp,
            gas_price,
            gas_units,
        }
    }

    /// The gas portion of the total cost: `gas_price * gas_units`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InsufficientFunds`] on overflow — an
    /// overflowing gas cost can never legitimately be paid.
    pub fn gas_cost(&self) -> Result<u64> {
        self.gas_price
            .checked_mul(self.gas_units)
            .ok_or(BlockchainError::InsufficientFunds)
    }

    /// Total amount deducted from the sender: `value + tip + gas_price *
    /// gas_units`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InsufficientFunds`] on overflow.
    pub fn total_cost(&self) -> Result<u64> {
        let gas = self.gas_cost()?;
        self.tx
            .value
            .checked_add(self.tx.tip)
            .and_then(|v| v.checked_add(gas))
            .ok_or(BlockchainError::InsufficientFunds)
    }

    /// The fee paid to whoever mines the block this transaction lands in:
    /// `tip + gas_price * gas_units`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InsufficientFunds`] on overflow.
    pub fn miner_fee(&self) -> Result<u64> {
        let gas = self.gas_cost()?;
        self.tx
            .tip
            .checked_add(gas)
            .ok_or(BlockchainError::InsufficientFunds)
    }

    /// Content hash used as the mempool key and as the merkle leaf hash:
    /// `keccak256(canonical(BlockTx))`, over the fully signed payload.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::SerializationError`] if encoding fails.
    pub fn hash(&self) -> Result<Hash256> {
        let encoded = serde_json::to_vec(self)
            .map_err(|e| BlockchainError::SerializationError(e.to_string()))?;
        Ok(Hash256::keccak256(&encoded))
    }
}

impl MerkleHashable for BlockTx {
    fn merkle_hash(&self) -> Hash256 {
        self.hash().unwrap_or_else(|_| Hash256::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob() -> Address {
        Address::from_bytes([2u8; 20])
    }

    #[test]
    fn sign_then_recover_yields_signer() {
        let alice = KeyPair::generate();
        let tx = Tx::sign(&alice, 1, 1, bob(), 100, 5, vec![]).unwrap();
        assert_eq!(tx.recover_from().unwrap(), alice.address());
    }

    #[test]
    fn rejects_self_transfer_at_signing() {
        let alice = KeyPair::generate();
        let result = Tx::sign(&alice, 1, 1, alice.address(), 100, 5, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn chain_id_mismatch_is_detected() {
        let alice = KeyPair::generate();
        let tx = Tx::sign(&alice, 7, 1, bob(), 100, 5, vec![]).unwrap();
        assert!(tx.check_chain_id(7).is_ok());
        assert!(tx.check_chain_id(8).is_err());
    }

    #[test]
    fn total_cost_includes_value_tip_and_gas() {
        let alice = KeyPair::generate();
        let tx = Tx::sign(&alice, 1, 1, bob(), 100, 5, vec![]).unwrap();
        let block_tx = BlockTx::new(tx, 1_700_000_000, 2, 10);
        assert_eq!(block_tx.gas_cost().unwrap(), 20);
        assert_eq!(block_tx.total_cost().unwrap(), 125);
        assert_eq!(block_tx.miner_fee().unwrap(), 25);
    }

    #[test]
    fn hash_is_deterministic() {
        let alice = KeyPair::generate();
        let tx = Tx::sign(&alice, 1, 1, bob(), 100, 5, vec![]).unwrap();
        let block_tx = BlockTx::new(tx, 1_700_000_000, 2, 10);
        assert_eq!(block_tx.hash().unwrap(), block_tx.hash().unwrap());
    }

    #[test]
    fn tampering_with_signed_fields_changes_recovered_sender() {
        let alice = KeyPair::generate();
        let mut tx = Tx::sign(&alice, 1, 1, bob(), 100, 5, vec![]).unwrap();
        tx.value = 999;
        assert_ne!(tx.recover_from().unwrap(), alice.address());
    }
}
