//! Blocks: a header plus the ordered list of transactions it commits.

use serde::{Deserialize, Serialize};
use shared::{Address, BlockHeight, BlockchainError, Hash256, Result, Timestamp};

use crate::merkle::MerkleTree;
use crate::transaction::BlockTx;

/// Everything about a block except its transaction bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: BlockHeight,
    pub prev_block_hash: Hash256,
    pub timestamp: Timestamp,
    pub difficulty: u16,
    pub miner: Address,
    /// keccak256 over the sorted-by-address account db snapshot taken
    /// after applying this block's transactions and mining reward.
    pub state_root: Hash256,
    /// Merkle root over this block's ordered [`BlockTx`] list.
    pub tx_root: Hash256,
    /// PoW solution. Zero and meaningless under PoA.
    pub nonce: u64,
}

impl BlockHeader {
    /// keccak256 over the canonical field encoding. This is the block hash
    /// and the quantity the PoW loop hunts for leading zero bits in.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        let mut bytes = Vec::with_capacity(8 + 32 + 8 + 2 + 20 + 32 + 32 + 8);
        bytes.extend_from_slice(&self.number.to_be_bytes());
        bytes.extend_from_slice(self.prev_block_hash.as_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.difficulty.to_be_bytes());
        bytes.extend_from_slice(self.miner.as_bytes());
        bytes.extend_from_slice(self.state_root.as_bytes());
        bytes.extend_from_slice(self.tx_root.as_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        Hash256::keccak256(&bytes)
    }

    #[must_use]
    pub fn meets_own_difficulty(&self) -> bool {
        self.hash().meets_difficulty(self.difficulty)
    }
}

/// A complete block: header plus the ordered transactions it commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<BlockTx>,
}

impl Block {
    #[must_use]
    pub const fn new(header: BlockHeader, transactions: Vec<BlockTx>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    #[must_use]
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Recomputes the merkle root over this block's transactions and
    /// compares it against the header's `tx_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the block has no transactions — a block must
    /// carry at least one, since an empty merkle tree is disallowed.
    pub fn verify_tx_root(&self) -> Result<bool> {
        let tree = MerkleTree::build(&self.transactions)?;
        Ok(tree.root() == self.header.tx_root)
    }

    /// Validates linkage and proof-of-work against the previous block's
    /// hash, without touching account state. Callers still need to replay
    /// the transactions against a snapshot to check `state_root`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidBlock`] on a non-contiguous
    /// block number or broken `prev_block_hash` linkage, or
    /// [`BlockchainError::InsufficientDifficulty`] if the header's hash
    /// doesn't meet its own claimed difficulty.
    pub fn validate_linkage(&self, prev_number: BlockHeight, prev_hash: Hash256) -> Result<()> {
        if self.header.number != prev_number + 1 {
            return Err(BlockchainError::InvalidBlock(format!(
                "expected block number {}, found {}",
                prev_number + 1,
                self.header.number
            )));
        }
        if self.header.prev_block_hash != prev_hash {
            return Err(BlockchainError::InvalidBlock(
                "prev_block_hash does not match the current chain tip".to_string(),
            ));
        }
        if !self.header.meets_own_difficulty() {
            return Err(BlockchainError::InsufficientDifficulty);
        }
        Ok(())
    }
}

/// Computes the merkle root over an ordered transaction list. A thin
/// wrapper kept at module scope so callers building a candidate block
/// don't need to reach into `merkle` directly.
///
/// # Errors
///
/// Returns an error if `transactions` is empty.
pub fn compute_tx_root(transactions: &[BlockTx]) -> Result<Hash256> {
    Ok(MerkleTree::build(transactions)?.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Tx;
    use shared::KeyPair;

    fn sample_block_tx(nonce: u64) -> BlockTx {
        let alice = KeyPair::generate();
        let bob = Address::from_bytes([2u8; 20]);
        let tx = Tx::sign(&alice, 1, nonce, bob, 100, 5, vec![]).unwrap();
        BlockTx::new(tx, 1_700_000_000, 1, 10)
    }

    fn sample_header(tx_root: Hash256) -> BlockHeader {
        BlockHeader {
            number: 1,
            prev_block_hash: Hash256::zero(),
            timestamp: 1_700_000_000,
            difficulty: 0,
            miner: Address::from_bytes([9u8; 20]),
            state_root: Hash256::zero(),
            tx_root,
            nonce: 0,
        }
    }

    #[test]
    fn header_hash_is_deterministic() {
        let header = sample_header(Hash256::zero());
        assert_eq!(header.hash(), header.hash());
    }

    #[test]
    fn zero_difficulty_is_always_met() {
        let header = sample_header(Hash256::zero());
        assert!(header.meets_own_difficulty());
    }

    #[test]
    fn verify_tx_root_detects_tampering() {
        let transactions = vec![sample_block_tx(1)];
        let tx_root = compute_tx_root(&transactions).unwrap();
        let block = Block::new(sample_header(tx_root), transactions);
        assert!(block.verify_tx_root().unwrap());

        let mut tampered = block;
        tampered.header.tx_root = Hash256::zero();
        assert!(!tampered.verify_tx_root().unwrap());
    }

    #[test]
    fn validate_linkage_rejects_wrong_block_number() {
        let transactions = vec![sample_block_tx(1)];
        let tx_root = compute_tx_root(&transactions).unwrap();
        let block = Block::new(sample_header(tx_root), transactions);
        assert!(block.validate_linkage(5, Hash256::zero()).is_err());
    }

    #[test]
    fn validate_linkage_rejects_wrong_prev_hash() {
        let transactions = vec![sample_block_tx(1)];
        let tx_root = compute_tx_root(&transactions).unwrap();
        let block = Block::new(sample_header(tx_root), transactions);
        assert!(block
            .validate_linkage(0, Hash256::keccak256(b"not the real prev hash"))
            .is_err());
    }

    #[test]
    fn validate_linkage_accepts_correct_chain() {
        let transactions = vec![sample_block_tx(1)];
        let tx_root = compute_tx_root(&transactions).unwrap();
        let block = Block::new(sample_header(tx_root), transactions);
        assert!(block.validate_linkage(0, Hash256::zero()).is_ok());
    }
}
