//! Append-only block persistence: one JSON file per block, numbered from 1.

use std::path::{Path, PathBuf};

use shared::{BlockHeight, BlockchainError, Result};

use crate::block::Block;

/// Storage contract the state engine depends on. The state engine only
/// ever needs write-one, read-one-by-number, and forward iteration; it
/// never needs random deletion or rewriting of a committed block.
pub trait Storage: Send + Sync {
    /// Appends or overwrites the block stored at `block.header.number`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::IoError`] or
    /// [`BlockchainError::SerializationError`] on failure. Both are fatal
    /// to the caller — a storage write failure halts mining.
    fn write(&self, block: &Block) -> Result<()>;

    /// Reads the block at `number`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidInput`] if no block exists at
    /// `number` (end-of-chain, not a fatal error), or
    /// [`BlockchainError::IoError`]/[`BlockchainError::SerializationError`]
    /// for any other failure.
    fn get(&self, number: BlockHeight) -> Result<Block>;

    /// Wipes all persisted blocks.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::IoError`] on failure.
    fn reset(&self) -> Result<()>;

    /// Releases any held resources. A no-op for implementations with
    /// nothing to flush or close.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::IoError`] on failure.
    fn close(&self) -> Result<()>;

    /// Forward iteration over every stored block starting at number 1,
    /// stopping cleanly at the first missing number. The default
    /// implementation scans via repeated [`Storage::get`] calls; concrete
    /// stores with a cheaper native iteration order may override it.
    fn iter_blocks(&self) -> Result<Box<dyn Iterator<Item = Result<Block>> + '_>> {
        Ok(Box::new(LinearScanIter {
            storage: self,
            next_number: 1,
            done: false,
        }))
    }
}

struct LinearScanIter<'a> {
    storage: &'a (dyn Storage + 'a),
    next_number: BlockHeight,
    done: bool,
}

impl Iterator for LinearScanIter<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.storage.get(self.next_number) {
            Ok(block) => {
                self.next_number += 1;
                Some(Ok(block))
            }
            Err(BlockchainError::InvalidInput(_)) => {
                self.done = true;
                None
            }
            Err(other) => {
                self.done = true;
                Some(Err(other))
            }
        }
    }
}

/// One-file-per-block storage under a base directory, named `<number>.json`.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    base_dir: PathBuf,
}

impl DiskStorage {
    /// Opens (creating if necessary) a disk-backed store rooted at
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::IoError`] if the directory can't be
    /// created.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|e| BlockchainError::IoError(e.to_string()))?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, number: BlockHeight) -> PathBuf {
        self.base_dir.join(format!("{number}.json"))
    }

    /// A forward iterator over every stored block, starting at number 1.
    /// Stops the first time a numbered file is missing — an implementation
    /// of the "missing file = end of chain" rule from the storage design
    /// note, distinguished from other I/O errors which the iterator
    /// surfaces as `Some(Err(..))` rather than silently stopping.
    #[must_use]
    pub fn iter(&self) -> DiskStorageIter<'_> {
        DiskStorageIter {
            storage: self,
            next_number: 1,
            done: false,
        }
    }
}

impl Storage for DiskStorage {
    fn write(&self, block: &Block) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(block)
            .map_err(|e| BlockchainError::SerializationError(e.to_string()))?;
        std::fs::write(self.path_for(block.header.number), encoded)
            .map_err(|e| BlockchainError::IoError(e.to_string()))
    }

    fn get(&self, number: BlockHeight) -> Result<Block> {
        let path = self.path_for(number);
        let data = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlockchainError::InvalidInput(format!("no block stored at number {number}"))
            } else {
                BlockchainError::IoError(e.to_string())
            }
        })?;
        serde_json::from_slice(&data).map_err(|e| BlockchainError::SerializationError(e.to_string()))
    }

    fn reset(&self) -> Result<()> {
        std::fs::remove_dir_all(&self.base_dir).map_err(|e| BlockchainError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.base_dir).map_err(|e| BlockchainError::IoError(e.to_string()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Iterator returned by [`DiskStorage::iter`]. A missing file ends
/// iteration cleanly (returns `None`); any other I/O or decode error is
/// surfaced once as `Some(Err(..))` and then iteration also ends, since a
/// corrupt chain can't be meaningfully continued past.
pub struct DiskStorageIter<'a> {
    storage: &'a DiskStorage,
    next_number: BlockHeight,
    done: bool,
}

impl Iterator for DiskStorageIter<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.storage.get(self.next_number) {
            Ok(block) => {
                self.next_number += 1;
                Some(Ok(block))
            }
            Err(BlockchainError::InvalidInput(_)) => {
                self.done = true;
                None
            }
            Err(other) => {
                self.done = true;
                Some(Err(other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use crate::transaction::{BlockTx, Tx};
    use shared::{Address, Hash256, KeyPair};

    fn sample_block(number: u64) -> Block {
        let alice = KeyPair::generate();
        let bob = Address::from_bytes([2u8; 20]);
        let tx = Tx::sign(&alice, 1, 1, bob, 10, 1, vec![]).unwrap();
        let block_tx = BlockTx::new(tx, 1_700_000_000, 1, 1);
        let tx_root = crate::block::compute_tx_root(std::slice::from_ref(&block_tx)).unwrap();
        Block::new(
            BlockHeader {
                number,
                prev_block_hash: Hash256::zero(),
                timestamp: 1_700_000_000,
                difficulty: 0,
                miner: Address::from_bytes([9u8; 20]),
                state_root: Hash256::zero(),
                tx_root,
                nonce: 0,
            },
            vec![block_tx],
        )
    }

    #[test]
    fn write_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path()).unwrap();
        let block = sample_block(1);
        storage.write(&block).unwrap();

        let loaded = storage.get(1).unwrap();
        assert_eq!(loaded.header.number, 1);
        assert_eq!(loaded.hash(), block.hash());
    }

    #[test]
    fn get_missing_block_is_invalid_input_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path()).unwrap();
        let err = storage.get(1).unwrap_err();
        assert!(matches!(err, BlockchainError::InvalidInput(_)));
    }

    #[test]
    fn iterator_stops_cleanly_at_first_missing_number() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path()).unwrap();
        storage.write(&sample_block(1)).unwrap();
        storage.write(&sample_block(2)).unwrap();

        let blocks: Vec<_> = storage.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].header.number, 1);
        assert_eq!(blocks[1].header.number, 2);
    }

    #[test]
    fn reset_wipes_all_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path()).unwrap();
        storage.write(&sample_block(1)).unwrap();
        storage.reset().unwrap();
        assert!(storage.get(1).is_err());
    }
}
