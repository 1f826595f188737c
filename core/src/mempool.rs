//! Pending-transaction pool and the tip-maximizing selection algorithm used
//! to build candidate blocks.

use std::collections::HashMap;

use shared::{Address, BlockchainError, Hash256, Result};

use crate::transaction::BlockTx;

/// Strategy key read from configuration at startup. Only `"tip"` is
/// implemented; anything else is a configuration error, not a runtime
/// fallback, so a typo'd config never silently degrades selection.
pub const TIP_SELECTOR: &str = "tip";

/// Unordered set of pending transactions, keyed by content hash so
/// insertion is idempotent and removal doesn't require scanning.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    pending: HashMap<Hash256, BlockTx>,
    selector: Selector,
}

#[derive(Debug, Clone, Copy, Default)]
enum Selector {
    #[default]
    Tip,
}

impl Mempool {
    /// Builds a mempool using the named selection strategy.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::ConfigError`] if `selector_key` names an
    /// unregistered strategy.
    pub fn with_selector(selector_key: &str) -> Result<Self> {
        let selector = match selector_key {
            TIP_SELECTOR => Selector::Tip,
            other => {
                return Err(BlockchainError::ConfigError(format!(
                    "unknown mempool selector \"{other}\""
                )))
            }
        };
        Ok(Self {
            pending: HashMap::new(),
            selector,
        })
    }

    /// Inserts a transaction by its content hash. A re-submission of the
    /// same transaction is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction can't be hashed.
    pub fn insert(&mut self, block_tx: BlockTx) -> Result<Hash256> {
        let hash = block_tx.hash()?;
        self.pending.entry(hash).or_insert(block_tx);
        Ok(hash)
    }

    pub fn remove(&mut self, hash: &Hash256) {
        self.pending.remove(hash);
    }

    pub fn remove_all(&mut self, hashes: &[Hash256]) {
        for hash in hashes {
            self.remove(hash);
        }
    }

    #[must_use]
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.pending.contains_key(hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// A snapshot of the current pending set, filtered to one account if
    /// requested (used by the wallet-facing mempool query).
    #[must_use]
    pub fn snapshot(&self, account: Option<Address>) -> Vec<BlockTx> {
        self.pending
            .values()
            .filter(|block_tx| {
                account.map_or(true, |addr| {
                    block_tx.tx.recover_from().map(|from| from == addr).unwrap_or(false)
                })
            })
            .cloned()
            .collect()
    }

    /// Selects up to `max` transactions to include in the next candidate
    /// block, via the configured strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if any pending transaction's signature fails to
    /// recover a sender (such a transaction should never have been
    /// accepted into the pool in the first place, but selection re-derives
    /// `from` defensively rather than trusting a cached value).
    pub fn pick(&self, max: usize) -> Result<Vec<BlockTx>> {
        match self.selector {
            Selector::Tip => pick_by_tip(self.pending.values(), max),
        }
    }
}

/// The nonce-preserving, tip-maximizing selector described by the spec:
/// group by sender, sort each group by nonce, build nonce-depth "rows",
/// consume full rows in order, and for the final partial row, sort by tip
/// descending and take just enough to fill the quota.
fn pick_by_tip<'a>(
    pending: impl Iterator<Item = &'a BlockTx>,
    max: usize,
) -> Result<Vec<BlockTx>> {
    if max == 0 {
        return Ok(Vec::new());
    }

    let mut by_sender: HashMap<Address, Vec<BlockTx>> = HashMap::new();
    for block_tx in pending {
        let from = block_tx.tx.recover_from()?;
        by_sender.entry(from).or_default().push(block_tx.clone());
    }

    for group in by_sender.values_mut() {
        group.sort_by_key(|block_tx| block_tx.tx.nonce);
    }

    // Senders in a stable, deterministic order so row construction (and
    // therefore selection among equally-tipped final-row candidates) isn't
    // at the mercy of HashMap iteration order.
    let mut senders: Vec<Address> = by_sender.keys().copied().collect();
    senders.sort();

    let row_count = by_sender.values().map(Vec::len).max().unwrap_or(0);
    let mut selected = Vec::with_capacity(max);

    for row in 0..row_count {
        if selected.len() >= max {
            break;
        }

        let mut row_txs: Vec<BlockTx> = senders
            .iter()
            .filter_map(|sender| by_sender.get(sender).and_then(|group| group.get(row)))
            .cloned()
            .collect();

        let remaining = max - selected.len();
        if row_txs.len() <= remaining {
            selected.extend(row_txs);
        } else {
            row_txs.sort_by(|a, b| b.tx.tip.cmp(&a.tx.tip));
            selected.extend(row_txs.into_iter().take(remaining));
        }
    }

    Ok(selected)
}
