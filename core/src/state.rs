//! The state engine: account db, mempool, chain tip and storage, wired
//! together behind one synchronized surface. Owns everything the worker
//! drives from the outside (mining, proposed blocks, reorg) and everything
//! wallets/peers read through the external HTTP surface (out of scope
//! here, but this is the contract it consumes).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use shared::{Address, BlockHeight, BlockchainError, Hash256, Result, Timestamp};

use crate::account::AccountDb;
use crate::block::{compute_tx_root, Block, BlockHeader};
use crate::event::{ChainEvent, EventSink};
use crate::genesis::Genesis;
use crate::handle::WorkerHandle;
use crate::mempool::{Mempool, TIP_SELECTOR};
use crate::peer::{PeerRegistry, PeerTransport};
use crate::storage::Storage;
use crate::transaction::BlockTx;

/// One of the two consensus modes named in the glossary.
#[derive(Debug, Clone, Copy)]
pub enum ConsensusMode {
    ProofOfWork,
    ProofOfAuthority { authority: Address },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub node_address: Address,
    pub max_txs_per_block: usize,
}

/// Account db, latest block number and hash, guarded together so `(tip,
/// state)` is never observed half-updated.
struct ChainTip {
    account_db: AccountDb,
    latest_number: BlockHeight,
    latest_hash: Hash256,
}

/// Cooperative cancellation handle for one mining round. Cheap to clone;
/// every clone shares the same underlying flag.
#[derive(Clone, Default)]
pub struct MiningCancellation(Arc<AtomicBool>);

impl MiningCancellation {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct StateEngine {
    genesis: Genesis,
    tip: RwLock<ChainTip>,
    mempool: RwLock<Mempool>,
    storage: Arc<dyn Storage>,
    peers: PeerRegistry,
    worker: RwLock<Option<Arc<dyn WorkerHandle>>>,
    consensus: ConsensusMode,
    events: Arc<dyn EventSink>,
    mining_allowed: AtomicBool,
    config: EngineConfig,
}

impl StateEngine {
    /// Builds a state engine from genesis and persisted storage, replaying
    /// every stored block to rebuild the account db and chain tip. Trusts
    /// blocks already on disk (they were validated before being written);
    /// a corrupt chain surfaces as an error rather than a panic.
    ///
    /// # Errors
    ///
    /// Returns an error if replaying stored blocks fails, or if the
    /// mempool's configured selector strategy is unknown.
    pub fn new(
        genesis: Genesis,
        storage: Arc<dyn Storage>,
        events: Arc<dyn EventSink>,
        consensus: ConsensusMode,
        config: EngineConfig,
    ) -> Result<Self> {
        let mut account_db = AccountDb::from_genesis(&genesis.balances);
        let mut latest_number = 0u64;
        let mut latest_hash = Hash256::zero();

        for block in storage.as_ref().iter_blocks()? {
            let block = block?;
            for block_tx in &block.transactions {
                let from = block_tx.tx.recover_from()?;
                let fee = block_tx.miner_fee()?;
                account_db.apply_transaction(
                    from,
                    block_tx.tx.to,
                    block.header.miner,
                    block_tx.tx.value,
                    fee,
                    block_tx.tx.nonce,
                )?;
            }
            account_db.credit(block.header.miner, genesis.mining_reward);
            latest_number = block.header.number;
            latest_hash = block.hash();
        }

        Ok(Self {
            genesis,
            tip: RwLock::new(ChainTip {
                account_db,
                latest_number,
                latest_hash,
            }),
            mempool: RwLock::new(Mempool::with_selector(TIP_SELECTOR)?),
            storage,
            peers: PeerRegistry::new(),
            worker: RwLock::new(None),
            consensus,
            events,
            mining_allowed: AtomicBool::new(true),
            config,
        })
    }

    pub fn set_worker_handle(&self, handle: Arc<dyn WorkerHandle>) {
        *self.worker.write() = Some(handle);
    }

    #[must_use]
    pub const fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    #[must_use]
    pub const fn consensus(&self) -> ConsensusMode {
        self.consensus
    }

    #[must_use]
    pub const fn node_address(&self) -> Address {
        self.config.node_address
    }

    #[must_use]
    pub fn is_mining_allowed(&self) -> bool {
        self.mining_allowed.load(Ordering::SeqCst)
    }

    pub fn set_mining_allowed(&self, allowed: bool) {
        self.mining_allowed.store(allowed, Ordering::SeqCst);
    }

    #[must_use]
    pub fn latest_block_number(&self) -> BlockHeight {
        self.tip.read().latest_number
    }

    #[must_use]
    pub fn latest_block_hash(&self) -> Hash256 {
        self.tip.read().latest_hash
    }

    #[must_use]
    pub fn account(&self, address: &Address) -> crate::account::Account {
        self.tip.read().account_db.get(address)
    }

    #[must_use]
    pub fn mempool_len(&self) -> usize {
        self.mempool.read().len()
    }

    #[must_use]
    pub fn mempool_snapshot(&self, account: Option<Address>) -> Vec<BlockTx> {
        self.mempool.read().snapshot(account)
    }

    /// Submits a wallet- or peer-originated transaction: verifies
    /// `chain_id`, recovers `from`, and checks (informationally — the real
    /// check happens at mining time against a then-current snapshot) that
    /// the sender can currently cover the transaction's total cost.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::ChainIdMismatch`],
    /// [`BlockchainError::InvalidSignature`], [`BlockchainError::SelfTransfer`]
    /// or [`BlockchainError::InsufficientFunds`] on validation failure.
    pub fn submit_transaction(&self, block_tx: BlockTx) -> Result<Hash256> {
        block_tx.tx.check_chain_id(self.genesis.chain_id)?;
        let from = block_tx.tx.recover_from()?;
        let total_cost = block_tx.total_cost()?;

        let balance = self.tip.read().account_db.get(&from).balance;
        if balance < total_cost {
            return Err(BlockchainError::InsufficientFunds);
        }

        let hash = self.mempool.write().insert(block_tx)?;
        self.events.publish(ChainEvent::TransactionAccepted { hash });

        if let Some(worker) = self.worker.read().clone() {
            worker.signal_start();
        }

        Ok(hash)
    }

    /// Runs one mining round: picks transactions, builds a candidate
    /// block, applies them to a snapshot (excluding failures but still
    /// consuming their fee), mines proof-of-work, and on success commits
    /// the snapshot and appends to storage.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::NoTransactions`] if the mempool is empty
    /// or every picked transaction fails validation,
    /// [`BlockchainError::Cancelled`] if `cancel` fires before a solution
    /// is found, or a fatal storage error if the commit fails to persist.
    pub fn mine_new_block(&self, cancel: &MiningCancellation) -> Result<Block> {
        let picked = self.mempool.read().pick(self.config.max_txs_per_block)?;
        if picked.is_empty() {
            return Err(BlockchainError::NoTransactions);
        }

        let (number, prev_hash) = {
            let tip = self.tip.read();
            (tip.latest_number + 1, tip.latest_hash)
        };
        let miner = self.config.node_address;

        let mut snapshot = self.tip.read().account_db.clone();
        let mut included = Vec::with_capacity(picked.len());
        let mut consumed_hashes = Vec::with_capacity(picked.len());

        for block_tx in picked {
            let hash = block_tx.hash()?;
            consumed_hashes.push(hash);

            if Self::apply_one(&mut snapshot, &block_tx, miner, self.genesis.chain_id).is_ok() {
                included.push(block_tx);
            } else {
                Self::charge_fee_best_effort(&mut snapshot, &block_tx);
            }
        }

        if included.is_empty() {
            return Err(BlockchainError::NoTransactions);
        }

        snapshot.credit(miner, self.genesis.mining_reward);

        let tx_root = compute_tx_root(&included)?;
        let state_root = Hash256::keccak256(&snapshot.state_digest_input());
        let timestamp = unix_now();

        let header_template = BlockHeader {
            number,
            prev_block_hash: prev_hash,
            timestamp,
            difficulty: self.genesis.initial_difficulty,
            miner,
            state_root,
            tx_root,
            nonce: 0,
        };

        let header = run_proof_of_work(header_template, cancel)?;
        let block = Block::new(header, included);

        self.storage.write(&block)?;
        {
            let mut tip = self.tip.write();
            tip.account_db = snapshot;
            tip.latest_number = block.header.number;
            tip.latest_hash = block.hash();
        }
        self.mempool.write().remove_all(&consumed_hashes);
        self.events.publish(ChainEvent::BlockMined {
            number: block.header.number,
            hash: block.hash(),
            miner,
            tx_count: block.transactions.len(),
        });

        Ok(block)
    }

    fn apply_one(
        snapshot: &mut AccountDb,
        block_tx: &BlockTx,
        miner: Address,
        chain_id: u16,
    ) -> Result<()> {
        block_tx.tx.check_chain_id(chain_id)?;
        let from = block_tx.tx.recover_from()?;
        let fee = block_tx.miner_fee()?;
        snapshot.apply_transaction(from, block_tx.tx.to, miner, block_tx.tx.value, fee, block_tx.tx.nonce)
    }

    /// A transaction excluded from the block still consumes its fee, per
    /// the open design question on mining fee policy. If the sender can't
    /// even cover the fee, it's simply dropped uncharged rather than
    /// driving the account negative.
    fn charge_fee_best_effort(snapshot: &mut AccountDb, block_tx: &BlockTx) {
        if let (Ok(from), Ok(fee)) = (block_tx.tx.recover_from(), block_tx.miner_fee()) {
            let _ = snapshot.debit_fee_only(from, fee);
        }
    }

    /// Applies a peer-proposed block. Unlike self-mining, every
    /// transaction must succeed — a single failure rejects the whole
    /// block.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::ChainForked`] if the block doesn't
    /// extend our tip by exactly one (the caller should trigger
    /// [`Self::reorganize`]), or [`BlockchainError::InvalidBlock`] on a
    /// failed PoW/merkle/state-root check, or any per-transaction
    /// validation error.
    pub fn process_proposed_block(&self, block: Block) -> Result<()> {
        let (latest_number, latest_hash) = {
            let tip = self.tip.read();
            (tip.latest_number, tip.latest_hash)
        };

        if block.header.number <= latest_number {
            return Err(BlockchainError::InvalidBlock(
                "proposed block is stale".to_string(),
            ));
        }

        if block.header.number != latest_number + 1 || block.header.prev_block_hash != latest_hash {
            return Err(BlockchainError::ChainForked {
                at_height: latest_number,
            });
        }

        block.validate_linkage(latest_number, latest_hash)?;
        if !block.verify_tx_root()? {
            return Err(BlockchainError::InvalidBlock(
                "tx_root does not match the block's transactions".to_string(),
            ));
        }

        let mut snapshot = self.tip.read().account_db.clone();
        for block_tx in &block.transactions {
            Self::apply_one(&mut snapshot, block_tx, block.header.miner, self.genesis.chain_id)?;
        }
        snapshot.credit(block.header.miner, self.genesis.mining_reward);

        let state_root = Hash256::keccak256(&snapshot.state_digest_input());
        if state_root != block.header.state_root {
            return Err(BlockchainError::InvalidBlock(
                "state_root does not match replayed account state".to_string(),
            ));
        }

        self.storage.write(&block)?;
        let consumed: Vec<Hash256> = block
            .transactions
            .iter()
            .map(BlockTx::hash)
            .collect::<Result<_>>()?;

        {
            let mut tip = self.tip.write();
            tip.account_db = snapshot;
            tip.latest_number = block.header.number;
            tip.latest_hash = block.hash();
        }
        self.mempool.write().remove_all(&consumed);

        if let Some(worker) = self.worker.read().clone() {
            worker.signal_cancel();
        }
        self.events.publish(ChainEvent::BlockAccepted {
            number: block.header.number,
            hash: block.hash(),
        });

        Ok(())
    }

    /// Reads up to `to - from + 1` stored blocks in range `[from, to]`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidInput`] if `from > to`.
    pub fn query_blocks(&self, from: BlockHeight, to: BlockHeight) -> Result<Vec<Block>> {
        if from > to {
            return Err(BlockchainError::InvalidInput(
                "block range: from > to".to_string(),
            ));
        }
        let mut blocks = Vec::new();
        for number in from..=to {
            match self.storage.get(number) {
                Ok(block) => blocks.push(block),
                Err(BlockchainError::InvalidInput(_)) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(blocks)
    }

    /// Pulls blocks from the peer with the highest reported chain tip and
    /// applies them via [`Self::process_proposed_block`]. A no-op if no
    /// peer exceeds our own tip. On a peer failure (network error, or a
    /// block that doesn't apply cleanly), that peer is marked degraded and
    /// the next-best candidate is tried.
    ///
    /// If the peer's chain diverges below our tip (our own block at some
    /// height doesn't match theirs), walks back to the last height both
    /// chains agree on and rewinds local state to it before pulling the
    /// peer's blocks forward, so a genuinely forked ancestor is replaced
    /// rather than merely extended.
    ///
    /// # Errors
    ///
    /// Returns an error only if every healthy peer fails in a way that
    /// isn't a plain network/validation rejection (practically, this
    /// should not happen — failures are absorbed by marking peers
    /// degraded).
    pub async fn reorganize(&self, transport: &dyn PeerTransport) -> Result<()> {
        let mut statuses = Vec::new();
        for host in self.peers.healthy_peers() {
            match transport.status(&host).await {
                Ok(status) => statuses.push((host, status)),
                Err(_) => self.peers.mark_degraded(&host),
            }
        }
        statuses.sort_by(|a, b| b.1.latest_block_number.cmp(&a.1.latest_block_number));

        let our_number = self.latest_block_number();

        for (host, status) in statuses {
            if status.latest_block_number <= our_number {
                continue;
            }

            let common = match self.find_common_ancestor(&host, transport, our_number).await {
                Ok(common) => common,
                Err(_) => {
                    self.peers.mark_degraded(&host);
                    continue;
                }
            };
            if common < our_number && self.rewind_to(common).is_err() {
                self.peers.mark_degraded(&host);
                continue;
            }

            let from = common + 1;
            match transport
                .blocks_by_number(&host, from, status.latest_block_number)
                .await
            {
                Ok(blocks) => {
                    let mut applied_any = false;
                    let mut failed = false;
                    for block in blocks {
                        if self.process_proposed_block(block).is_err() {
                            failed = true;
                            break;
                        }
                        applied_any = true;
                    }
                    if failed {
                        self.peers.mark_degraded(&host);
                        continue;
                    }
                    if applied_any {
                        self.events.publish(ChainEvent::Reorganized {
                            from_number: our_number,
                            to_number: self.latest_block_number(),
                        });
                        return Ok(());
                    }
                }
                Err(_) => self.peers.mark_degraded(&host),
            }
        }

        Ok(())
    }

    /// Walks back from `our_number` until the peer's block at that height
    /// hashes the same as our own stored block, returning that height (0
    /// if no stored block agrees, i.e. the chains share only genesis).
    async fn find_common_ancestor(
        &self,
        host: &str,
        transport: &dyn PeerTransport,
        our_number: BlockHeight,
    ) -> Result<BlockHeight> {
        let mut height = our_number;
        while height > 0 {
            let local = self.storage.get(height)?;
            let peer_blocks = transport.blocks_by_number(host, height, height).await?;
            if peer_blocks.first().map(|b| b.hash() == local.hash()).unwrap_or(false) {
                return Ok(height);
            }
            height -= 1;
        }
        Ok(0)
    }

    /// Rebuilds the account db and chain tip by replaying stored blocks
    /// `1..=height` from genesis, discarding any local state built on top
    /// of a now-abandoned fork.
    fn rewind_to(&self, height: BlockHeight) -> Result<()> {
        let mut account_db = AccountDb::from_genesis(&self.genesis.balances);
        let mut latest_hash = Hash256::zero();

        for number in 1..=height {
            let block = self.storage.get(number)?;
            for block_tx in &block.transactions {
                let from = block_tx.tx.recover_from()?;
                let fee = block_tx.miner_fee()?;
                account_db.apply_transaction(
                    from,
                    block_tx.tx.to,
                    block.header.miner,
                    block_tx.tx.value,
                    fee,
                    block_tx.tx.nonce,
                )?;
            }
            account_db.credit(block.header.miner, self.genesis.mining_reward);
            latest_hash = block.hash();
        }

        let mut tip = self.tip.write();
        tip.account_db = account_db;
        tip.latest_number = height;
        tip.latest_hash = latest_hash;
        Ok(())
    }
}

fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Runs the cancellable proof-of-work search, partitioning the nonce space
/// across `rayon`'s worker pool. Each lane checks `cancel` every 1024
/// hashes, bounding cancellation latency without paying a cross-thread
/// synchronization cost per hash.
fn run_proof_of_work(header_template: BlockHeader, cancel: &MiningCancellation) -> Result<BlockHeader> {
    const BATCH: u64 = 1024;

    let lanes = rayon::current_num_threads().max(1) as u64;
    let found: Arc<RwLock<Option<BlockHeader>>> = Arc::new(RwLock::new(None));
    let solved = AtomicBool::new(false);

    rayon::scope(|scope| {
        for lane in 0..lanes {
            let header_template = header_template.clone();
            let found = Arc::clone(&found);
            let solved = &solved;
            scope.spawn(move |_| {
                let mut header = header_template;
                let mut nonce = lane;
                'search: loop {
                    for _ in 0..BATCH {
                        if solved.load(Ordering::Relaxed) || cancel.is_cancelled() {
                            break 'search;
                        }
                        header.nonce = nonce;
                        if header.hash().meets_difficulty(header.difficulty) {
                            *found.write() = Some(header);
                            solved.store(true, Ordering::Relaxed);
                            break 'search;
                        }
                        match nonce.checked_add(lanes) {
                            Some(next) => nonce = next,
                            None => break 'search,
                        }
                    }
                }
            });
        }
    });

    found.read().clone().ok_or(BlockchainError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskStorage;
    use crate::transaction::Tx;
    use shared::KeyPair;
    use std::collections::HashMap;

    fn test_genesis(alice: Address) -> Genesis {
        let mut balances = HashMap::new();
        balances.insert(alice, 1_000);
        Genesis {
            date: 1_700_000_000,
            chain_id: 1,
            initial_difficulty: 0,
            mining_reward: 50,
            gas_price: 1,
            balances,
        }
    }

    fn engine_with(alice: Address, miner: Address) -> StateEngine {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(DiskStorage::open(dir.path()).unwrap());
        StateEngine::new(
            test_genesis(alice),
            storage,
            Arc::new(crate::event::ChannelEventSink::new(16)),
            ConsensusMode::ProofOfWork,
            EngineConfig {
                node_address: miner,
                max_txs_per_block: 10,
            },
        )
        .unwrap()
    }

    #[test]
    fn s1_basic_mining_moves_balances_and_pays_miner() {
        let alice = KeyPair::generate();
        let bob = Address::from_bytes([2u8; 20]);
        let miner = Address::from_bytes([9u8; 20]);
        let engine = engine_with(alice.address(), miner);

        let tx = Tx::sign(&alice, 1, 1, bob, 100, 5, vec![]).unwrap();
        let block_tx = BlockTx::new(tx, unix_now(), 0, 0);
        engine.submit_transaction(block_tx).unwrap();

        let cancel = MiningCancellation::new();
        let block = engine.mine_new_block(&cancel).unwrap();

        assert_eq!(block.transactions.len(), 1);
        assert_eq!(engine.account(&alice.address()).balance, 895);
        assert_eq!(engine.account(&bob).balance, 100);
        assert_eq!(engine.account(&miner).balance, 55);
        assert_eq!(engine.mempool_len(), 0);
    }

    #[test]
    fn mining_with_empty_mempool_returns_no_transactions() {
        let alice = KeyPair::generate();
        let miner = Address::from_bytes([9u8; 20]);
        let engine = engine_with(alice.address(), miner);

        let cancel = MiningCancellation::new();
        let err = engine.mine_new_block(&cancel).unwrap_err();
        assert!(matches!(err, BlockchainError::NoTransactions));
    }

    #[test]
    fn s5_cancelled_round_leaves_mempool_and_chain_untouched() {
        let alice = KeyPair::generate();
        let bob = Address::from_bytes([2u8; 20]);
        let miner = Address::from_bytes([9u8; 20]);
        let engine = engine_with(alice.address(), miner);

        let tx = Tx::sign(&alice, 1, 1, bob, 100, 5, vec![]).unwrap();
        let block_tx = BlockTx::new(tx, unix_now(), 0, 0);
        engine.submit_transaction(block_tx).unwrap();

        let cancel = MiningCancellation::new();
        cancel.cancel();
        let err = engine.mine_new_block(&cancel).unwrap_err();

        assert!(matches!(err, BlockchainError::Cancelled));
        assert_eq!(engine.mempool_len(), 1);
        assert_eq!(engine.latest_block_number(), 0);
    }

    #[test]
    fn submit_transaction_rejects_insufficient_balance() {
        let alice = KeyPair::generate();
        let bob = Address::from_bytes([2u8; 20]);
        let miner = Address::from_bytes([9u8; 20]);
        let engine = engine_with(alice.address(), miner);

        let tx = Tx::sign(&alice, 1, 1, bob, 10_000, 5, vec![]).unwrap();
        let block_tx = BlockTx::new(tx, unix_now(), 0, 0);
        assert!(engine.submit_transaction(block_tx).is_err());
    }

    #[test]
    fn process_proposed_block_beyond_tip_plus_one_is_chain_forked() {
        let alice = KeyPair::generate();
        let miner = Address::from_bytes([9u8; 20]);
        let engine = engine_with(alice.address(), miner);

        let header = BlockHeader {
            number: 5,
            prev_block_hash: Hash256::zero(),
            timestamp: unix_now(),
            difficulty: 0,
            miner,
            state_root: Hash256::zero(),
            tx_root: Hash256::zero(),
            nonce: 0,
        };
        let alice_tx = Tx::sign(&alice, 1, 1, Address::from_bytes([2u8; 20]), 1, 1, vec![]).unwrap();
        let block_tx = BlockTx::new(alice_tx, unix_now(), 0, 0);
        let block = Block::new(header, vec![block_tx]);

        let err = engine.process_proposed_block(block).unwrap_err();
        assert!(matches!(err, BlockchainError::ChainForked { .. }));
    }

    /// A fake `PeerTransport` that serves another engine's chain, so a
    /// reorg can be driven without any actual networking.
    struct PeerChain(Arc<StateEngine>);

    #[async_trait::async_trait]
    impl crate::peer::PeerTransport for PeerChain {
        async fn status(&self, _host: &str) -> Result<crate::peer::PeerStatus> {
            Ok(crate::peer::PeerStatus {
                latest_block_hash: self.0.latest_block_hash(),
                latest_block_number: self.0.latest_block_number(),
                known_peers: Vec::new(),
            })
        }

        async fn blocks_by_number(&self, _host: &str, from: BlockHeight, to: BlockHeight) -> Result<Vec<Block>> {
            self.0.query_blocks(from, to)
        }

        async fn propose_block(&self, _host: &str, _block: &Block) -> Result<()> {
            Ok(())
        }

        async fn submit_tx(&self, _host: &str, _tx: &BlockTx) -> Result<()> {
            Ok(())
        }

        async fn add_peer(&self, _host: &str, _new_peer_host: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn s4_reorg_pulls_a_longer_peer_chain() {
        let alice = KeyPair::generate();
        let miner = Address::from_bytes([9u8; 20]);
        let bob = Address::from_bytes([2u8; 20]);

        // Node A mines one block locally.
        let engine_a = engine_with(alice.address(), miner);
        let tx = Tx::sign(&alice, 1, 1, bob, 100, 5, vec![]).unwrap();
        engine_a
            .submit_transaction(BlockTx::new(tx, unix_now(), 0, 0))
            .unwrap();
        engine_a.mine_new_block(&MiningCancellation::new()).unwrap();
        assert_eq!(engine_a.latest_block_number(), 1);

        // Node B independently mines two blocks from the same genesis,
        // ending up with a different block 1 and an extra block 2.
        let engine_b = Arc::new(engine_with(alice.address(), miner));
        let tx1 = Tx::sign(&alice, 1, 1, bob, 10, 1, vec![]).unwrap();
        engine_b
            .submit_transaction(BlockTx::new(tx1, unix_now(), 0, 0))
            .unwrap();
        engine_b.mine_new_block(&MiningCancellation::new()).unwrap();
        let tx2 = Tx::sign(&alice, 1, 2, bob, 20, 1, vec![]).unwrap();
        engine_b
            .submit_transaction(BlockTx::new(tx2, unix_now(), 0, 0))
            .unwrap();
        engine_b.mine_new_block(&MiningCancellation::new()).unwrap();
        assert_eq!(engine_b.latest_block_number(), 2);

        // A's own block 1 is not B's block 1, so B's block 2 doesn't
        // extend A's tip even though the numbers line up.
        let b_block_2 = engine_b.query_blocks(2, 2).unwrap().remove(0);
        let err = engine_a.process_proposed_block(b_block_2).unwrap_err();
        assert!(matches!(err, BlockchainError::ChainForked { .. }));

        // Reorganize pulls B's whole chain from block 1 onward and
        // replaces A's local block 1.
        let transport = PeerChain(Arc::clone(&engine_b));
        engine_a.peers().add("b".to_string());
        engine_a.reorganize(&transport).await.unwrap();

        assert_eq!(engine_a.latest_block_number(), 2);
        assert_eq!(engine_a.latest_block_hash(), engine_b.latest_block_hash());
    }
}
