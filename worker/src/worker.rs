//! The concurrent mining pipeline: three cooperative background tasks
//! (mine, sync peers, share transactions) plus the [`WorkerHandle`]
//! implementation the state engine signals through.
//!
//! Grounded on the cancellable-PoW pattern of mining loops that check a
//! shared atomic flag on a batched interval, adapted here to cooperate
//! with `tokio::select!` instead of raw OS threads: the PoW search itself
//! still runs on a blocking thread (it's CPU-bound), while the async task
//! that owns the round races it against an external cancel signal.

use std::sync::Arc;
use std::time::Duration;

use ledger_core::{
    Address, Block, BlockchainError, ConsensusMode, MiningCancellation, PeerTransport, StateEngine,
    WorkerHandle,
};
use shared::Hash256;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::signals::{self, SignalReceivers, SignalSenders};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often `peerOperations` polls known peers for their status.
    pub peer_update_interval: Duration,
    /// How often a PoA authority's timer-driven round fires.
    pub poa_block_interval: Duration,
    /// Capacity of the outgoing transaction-gossip queue.
    pub max_tx_share_requests: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            peer_update_interval: Duration::from_secs(10),
            poa_block_interval: Duration::from_secs(5),
            max_tx_share_requests: 64,
        }
    }
}

/// The [`WorkerHandle`] implementation `StateEngine` signals through.
/// Cloning is cheap and every clone reaches the same background tasks.
#[derive(Clone)]
pub struct WorkerHandleImpl {
    signals: SignalSenders,
}

impl WorkerHandle for WorkerHandleImpl {
    fn signal_start(&self) {
        self.signals.signal_start();
    }

    fn signal_cancel(&self) {
        self.signals.signal_cancel();
    }

    fn signal_share(&self, tx_hash: Hash256) {
        self.signals.signal_share(tx_hash);
    }

    fn shutdown(&self) {
        self.signals.signal_shutdown();
    }
}

/// Owns the three spawned background tasks. Dropping a `Worker` does not
/// stop them — call [`Worker::shutdown`] (via the handle) and then
/// [`Worker::join`] for a clean exit.
pub struct Worker {
    tasks: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Spawns the worker's background tasks against `state`, wired to
    /// `transport` for peer communication. The returned handle should be
    /// given to `state` via `StateEngine::set_worker_handle` so the state
    /// engine can signal back.
    pub fn spawn(
        state: Arc<StateEngine>,
        transport: Arc<dyn PeerTransport>,
        config: WorkerConfig,
    ) -> (Arc<WorkerHandleImpl>, Self) {
        let (senders, receivers) = signals::channel(config.max_tx_share_requests);
        let SignalReceivers {
            start_mining,
            cancel_mining,
            share_tx,
            shutdown,
        } = receivers;

        let handle = Arc::new(WorkerHandleImpl { signals: senders });
        let mut tasks = Vec::new();

        match state.consensus() {
            ConsensusMode::ProofOfWork => {
                tasks.push(tokio::spawn(pow_operations(
                    Arc::clone(&state),
                    Arc::clone(&transport),
                    Arc::clone(&handle),
                    start_mining,
                    cancel_mining,
                    shutdown.clone(),
                )));
            }
            ConsensusMode::ProofOfAuthority { authority } => {
                drop(start_mining);
                drop(cancel_mining);
                tasks.push(tokio::spawn(poa_operations(
                    Arc::clone(&state),
                    Arc::clone(&transport),
                    shutdown.clone(),
                    config.poa_block_interval,
                    authority,
                )));
            }
        }

        tasks.push(tokio::spawn(peer_operations(
            Arc::clone(&state),
            Arc::clone(&transport),
            shutdown.clone(),
            config.peer_update_interval,
        )));

        tasks.push(tokio::spawn(share_tx_operations(
            state,
            transport,
            share_tx,
            shutdown,
        )));

        (handle, Self { tasks })
    }

    /// Waits for every background task to exit. Call after signalling
    /// shutdown through the worker handle.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(%err, "worker task panicked");
            }
        }
    }
}

fn shutdown_requested(watch: &watch::Receiver<bool>) -> bool {
    *watch.borrow()
}

/// `powOperations`: awaits a start-mining signal, runs one mining round,
/// loops. A round re-triggers itself if the mempool is still non-empty
/// when it completes, since signals aren't ordered relative to mempool
/// mutations (a start signal may arrive after the transaction that caused
/// it was already mined).
async fn pow_operations(
    state: Arc<StateEngine>,
    transport: Arc<dyn PeerTransport>,
    handle: Arc<WorkerHandleImpl>,
    mut start_mining: mpsc::Receiver<()>,
    mut cancel_mining: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || shutdown_requested(&shutdown) {
                    break;
                }
            }
            received = start_mining.recv() => {
                if received.is_none() {
                    break;
                }
                run_mining_round(&state, &transport, &mut cancel_mining).await;
                if state.mempool_len() > 0 {
                    handle.signal_start();
                }
            }
        }
    }
}

async fn run_mining_round(
    state: &Arc<StateEngine>,
    transport: &Arc<dyn PeerTransport>,
    cancel_mining: &mut mpsc::Receiver<()>,
) {
    if !state.is_mining_allowed() || state.mempool_len() == 0 {
        return;
    }
    while cancel_mining.try_recv().is_ok() {}

    let cancellation = MiningCancellation::new();
    let mining_cancel = cancellation.clone();
    let mining_state = Arc::clone(state);
    let mut mining = tokio::task::spawn_blocking(move || mining_state.mine_new_block(&mining_cancel));

    let outcome = tokio::select! {
        _ = cancel_mining.recv() => {
            cancellation.cancel();
            mining.await
        }
        result = &mut mining => result,
    };

    match outcome {
        Ok(Ok(block)) => broadcast_mined_block(state, transport, block).await,
        Ok(Err(BlockchainError::NoTransactions | BlockchainError::Cancelled)) => {}
        Ok(Err(err)) => error!(%err, "mining round failed"),
        Err(join_err) => error!(%join_err, "mining task panicked"),
    }
}

async fn broadcast_mined_block(state: &Arc<StateEngine>, transport: &Arc<dyn PeerTransport>, block: Block) {
    info!(number = block.header.number, txs = block.transactions.len(), "mined block");
    for host in state.peers().healthy_peers() {
        if let Err(err) = transport.propose_block(&host, &block).await {
            warn!(%host, %err, "failed to propose mined block to peer");
            state.peers().mark_degraded(&host);
        }
    }
}

/// `peerOperations`: every `peer_update_interval`, polls each known peer's
/// status, triggers `Reorganize` if a peer is ahead, and merges in its
/// advertised neighbor list.
async fn peer_operations(
    state: Arc<StateEngine>,
    transport: Arc<dyn PeerTransport>,
    mut shutdown: watch::Receiver<bool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || shutdown_requested(&shutdown) {
                    break;
                }
            }
            _ = ticker.tick() => {
                for host in state.peers().known_peers() {
                    match transport.status(&host).await {
                        Ok(status) => {
                            if status.latest_block_number > state.latest_block_number() {
                                if let Err(err) = state.reorganize(transport.as_ref()).await {
                                    warn!(%err, "reorganize failed");
                                }
                            }
                            for neighbor in status.known_peers {
                                state.peers().add(neighbor);
                            }
                        }
                        Err(err) => {
                            warn!(%host, %err, "peer status check failed");
                            state.peers().mark_degraded(&host);
                        }
                    }
                }
            }
        }
    }
}

/// `shareTxOperations`: drains the outgoing transaction queue and POSTs
/// each one to every known, healthy peer.
async fn share_tx_operations(
    state: Arc<StateEngine>,
    transport: Arc<dyn PeerTransport>,
    mut share_tx: mpsc::Receiver<Hash256>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || shutdown_requested(&shutdown) {
                    break;
                }
            }
            received = share_tx.recv() => {
                let Some(hash) = received else { break };
                let Some(block_tx) = state
                    .mempool_snapshot(None)
                    .into_iter()
                    .find(|tx| tx.hash().map(|h| h == hash).unwrap_or(false))
                else {
                    continue;
                };
                for host in state.peers().healthy_peers() {
                    if let Err(err) = transport.submit_tx(&host, &block_tx).await {
                        warn!(%host, %err, "failed to share transaction with peer");
                        state.peers().mark_degraded(&host);
                    }
                }
            }
        }
    }
}

/// `PoA mode`: replaces `powOperations` with a timer-driven round where
/// the designated authority signs and appends with no PoW search. Reuses
/// `StateEngine::mine_new_block` against a zero-difficulty genesis, so the
/// first nonce checked always satisfies — there is no separate authority
/// code path in the state engine, only a different genesis parameter.
async fn poa_operations(
    state: Arc<StateEngine>,
    transport: Arc<dyn PeerTransport>,
    mut shutdown: watch::Receiver<bool>,
    interval: Duration,
    authority: Address,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || shutdown_requested(&shutdown) {
                    break;
                }
            }
            _ = ticker.tick() => {
                if authority != state.node_address() || state.mempool_len() == 0 {
                    continue;
                }
                let cancellation = MiningCancellation::new();
                match state.mine_new_block(&cancellation) {
                    Ok(block) => broadcast_mined_block(&state, &transport, block).await,
                    Err(BlockchainError::NoTransactions) => {}
                    Err(err) => error!(%err, "authority round failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{ChannelEventSink, DiskStorage, EngineConfig, Genesis};
    use shared::KeyPair;
    use std::collections::HashMap;

    struct NoopTransport;

    #[async_trait::async_trait]
    impl PeerTransport for NoopTransport {
        async fn status(&self, _host: &str) -> ledger_core::Result<ledger_core::PeerStatus> {
            Err(BlockchainError::NetworkError("no peers in test".into()))
        }
        async fn blocks_by_number(
            &self,
            _host: &str,
            _from: u64,
            _to: u64,
        ) -> ledger_core::Result<Vec<Block>> {
            Ok(Vec::new())
        }
        async fn propose_block(&self, _host: &str, _block: &Block) -> ledger_core::Result<()> {
            Ok(())
        }
        async fn submit_tx(&self, _host: &str, _tx: &ledger_core::BlockTx) -> ledger_core::Result<()> {
            Ok(())
        }
        async fn add_peer(&self, _host: &str, _new_peer_host: &str) -> ledger_core::Result<()> {
            Ok(())
        }
    }

    fn test_state() -> Arc<StateEngine> {
        let alice = KeyPair::generate();
        let mut balances = HashMap::new();
        balances.insert(alice.address(), 1_000);
        let genesis = Genesis {
            date: 1_700_000_000,
            chain_id: 1,
            initial_difficulty: 0,
            mining_reward: 50,
            gas_price: 1,
            balances,
        };
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(DiskStorage::open(dir.path()).unwrap());
        Arc::new(
            StateEngine::new(
                genesis,
                storage,
                Arc::new(ChannelEventSink::new(16)),
                ConsensusMode::ProofOfWork,
                EngineConfig {
                    node_address: Address::from_bytes([9u8; 20]),
                    max_txs_per_block: 10,
                },
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn spawn_and_shutdown_joins_cleanly() {
        let state = test_state();
        let transport: Arc<dyn PeerTransport> = Arc::new(NoopTransport);
        let (handle, worker) = Worker::spawn(state.clone(), transport, WorkerConfig::default());
        state.set_worker_handle(handle.clone());

        handle.shutdown();
        worker.join().await;
    }
}
