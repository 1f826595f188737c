//! Account-model ledger core: accounts, transactions, blocks, mempool,
//! merkle proofs, storage, peer transport and the state engine that ties
//! them together.

pub mod account;
pub mod block;
pub mod event;
pub mod genesis;
pub mod handle;
pub mod mempool;
pub mod merkle;
pub mod peer;
pub mod state;
pub mod storage;
pub mod transaction;

pub use account::{Account, AccountDb};
pub use block::{compute_tx_root, Block, BlockHeader};
pub use event::{ChainEvent, ChannelEventSink, EventSink};
pub use genesis::Genesis;
pub use handle::{NullWorkerHandle, WorkerHandle};
pub use mempool::{Mempool, TIP_SELECTOR};
pub use merkle::{MerkleHashable, MerkleTree, Proof};
pub use peer::{HttpPeerTransport, PeerRegistry, PeerStatus, PeerTransport};
pub use state::{ConsensusMode, EngineConfig, MiningCancellation, StateEngine};
pub use storage::{DiskStorage, Storage};
pub use transaction::{BlockTx, Tx};

pub use shared::{Address, BlockHeight, BlockchainError, Hash256, Result, Timestamp};
