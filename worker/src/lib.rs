//! Concurrent mining pipeline: cancellable PoW/PoA rounds, peer status
//! polling with reorg triggering, and transaction gossip — the active
//! half of a node, driven by signals from [`ledger_core::StateEngine`].

pub mod signals;
pub mod worker;

pub use worker::{Worker, WorkerConfig, WorkerHandleImpl};
