//! The narrow interface state uses to talk to the worker, breaking the
//! state ↔ worker reference cycle: `worker` depends on `ledger_core` for
//! `StateEngine`, so `StateEngine` cannot hold a concrete `Worker` without
//! creating a cycle back. It holds one behind this trait instead, and the
//! `worker` crate provides the implementation.

/// Signals state sends toward the worker. Every method is fire-and-forget
/// and non-blocking — per the concurrency design, these model edge
/// triggered semaphores, not queued work items.
pub trait WorkerHandle: Send + Sync {
    /// Requests a mining round. Coalesced: a pending signal makes this a
    /// no-op.
    fn signal_start(&self);

    /// Requests the in-progress mining round (if any) abort.
    fn signal_cancel(&self);

    /// Queues a transaction to be gossiped to known peers. Bounded by
    /// `max_tx_share_requests`; overflow drops the oldest-pending request
    /// silently rather than blocking the caller.
    fn signal_share(&self, tx_hash: shared::Hash256);

    /// Requests all worker tasks exit. Idempotent.
    fn shutdown(&self);
}

/// A `WorkerHandle` that does nothing, used where a caller needs to
/// construct a `StateEngine` without wiring up a real worker (tests,
/// `ProcessProposedBlock`-only tooling).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWorkerHandle;

impl WorkerHandle for NullWorkerHandle {
    fn signal_start(&self) {}
    fn signal_cancel(&self) {}
    fn signal_share(&self, _tx_hash: shared::Hash256) {}
    fn shutdown(&self) {}
}
