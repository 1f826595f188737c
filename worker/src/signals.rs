//! Bounded, non-blocking signal channels the three worker tasks wait on.
//!
//! `start-mining` and `cancel-mining` are capacity-1: a pending signal
//! already means "do the thing", so a second send while one is queued is
//! redundant, not lost. `share-tx` is bounded by `max_tx_share_requests`.
//! Every send is non-blocking (`try_send`) — overflow is dropped silently
//! rather than ever blocking the caller, which is what keeps the state
//! engine's signal calls from being able to deadlock against the worker.

use shared::Hash256;
use tokio::sync::{mpsc, watch};

pub struct SignalReceivers {
    pub start_mining: mpsc::Receiver<()>,
    pub cancel_mining: mpsc::Receiver<()>,
    pub share_tx: mpsc::Receiver<Hash256>,
    pub shutdown: watch::Receiver<bool>,
}

/// The sending half of every signal channel. Cheap to clone; every clone
/// reaches the same receivers.
#[derive(Clone)]
pub struct SignalSenders {
    start_mining: mpsc::Sender<()>,
    cancel_mining: mpsc::Sender<()>,
    share_tx: mpsc::Sender<Hash256>,
    shutdown: watch::Sender<bool>,
}

impl SignalSenders {
    pub fn signal_start(&self) {
        let _ = self.start_mining.try_send(());
    }

    pub fn signal_cancel(&self) {
        let _ = self.cancel_mining.try_send(());
    }

    pub fn signal_share(&self, tx_hash: Hash256) {
        let _ = self.share_tx.try_send(tx_hash);
    }

    /// Idempotent: a `watch` channel just holds its latest value, so
    /// signalling shutdown twice is a no-op the second time.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[must_use]
pub fn channel(max_tx_share_requests: usize) -> (SignalSenders, SignalReceivers) {
    let (start_tx, start_rx) = mpsc::channel(1);
    let (cancel_tx, cancel_rx) = mpsc::channel(1);
    let (share_tx, share_rx) = mpsc::channel(max_tx_share_requests.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    (
        SignalSenders {
            start_mining: start_tx,
            cancel_mining: cancel_tx,
            share_tx,
            shutdown: shutdown_tx,
        },
        SignalReceivers {
            start_mining: start_rx,
            cancel_mining: cancel_rx,
            share_tx: share_rx,
            shutdown: shutdown_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_on_capacity_one_channel_is_dropped_not_blocked() {
        let (senders, _receivers) = channel(4);
        // Two sends with nobody reading: the first fills the capacity-1
        // slot, the second must not panic or block.
        senders.signal_start();
        senders.signal_start();
    }

    #[tokio::test]
    async fn shutdown_signal_is_observed_by_a_watcher() {
        let (senders, receivers) = channel(4);
        let mut shutdown = receivers.shutdown;
        senders.signal_shutdown();
        shutdown.changed().await.unwrap();
        assert!(*shutdown.borrow());
    }
}
