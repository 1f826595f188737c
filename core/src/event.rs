//! Chain event fan-out. Out-of-scope collaborators (websocket upgrade,
//! wallet-facing HTTP) subscribe to this to stream events to clients; the
//! state engine only knows about the narrow [`EventSink`] contract.

use serde::{Deserialize, Serialize};
use shared::{Address, BlockHeight, Hash256};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChainEvent {
    BlockMined {
        number: BlockHeight,
        hash: Hash256,
        miner: Address,
        tx_count: usize,
    },
    BlockAccepted {
        number: BlockHeight,
        hash: Hash256,
    },
    Reorganized {
        from_number: BlockHeight,
        to_number: BlockHeight,
    },
    TransactionAccepted {
        hash: Hash256,
    },
}

/// Narrow publish interface the state engine depends on. Kept separate
/// from the subscribe side ([`broadcast::Receiver`]) so state never needs
/// to know how many subscribers exist.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ChainEvent);
}

/// A [`tokio::sync::broadcast`]-backed sink. Slow or absent subscribers
/// never block publication — `broadcast::Sender::send` only fails when
/// there are zero receivers, which is not an error worth propagating.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: broadcast::Sender<ChainEvent>,
}

impl ChannelEventSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: ChainEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let sink = ChannelEventSink::new(16);
        let mut receiver = sink.subscribe();

        sink.publish(ChainEvent::BlockAccepted {
            number: 1,
            hash: Hash256::zero(),
        });

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, ChainEvent::BlockAccepted { number: 1, .. }));
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let sink = ChannelEventSink::new(16);
        sink.publish(ChainEvent::TransactionAccepted {
            hash: Hash256::zero(),
        });
    }
}
