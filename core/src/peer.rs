//! Peer registry and the node-to-node transport contract.
//!
//! The wire format and routing (CORS, JSON codec, websocket upgrade) are
//! out-of-scope collaborators; this module only owns the shape of the
//! private HTTP v1 contract and the known-peers set.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared::{BlockHeight, BlockchainError, Hash256, Result};

use crate::block::Block;
use crate::transaction::BlockTx;

/// A peer's self-reported chain tip and neighbor list, per `GET
/// /node/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStatus {
    pub latest_block_hash: Hash256,
    pub latest_block_number: BlockHeight,
    pub known_peers: Vec<String>,
}

/// Transport contract for the private, node-to-node HTTP v1 surface.
/// Implementations own the actual wire format; the state engine and
/// worker depend only on this trait, so tests can substitute an in-memory
/// fake instead of making real HTTP calls.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn status(&self, host: &str) -> Result<PeerStatus>;
    async fn blocks_by_number(&self, host: &str, from: BlockHeight, to: BlockHeight) -> Result<Vec<Block>>;
    async fn propose_block(&self, host: &str, block: &Block) -> Result<()>;
    async fn submit_tx(&self, host: &str, tx: &BlockTx) -> Result<()>;
    async fn add_peer(&self, host: &str, new_peer_host: &str) -> Result<()>;
}

/// `reqwest`-backed implementation of the private HTTP v1 contract.
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn map_reqwest_err(err: reqwest::Error) -> BlockchainError {
        BlockchainError::NetworkError(err.to_string())
    }
}

impl Default for HttpPeerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn status(&self, host: &str) -> Result<PeerStatus> {
        let url = format!("{host}/node/status");
        self.client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_reqwest_err)?
            .json::<PeerStatus>()
            .await
            .map_err(Self::map_reqwest_err)
    }

    async fn blocks_by_number(&self, host: &str, from: BlockHeight, to: BlockHeight) -> Result<Vec<Block>> {
        let url = format!("{host}/node/block/list/{from}/{to}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_reqwest_err)?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        response
            .json::<Vec<Block>>()
            .await
            .map_err(Self::map_reqwest_err)
    }

    async fn propose_block(&self, host: &str, block: &Block) -> Result<()> {
        let url = format!("{host}/node/block/propose");
        self.client
            .post(&url)
            .json(block)
            .send()
            .await
            .map_err(Self::map_reqwest_err)?;
        Ok(())
    }

    async fn submit_tx(&self, host: &str, tx: &BlockTx) -> Result<()> {
        let url = format!("{host}/node/tx/submit");
        self.client
            .post(&url)
            .json(tx)
            .send()
            .await
            .map_err(Self::map_reqwest_err)?;
        Ok(())
    }

    async fn add_peer(&self, host: &str, new_peer_host: &str) -> Result<()> {
        let url = format!("{host}/node/peers");
        self.client
            .post(&url)
            .json(&serde_json::json!({ "host": new_peer_host }))
            .send()
            .await
            .map_err(Self::map_reqwest_err)?;
        Ok(())
    }
}

/// Known-peers set plus per-peer degraded status. Operations are
/// idempotent set-add/set-remove, guarded by a single lock so the registry
/// is never observed half-updated.
#[derive(Debug, Default)]
struct PeerRegistryInner {
    peers: HashSet<String>,
    degraded: HashSet<String>,
}

#[derive(Clone)]
pub struct PeerRegistry {
    inner: Arc<RwLock<PeerRegistryInner>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(PeerRegistryInner::default())),
        }
    }

    /// Adds `host` to the known-peers set. Idempotent.
    pub fn add(&self, host: impl Into<String>) {
        self.inner.write().peers.insert(host.into());
    }

    pub fn remove(&self, host: &str) {
        let mut inner = self.inner.write();
        inner.peers.remove(host);
        inner.degraded.remove(host);
    }

    #[must_use]
    pub fn known_peers(&self) -> Vec<String> {
        self.inner.read().peers.iter().cloned().collect()
    }

    /// Marks `host` degraded after a transient network failure. Degraded
    /// peers stay in the known-peers set (they may recover) but
    /// `reorganize` skips them in favor of the next-best candidate.
    pub fn mark_degraded(&self, host: &str) {
        self.inner.write().degraded.insert(host.to_string());
    }

    pub fn clear_degraded(&self, host: &str) {
        self.inner.write().degraded.remove(host);
    }

    #[must_use]
    pub fn is_degraded(&self, host: &str) -> bool {
        self.inner.read().degraded.contains(host)
    }

    #[must_use]
    pub fn healthy_peers(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .peers
            .iter()
            .filter(|host| !inner.degraded.contains(*host))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let registry = PeerRegistry::new();
        registry.add("http://a");
        registry.add("http://a");
        assert_eq!(registry.known_peers().len(), 1);
    }

    #[test]
    fn degraded_peers_are_excluded_from_healthy_list() {
        let registry = PeerRegistry::new();
        registry.add("http://a");
        registry.add("http://b");
        registry.mark_degraded("http://a");

        let healthy = registry.healthy_peers();
        assert_eq!(healthy, vec!["http://b".to_string()]);
    }

    #[test]
    fn remove_clears_degraded_status_too() {
        let registry = PeerRegistry::new();
        registry.add("http://a");
        registry.mark_degraded("http://a");
        registry.remove("http://a");
        assert!(!registry.is_degraded("http://a"));
        assert!(registry.known_peers().is_empty());
    }
}
