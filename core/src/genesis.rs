//! Genesis: the immutable parameters a chain is born with.
//!
//! Genesis itself is never stored as a block. `StateEngine` derives block
//! number 1's `prev_block_hash` and initial account balances directly from
//! this record at startup.

use shared::{Address, BlockchainError, Result, Timestamp};
use std::collections::HashMap;

/// Chain parameters fixed at genesis and loaded once at startup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Genesis {
    /// Unix seconds the chain was declared to start at. Informational only;
    /// not consensus-checked against wall-clock time.
    pub date: Timestamp,
    pub chain_id: u16,
    pub initial_difficulty: u16,
    pub mining_reward: u64,
    pub gas_price: u64,
    pub balances: HashMap<Address, u64>,
}

impl Genesis {
    /// Loads genesis parameters from a JSON file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::IoError`] if the file can't be read, or
    /// [`BlockchainError::SerializationError`] if it doesn't parse.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let data =
            std::fs::read_to_string(path).map_err(|e| BlockchainError::IoError(e.to_string()))?;
        Self::from_json(&data)
    }

    /// Parses genesis parameters from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::SerializationError`] if `json` doesn't
    /// match the expected shape, or [`BlockchainError::InvalidInput`] if the
    /// parsed record fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let genesis: Self = serde_json::from_str(json)
            .map_err(|e| BlockchainError::SerializationError(e.to_string()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Rejects a genesis record that cannot support a running chain: a chain
    /// id of zero, or no initial balances (no account could ever cover a
    /// fee). Zero difficulty is legal — it's how a proof-of-authority chain
    /// is configured, since the authority's block still goes through
    /// `mine_new_block` but the first nonce checked always satisfies.
    fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(BlockchainError::InvalidInput(
                "genesis chain_id must be non-zero".to_string(),
            ));
        }
        if self.balances.is_empty() {
            return Err(BlockchainError::InvalidInput(
                "genesis must fund at least one account".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }
}
