use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace.
///
/// Callers that need to distinguish the five policy buckets from §7 of the
/// node design (invalid input, rejected, forked, cancelled, fatal, transient)
/// should match on [`BlockchainError::kind`] rather than the variant itself —
/// new variants may be added to a bucket without changing its policy.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid hash")]
    InvalidHash,

    #[error("insufficient proof-of-work difficulty")]
    InsufficientDifficulty,

    #[error("account nonce mismatch: expected {expected}, found {found}")]
    BadNonce { expected: u64, found: u64 },

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("chain id mismatch: expected {expected}, found {found}")]
    ChainIdMismatch { expected: u16, found: u16 },

    #[error("transaction sender and recipient are the same account")]
    SelfTransfer,

    #[error("invalid key size: expected {expected}, found {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("i/o error: {0}")]
    IoError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The local chain is behind a peer by more than one block, or the
    /// proposed block does not link to our tip. Recovered locally by
    /// `Reorganize`, never surfaced to the block's proposer.
    #[error("chain forked at or before block {at_height}")]
    ChainForked { at_height: u64 },

    /// A mining round was aborted by cooperative cancellation. Not an error
    /// in the usual sense — logged at info, the round simply ends early.
    #[error("mining cancelled")]
    Cancelled,

    /// Nothing to mine this round; the caller should not treat this as
    /// a failure unless no other progress signal exists.
    #[error("no transactions available to mine")]
    NoTransactions,
}

impl BlockchainError {
    /// Coarse policy bucket, used by HTTP-facing and peer-facing callers to
    /// decide how to surface an error without matching every variant.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidTransaction(_)
            | Self::InvalidBlock(_)
            | Self::InvalidHash
            | Self::InsufficientDifficulty
            | Self::BadNonce { .. }
            | Self::InsufficientFunds
            | Self::InvalidSignature
            | Self::ChainIdMismatch { .. }
            | Self::SelfTransfer => ErrorKind::Rejected,
            Self::ChainForked { .. } => ErrorKind::ChainForked,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NoTransactions => ErrorKind::Rejected,
            Self::NetworkError(_) => ErrorKind::Transient,
            Self::InvalidKeySize { .. }
            | Self::CryptographicError(_)
            | Self::SerializationError(_)
            | Self::IoError(_)
            | Self::ConfigError(_) => ErrorKind::Fatal,
        }
    }
}

/// See §7 (Error Handling Design) for the policy each bucket carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Rejected,
    ChainForked,
    Cancelled,
    Fatal,
    Transient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_bucket_covers_validation_failures() {
        assert_eq!(
            BlockchainError::InsufficientFunds.kind(),
            ErrorKind::Rejected
        );
        assert_eq!(
            BlockchainError::BadNonce {
                expected: 1,
                found: 3
            }
            .kind(),
            ErrorKind::Rejected
        );
    }

    #[test]
    fn chain_forked_is_its_own_bucket() {
        assert_eq!(
            BlockchainError::ChainForked { at_height: 5 }.kind(),
            ErrorKind::ChainForked
        );
    }
}
