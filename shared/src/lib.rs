pub mod address;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use address::Address;
pub use crypto::{KeyPair, RecoverableSignature};
pub use error::BlockchainError;
pub use hash::Hash256;
pub use types::{BlockHeight, Timestamp};

pub type Result<T> = std::result::Result<T, BlockchainError>;
