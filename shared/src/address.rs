use crate::error::BlockchainError;
use crate::hash::Hash256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 20-byte account identifier, derived as `keccak256(public_key)[12..32]`
/// and rendered as `"0x" + hex`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 20]);

// Serialized as its `"0x" + hex` string form rather than a raw byte array so
// it can be used as a `HashMap` key in JSON (serde_json requires string
// keys) and reads naturally in genesis/block files on disk.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(D::Error::custom)
    }
}

impl Address {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derives the account address from an uncompressed public key, matching
    /// the Ethereum-style convention: keccak-256 the key, keep the low 20
    /// bytes.
    #[must_use]
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Hash256::keccak256(public_key);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[12..32]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl std::str::FromStr for Address {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| BlockchainError::InvalidInput(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(BlockchainError::InvalidInput(format!(
                "expected 20-byte address, found {} bytes",
                bytes.len()
            )));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn address_from_public_key_is_deterministic() {
        let key = b"a fake uncompressed public key";
        assert_eq!(Address::from_public_key(key), Address::from_public_key(key));
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        let addr = Address::from_public_key(b"another key");
        let parsed = Address::from_str(&addr.to_string()).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Address::from_str("0x1234").is_err());
    }
}
