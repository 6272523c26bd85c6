//! Blake3 hashing and canonical encoding for ledger digests.
//!
//! Every digest in the ledger is `blake3(tag || payload)`, where `tag` is one
//! of the [`DomainTag`] bytes. Transactions, Merkle interior nodes and block
//! headers never share a tag, so a digest of one kind can not be replayed as
//! a digest of another.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A named alias for a 32-byte(u8) array, used to represent a 256-bit hash.
pub type H256 = [u8; 32];

/// Errors produced while canonically encoding a value for hashing.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("canonical encoding failed: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Domain separation prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DomainTag {
    /// Transaction digests, which are also the Merkle leaves.
    Leaf = 0x00,
    /// Merkle interior nodes.
    Node = 0x01,
    /// Block header digests.
    Header = 0x02,
}

/// A wrapper type for H256 with Display and Debug formatting.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub H256);

impl Hash {
    /// The zero hash (all zeros). Used as the genesis predecessor sentinel.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a new Hash from raw bytes.
    pub fn from_bytes(bytes: H256) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &H256 {
        &self.0
    }

    /// Convert to a fixed-width (64 character) lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<H256> for Hash {
    fn from(bytes: H256) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for H256 {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash arbitrary data using Blake3.
pub fn hash(data: &[u8]) -> Hash {
    Hash(blake3::hash(data).into())
}

/// Hash `tag || parts...`.
pub fn hash_tagged(tag: DomainTag, parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[tag as u8]);
    for part in parts {
        hasher.update(part);
    }
    Hash(hasher.finalize().into())
}

/// Canonically encode `value` and hash it under `tag`.
///
/// The encoding is bincode's default configuration: fixed-width little-endian
/// integers, a `u64` length prefix before every sequence and a single tag byte
/// for `Option`. Field order is the declaration order of the serialized type.
pub fn hash_encoded<T: Serialize>(tag: DomainTag, value: &T) -> Result<Hash, EncodingError> {
    let encoded = bincode::serialize(value)?;
    Ok(hash_tagged(tag, &[&encoded]))
}
