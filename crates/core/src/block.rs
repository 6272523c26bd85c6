//! Blocks, block headers and the open → sealing → sealed lifecycle.

use crate::hash::{hash_tagged, DomainTag, EncodingError, Hash};
use crate::merkle::merkle_root;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors raised by illegal block state transitions.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block is {0}, not accepting transactions")]
    NotOpen(BlockState),

    #[error("block is full (capacity: {0})")]
    Full(usize),

    #[error("block already has a merkle root")]
    AlreadySealed,

    #[error("block has {len} of {capacity} transactions, cannot seal yet")]
    NotFull { len: usize, capacity: usize },

    #[error("block is {0}, expected sealing")]
    NotSealing(BlockState),

    #[error("digest does not match block contents at nonce {nonce}")]
    DigestMismatch { nonce: u64 },

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

pub type Result<T> = std::result::Result<T, BlockError>;

/// Where a block is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    /// Accepting transactions; no merkle root yet.
    Open,
    /// Merkle root fixed, nonce search in progress.
    Sealing,
    /// Digest found.
    Sealed,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockState::Open => "open",
            BlockState::Sealing => "sealing",
            BlockState::Sealed => "sealed",
        };
        f.write_str(s)
    }
}

/// The hashed fields of a block, minus the transaction digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Digest of the previous sealed block ([`Hash::ZERO`] for genesis).
    pub previous_digest: Hash,
    /// Unix timestamp in seconds, taken when the batch started forming.
    pub timestamp: u64,
    /// Merkle root of the transactions, set at seal time.
    pub merkle_root: Option<Hash>,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Get the current Unix timestamp.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Pre-encoded block contents with the nonce left open.
///
/// The block digest is `blake3(0x02 || bincode(previous_digest, timestamp,
/// merkle_root, nonce, transaction_digests))`. Everything except the nonce is
/// encoded once here so the mining loop only re-hashes.
#[derive(Debug, Clone)]
pub struct DigestTemplate {
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

impl DigestTemplate {
    /// Digest of the block with `nonce` substituted.
    pub fn digest(&self, nonce: u64) -> Hash {
        hash_tagged(
            DomainTag::Header,
            &[&self.prefix, &nonce.to_le_bytes(), &self.suffix],
        )
    }
}

/// A block: header, ordered transaction batch and, once mined, its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    #[serde(skip)]
    capacity: usize,
    digest: Option<Hash>,
}

impl Block {
    /// Create an empty open block that will hold `capacity` transactions.
    pub fn new(previous_digest: Hash, capacity: usize) -> Self {
        Self::with_timestamp(previous_digest, capacity, BlockHeader::current_timestamp())
    }

    /// Create an empty open block with an explicit timestamp.
    pub fn with_timestamp(previous_digest: Hash, capacity: usize, timestamp: u64) -> Self {
        Self {
            header: BlockHeader {
                previous_digest,
                timestamp,
                merkle_root: None,
                nonce: 0,
            },
            transactions: Vec::with_capacity(capacity),
            capacity,
            digest: None,
        }
    }

    /// Create the open genesis block holding its single issuance transaction.
    ///
    /// The batch is already full; the caller seals and mines it.
    pub fn genesis(issuance: Transaction) -> Self {
        let mut block = Self::new(Hash::ZERO, 1);
        block.transactions.push(issuance);
        block
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn previous_digest(&self) -> Hash {
        self.header.previous_digest
    }

    pub fn merkle_root(&self) -> Option<Hash> {
        self.header.merkle_root
    }

    pub fn nonce(&self) -> u64 {
        self.header.nonce
    }

    /// The mined digest, absent until the nonce search succeeds.
    pub fn hash(&self) -> Option<Hash> {
        self.digest
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_full(&self) -> bool {
        self.transactions.len() >= self.capacity
    }

    pub fn state(&self) -> BlockState {
        match (self.header.merkle_root, self.digest) {
            (_, Some(_)) => BlockState::Sealed,
            (Some(_), None) => BlockState::Sealing,
            (None, None) => BlockState::Open,
        }
    }

    /// Check if this is a genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.previous_digest == Hash::ZERO
            && self.transactions.len() == 1
            && self.transactions[0].is_issuance()
    }

    /// Append a transaction to the batch.
    ///
    /// Returns the number of transactions now in the block.
    pub fn accept(&mut self, tx: Transaction) -> Result<usize> {
        let state = self.state();
        if state != BlockState::Open {
            return Err(BlockError::NotOpen(state));
        }
        if self.is_full() {
            return Err(BlockError::Full(self.capacity));
        }
        self.transactions.push(tx);
        Ok(self.transactions.len())
    }

    /// Fix the merkle root, moving the block from open to sealing.
    pub fn seal(&mut self, merkle_root: Hash) -> Result<()> {
        if self.header.merkle_root.is_some() {
            return Err(BlockError::AlreadySealed);
        }
        if !self.is_full() {
            return Err(BlockError::NotFull {
                len: self.transactions.len(),
                capacity: self.capacity,
            });
        }
        self.header.merkle_root = Some(merkle_root);
        Ok(())
    }

    /// Digests of the transactions, in batch order.
    pub fn transaction_hashes(&self) -> std::result::Result<Vec<Hash>, EncodingError> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    /// Merkle root over the current batch.
    pub fn compute_merkle_root(&self) -> std::result::Result<Hash, EncodingError> {
        Ok(merkle_root(&self.transaction_hashes()?))
    }

    /// Verify the stored merkle root matches the transactions.
    pub fn verify_merkle_root(&self) -> std::result::Result<bool, EncodingError> {
        match self.header.merkle_root {
            Some(root) => Ok(self.compute_merkle_root()? == root),
            None => Ok(false),
        }
    }

    /// Encode everything but the nonce for repeated digest computation.
    pub fn digest_template(&self) -> std::result::Result<DigestTemplate, EncodingError> {
        let prefix = bincode::serialize(&(
            &self.header.previous_digest,
            self.header.timestamp,
            &self.header.merkle_root,
        ))?;
        let suffix = bincode::serialize(&self.transaction_hashes()?)?;
        Ok(DigestTemplate { prefix, suffix })
    }

    /// Digest of the block at `nonce`.
    pub fn digest_with_nonce(&self, nonce: u64) -> std::result::Result<Hash, EncodingError> {
        Ok(self.digest_template()?.digest(nonce))
    }

    /// Digest of the block at its current nonce.
    pub fn digest(&self) -> std::result::Result<Hash, EncodingError> {
        self.digest_with_nonce(self.header.nonce)
    }

    /// Record the winning nonce and digest. Only legal while sealing.
    pub fn finalize(&mut self, nonce: u64, digest: Hash) -> Result<()> {
        let state = self.state();
        if state != BlockState::Sealing {
            return Err(BlockError::NotSealing(state));
        }
        if self.digest_with_nonce(nonce)? != digest {
            return Err(BlockError::DigestMismatch { nonce });
        }
        self.header.nonce = nonce;
        self.digest = Some(digest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::crypto::PublicKey;
    use crate::hash::hash_encoded;

    fn tx(n: u8) -> Transaction {
        Transaction::transfer(
            Amount::from_minor(n as u64 * 100),
            PublicKey::from_bytes([n; 32]),
            PublicKey::from_bytes([n.wrapping_add(1); 32]),
        )
    }

    fn full_block(capacity: usize) -> Block {
        let mut block = Block::with_timestamp(Hash::ZERO, capacity, 1_700_000_000);
        for i in 0..capacity {
            block.accept(tx(i as u8 + 1)).unwrap();
        }
        block
    }

    #[test]
    fn test_genesis_block() {
        let recipient = PublicKey::from_bytes([9u8; 32]);
        let genesis = Block::genesis(Transaction::issuance(recipient, Amount::from_minor(50)));

        assert!(genesis.is_genesis());
        assert!(genesis.is_full());
        assert_eq!(genesis.state(), BlockState::Open);
        assert_eq!(genesis.previous_digest(), Hash::ZERO);
        assert_eq!(genesis.transactions()[0].recipient(), &recipient);
    }

    #[test]
    fn test_accept_until_full() {
        let mut block = Block::new(Hash::ZERO, 2);
        assert_eq!(block.accept(tx(1)).unwrap(), 1);
        assert_eq!(block.accept(tx(2)).unwrap(), 2);
        assert!(matches!(block.accept(tx(3)), Err(BlockError::Full(2))));
        assert_eq!(block.tx_count(), 2);
    }

    #[test]
    fn test_seal_before_full_fails() {
        let mut block = Block::new(Hash::ZERO, 2);
        block.accept(tx(1)).unwrap();
        let root = block.compute_merkle_root().unwrap();
        assert!(matches!(
            block.seal(root),
            Err(BlockError::NotFull { len: 1, capacity: 2 })
        ));
    }

    #[test]
    fn test_seal_twice_fails() {
        let mut block = full_block(2);
        let root = block.compute_merkle_root().unwrap();
        block.seal(root).unwrap();
        assert_eq!(block.state(), BlockState::Sealing);
        assert!(matches!(block.seal(root), Err(BlockError::AlreadySealed)));
    }

    #[test]
    fn test_accept_after_seal_fails() {
        let mut block = Block::new(Hash::ZERO, 1);
        block.accept(tx(1)).unwrap();
        block.seal(block.compute_merkle_root().unwrap()).unwrap();
        assert!(matches!(
            block.accept(tx(2)),
            Err(BlockError::NotOpen(BlockState::Sealing))
        ));
    }

    #[test]
    fn test_block_hash_deterministic() {
        let block = full_block(4);
        assert_eq!(block.digest().unwrap(), block.digest().unwrap());
        assert_eq!(block.clone().digest().unwrap(), block.digest().unwrap());
    }

    #[test]
    fn test_digest_changes_with_nonce() {
        let block = full_block(2);
        assert_ne!(
            block.digest_with_nonce(0).unwrap(),
            block.digest_with_nonce(1).unwrap()
        );
    }

    #[test]
    fn test_digest_covers_previous_digest_and_order() {
        let a = full_block(2);
        let mut b = Block::with_timestamp(Hash::from_bytes([1u8; 32]), 2, 1_700_000_000);
        b.accept(tx(1)).unwrap();
        b.accept(tx(2)).unwrap();
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());

        let mut c = Block::with_timestamp(Hash::ZERO, 2, 1_700_000_000);
        c.accept(tx(2)).unwrap();
        c.accept(tx(1)).unwrap();
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
    }

    #[test]
    fn test_template_matches_canonical_encoding() {
        #[derive(Serialize)]
        struct Canonical {
            previous_digest: Hash,
            timestamp: u64,
            merkle_root: Option<Hash>,
            nonce: u64,
            transactions: Vec<Hash>,
        }

        let mut block = full_block(2);
        block.seal(block.compute_merkle_root().unwrap()).unwrap();

        let canonical = Canonical {
            previous_digest: block.previous_digest(),
            timestamp: block.header().timestamp,
            merkle_root: block.merkle_root(),
            nonce: 42,
            transactions: block.transaction_hashes().unwrap(),
        };
        let expected = hash_encoded(DomainTag::Header, &canonical).unwrap();
        assert_eq!(block.digest_with_nonce(42).unwrap(), expected);
    }

    #[test]
    fn test_finalize() {
        let mut block = full_block(2);
        let digest = block.digest_with_nonce(7).unwrap();
        assert!(matches!(
            block.finalize(7, digest),
            Err(BlockError::NotSealing(BlockState::Open))
        ));

        block.seal(block.compute_merkle_root().unwrap()).unwrap();
        let digest = block.digest_with_nonce(7).unwrap();
        assert!(matches!(
            block.finalize(8, digest),
            Err(BlockError::DigestMismatch { nonce: 8 })
        ));

        block.finalize(7, digest).unwrap();
        assert_eq!(block.state(), BlockState::Sealed);
        assert_eq!(block.nonce(), 7);
        assert_eq!(block.hash(), Some(digest));
        assert_eq!(block.digest().unwrap(), digest);
        assert!(block.finalize(7, digest).is_err());
    }

    #[test]
    fn test_merkle_root_verification() {
        let mut block = full_block(4);
        assert!(!block.verify_merkle_root().unwrap());
        block.seal(block.compute_merkle_root().unwrap()).unwrap();
        assert!(block.verify_merkle_root().unwrap());
    }
}
