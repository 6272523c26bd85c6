//! Core proof-of-work ledger primitives for powchain.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Hashing and canonical encoding
//! - Fixed-point amounts and public-key identifiers
//! - Transactions
//! - Blocks and block headers
//! - Merkle roots
//! - The proof-of-work nonce search

pub mod amount;
pub mod block;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod pow;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use amount::{Amount, AmountError};
pub use block::{Block, BlockError, BlockHeader, BlockState, DigestTemplate};
pub use crypto::{CryptoError, Keypair, PublicKey};
pub use hash::{hash, hash_encoded, DomainTag, EncodingError, Hash, H256};
pub use merkle::{merkle_proof, merkle_root, validate_leaf_count, verify_proof, MerkleError, MerkleProof};
pub use pow::{leading_hex_zeros, meets_difficulty, Miner, MiningError, NonceStrategy, Solution, MAX_DIFFICULTY};
pub use transaction::Transaction;
