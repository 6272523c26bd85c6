//! Structural validation of sealed blocks.
//!
//! Checks what can be checked from the blocks alone: linkage, merkle roots,
//! batch sizes and proof of work. Balances are not tracked.

use crate::blockchain::Blockchain;
use powchain_core::{meets_difficulty, Block, BlockState, EncodingError, Hash};
use thiserror::Error;

/// Errors that can occur during validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("block {height} is {state}, expected sealed")]
    NotSealed { height: u64, state: BlockState },

    #[error("block {height} digest does not match its contents")]
    DigestMismatch { height: u64 },

    #[error("block {height} digest does not meet difficulty {difficulty}")]
    InsufficientWork { height: u64, difficulty: u32 },

    #[error("block {height} previous digest mismatch (expected {expected}, got {got})")]
    InvalidPrevHash { height: u64, expected: Hash, got: Hash },

    #[error("block {height} merkle root verification failed")]
    InvalidMerkleRoot { height: u64 },

    #[error("block {height} holds {len} transactions, expected {expected}")]
    IncompleteBatch { height: u64, len: usize, expected: usize },

    #[error("genesis block must hold exactly one issuance transaction")]
    InvalidGenesis,

    #[error("transaction without sender in block {height}")]
    UnexpectedIssuance { height: u64 },

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Block validator.
pub struct ChainValidator;

impl ChainValidator {
    /// Validate a single sealed block against its expected position.
    pub fn validate_block(
        block: &Block,
        height: u64,
        expected_prev: Hash,
        expected_len: usize,
        difficulty: u32,
    ) -> Result<()> {
        let state = block.state();
        let digest = match (state, block.hash()) {
            (BlockState::Sealed, Some(digest)) => digest,
            _ => return Err(ValidationError::NotSealed { height, state }),
        };

        if block.previous_digest() != expected_prev {
            return Err(ValidationError::InvalidPrevHash {
                height,
                expected: expected_prev,
                got: block.previous_digest(),
            });
        }

        if block.tx_count() != expected_len {
            return Err(ValidationError::IncompleteBatch {
                height,
                len: block.tx_count(),
                expected: expected_len,
            });
        }

        if !block.verify_merkle_root()? {
            return Err(ValidationError::InvalidMerkleRoot { height });
        }

        if block.digest()? != digest {
            return Err(ValidationError::DigestMismatch { height });
        }

        if !meets_difficulty(&digest, difficulty) {
            return Err(ValidationError::InsufficientWork { height, difficulty });
        }

        Ok(())
    }

    /// Validate the genesis block's shape.
    pub fn validate_genesis(genesis: &Block) -> Result<()> {
        if !genesis.is_genesis() {
            return Err(ValidationError::InvalidGenesis);
        }
        Ok(())
    }

    /// Validate every sealed block in the chain, genesis first.
    pub fn validate_chain(chain: &Blockchain) -> Result<()> {
        let difficulty = chain.config().difficulty;
        let capacity = chain.config().batch_capacity;

        let genesis = chain.genesis();
        Self::validate_genesis(genesis)?;
        Self::validate_block(genesis, 0, Hash::ZERO, 1, difficulty)?;

        let mut prev = genesis.hash().unwrap_or_default();
        for (height, block) in chain.sealed_blocks().iter().enumerate().skip(1) {
            let height = height as u64;
            if block.transactions().iter().any(|tx| tx.is_issuance()) {
                return Err(ValidationError::UnexpectedIssuance { height });
            }
            Self::validate_block(block, height, prev, capacity, difficulty)?;
            prev = block.hash().unwrap_or_default();
        }

        Ok(())
    }
}
