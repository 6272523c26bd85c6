//! Proof-of-work nonce search.
//!
//! A block is accepted once the hex rendering of its digest starts with at
//! least `difficulty` `'0'` characters. Each extra character multiplies the
//! expected number of attempts by 16. There is no upper bound on attempts:
//! termination is probabilistic, and callers that need to bound wall-clock
//! time raise the cancellation flag.

use crate::block::{Block, BlockState};
use crate::hash::{EncodingError, Hash};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Number of hex characters in a digest, and so the largest usable difficulty.
pub const MAX_DIFFICULTY: u32 = 64;

/// Errors that stop a nonce search.
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("block is {0}, only sealing blocks can be mined")]
    NotSealing(BlockState),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Count leading `'0'` characters in the hex rendering of `hash`.
pub fn leading_hex_zeros(hash: &Hash) -> u32 {
    let mut zeros = 0;
    for byte in hash.as_bytes() {
        if *byte == 0 {
            zeros += 2;
        } else {
            if byte >> 4 == 0 {
                zeros += 1;
            }
            break;
        }
    }
    zeros
}

/// Check whether `hash` satisfies `difficulty`.
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    leading_hex_zeros(hash) >= difficulty
}

/// How the next nonce is chosen after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceStrategy {
    /// Increment by one (wrapping). Reproducible.
    #[default]
    Sequential,
    /// Draw a fresh random nonce each attempt.
    Random,
}

impl NonceStrategy {
    fn next(&self, current: u64) -> u64 {
        match self {
            NonceStrategy::Sequential => current.wrapping_add(1),
            NonceStrategy::Random => rand::random(),
        }
    }
}

/// A winning nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u64,
    pub digest: Hash,
    /// Digests computed, including the winning one.
    pub attempts: u64,
}

/// Nonce search for a fixed difficulty.
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    difficulty: u32,
    strategy: NonceStrategy,
}

impl Miner {
    pub fn new(difficulty: u32, strategy: NonceStrategy) -> Self {
        Self {
            difficulty,
            strategy,
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn strategy(&self) -> NonceStrategy {
        self.strategy
    }

    /// Search for a nonce that makes `block`'s digest meet the difficulty.
    ///
    /// The first attempt uses the block's current nonce. `cancel` is checked
    /// once per attempt. The block itself is not modified; apply the result
    /// with [`Block::finalize`].
    pub fn mine(&self, block: &Block, cancel: &AtomicBool) -> Result<Solution, MiningError> {
        let state = block.state();
        if state != BlockState::Sealing {
            return Err(MiningError::NotSealing(state));
        }

        let template = block.digest_template()?;
        let mut nonce = block.nonce();
        let mut attempts = 0u64;

        loop {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!(attempts, "nonce search cancelled");
                return Err(MiningError::Cancelled { attempts });
            }

            let digest = template.digest(nonce);
            attempts += 1;

            if meets_difficulty(&digest, self.difficulty) {
                tracing::info!(
                    nonce,
                    digest = %digest.to_hex(),
                    attempts,
                    difficulty = self.difficulty,
                    "nonce found"
                );
                return Ok(Solution {
                    nonce,
                    digest,
                    attempts,
                });
            }

            nonce = self.strategy.next(nonce);
        }
    }
}
